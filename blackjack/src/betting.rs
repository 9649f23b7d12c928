use serde::{Deserialize, Serialize};

use crate::counting::StrategyConfig;
use crate::{EngineError, Rule};

const MAX_PROGRESSION_UNITS: f64 = 1024.0;
const ONE_THREE_TWO_SIX: [f64; 4] = [1.0, 3.0, 2.0, 6.0];
const KELLY_FRACTION_PER_COUNT: f64 = 0.005;

/// A user-defined bet progression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy_type", rename_all = "snake_case")]
pub enum ProgressionConfig {
    Flat,
    /// After a win the previous bet is scaled by `win_multiplier`. After a
    /// loss it goes back to one unit, or is scaled by `loss_multiplier` when
    /// `reset_on_loss` is off. A push goes back to one unit.
    Progressive {
        win_multiplier: f64,
        loss_multiplier: f64,
        reset_on_loss: bool,
    },
    /// `count_multiplier` units while the true count is at least
    /// `count_threshold`, one unit otherwise.
    CountBased {
        count_threshold: f64,
        count_multiplier: f64,
    },
}

impl ProgressionConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        let positive = |name: &str, value: f64| {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(EngineError::invalid_config(format!(
                    "{} must be > 0 (got {})",
                    name, value
                )))
            }
        };
        match self {
            ProgressionConfig::Flat => Ok(()),
            ProgressionConfig::Progressive {
                win_multiplier,
                loss_multiplier,
                ..
            } => {
                positive("win_multiplier", *win_multiplier)?;
                positive("loss_multiplier", *loss_multiplier)
            }
            ProgressionConfig::CountBased {
                count_multiplier, ..
            } => positive("count_multiplier", *count_multiplier),
        }
    }
}

/// The closed set of betting strategies. A strategy sizes the wager in units
/// of the base bet; the `Bettor` turns units into a legal wager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BettingStrategy {
    Flat,
    /// Bet ramp of a counting configuration.
    #[serde(rename = "card_counting")]
    TrueCountRamp(StrategyConfig),
    /// Doubles after every loss, back to one unit after a win.
    Martingale,
    /// Doubles after every win, back to one unit after a loss.
    ReverseMartingale,
    /// Bets a share of the bankroll proportional to a positive true count.
    KellyCriterion,
    #[serde(rename = "1_3_2_6")]
    OneThreeTwoSix,
    Custom(ProgressionConfig),
}

impl BettingStrategy {
    pub const NAMES: [&'static str; 6] = [
        "flat",
        "card_counting",
        "martingale",
        "reverse_martingale",
        "kelly_criterion",
        "1_3_2_6",
    ];

    /// `card_counting` uses the default counting preset.
    pub fn from_name(name: &str) -> Result<Self, EngineError> {
        match name {
            "flat" => Ok(BettingStrategy::Flat),
            "card_counting" => Ok(BettingStrategy::TrueCountRamp(
                StrategyConfig::default_preset(),
            )),
            "martingale" => Ok(BettingStrategy::Martingale),
            "reverse_martingale" => Ok(BettingStrategy::ReverseMartingale),
            "kelly_criterion" => Ok(BettingStrategy::KellyCriterion),
            "1_3_2_6" => Ok(BettingStrategy::OneThreeTwoSix),
            _ => Err(EngineError::invalid_config(format!(
                "unknown betting strategy {:?}",
                name
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BettingStrategy::Flat => "flat",
            BettingStrategy::TrueCountRamp(_) => "card_counting",
            BettingStrategy::Martingale => "martingale",
            BettingStrategy::ReverseMartingale => "reverse_martingale",
            BettingStrategy::KellyCriterion => "kelly_criterion",
            BettingStrategy::OneThreeTwoSix => "1_3_2_6",
            BettingStrategy::Custom(_) => "custom",
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            BettingStrategy::TrueCountRamp(config) => config.validate(),
            BettingStrategy::Custom(progression) => progression.validate(),
            _ => Ok(()),
        }
    }
}

/// Names of every built-in playing and betting strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableStrategies {
    pub playing: Vec<String>,
    pub betting: Vec<String>,
}

pub fn available_strategies() -> AvailableStrategies {
    AvailableStrategies {
        playing: crate::strategy::PlayingStrategy::NAMES
            .iter()
            .map(|name| name.to_string())
            .collect(),
        betting: BettingStrategy::NAMES
            .iter()
            .map(|name| name.to_string())
            .collect(),
    }
}

/// A betting strategy together with its progression state across rounds.
#[derive(Debug, Clone)]
pub struct Bettor {
    strategy: BettingStrategy,
    base_bet: i64,
    units: f64,
    sequence_index: usize,
}

impl Bettor {
    pub fn new(strategy: BettingStrategy, base_bet: i64) -> Self {
        Bettor {
            strategy,
            base_bet,
            units: 1.0,
            sequence_index: 0,
        }
    }

    pub fn strategy(&self) -> &BettingStrategy {
        &self.strategy
    }

    /// The wager for the next round. Always a multiple of the table minimum,
    /// within the table limits and no more than the bankroll. Returns 0 when
    /// the bankroll cannot cover the table minimum.
    pub fn next_bet(&self, true_count: f64, bankroll: i64, rule: &Rule) -> i64 {
        if bankroll < rule.min_bet {
            return 0;
        }
        let base = self.base_bet.max(rule.min_bet);
        let desired = match &self.strategy {
            BettingStrategy::Flat => base,
            BettingStrategy::TrueCountRamp(config) => base * config.bet_units(true_count) as i64,
            BettingStrategy::Martingale | BettingStrategy::ReverseMartingale => {
                scale(base, self.units)
            }
            BettingStrategy::KellyCriterion => {
                if true_count <= 0.0 {
                    base
                } else {
                    let kelly = (bankroll as f64 * true_count * KELLY_FRACTION_PER_COUNT) as i64;
                    kelly.min(bankroll / 4).max(base)
                }
            }
            BettingStrategy::OneThreeTwoSix => {
                scale(base, ONE_THREE_TWO_SIX[self.sequence_index])
            }
            BettingStrategy::Custom(ProgressionConfig::Flat) => base,
            BettingStrategy::Custom(ProgressionConfig::Progressive { .. }) => {
                scale(base, self.units)
            }
            BettingStrategy::Custom(ProgressionConfig::CountBased {
                count_threshold,
                count_multiplier,
            }) => {
                if true_count >= *count_threshold {
                    scale(base, *count_multiplier)
                } else {
                    base
                }
            }
        };

        let capped = desired.min(rule.max_bet).min(bankroll);
        (capped / rule.min_bet * rule.min_bet).max(rule.min_bet)
    }

    /// Updates the progression with the net result of the finished round.
    pub fn record(&mut self, net: i64) {
        let won = net > 0;
        let lost = net < 0;
        match &self.strategy {
            BettingStrategy::Martingale => {
                if lost {
                    self.units = (self.units * 2.0).min(MAX_PROGRESSION_UNITS);
                } else if won {
                    self.units = 1.0;
                }
            }
            BettingStrategy::ReverseMartingale => {
                if won {
                    self.units = (self.units * 2.0).min(MAX_PROGRESSION_UNITS);
                } else if lost {
                    self.units = 1.0;
                }
            }
            BettingStrategy::OneThreeTwoSix => {
                if won {
                    self.sequence_index = (self.sequence_index + 1) % ONE_THREE_TWO_SIX.len();
                } else if lost {
                    self.sequence_index = 0;
                }
            }
            BettingStrategy::Custom(ProgressionConfig::Progressive {
                win_multiplier,
                loss_multiplier,
                reset_on_loss,
            }) => {
                let units = if won {
                    self.units * win_multiplier
                } else if lost && !reset_on_loss {
                    self.units * loss_multiplier
                } else {
                    1.0
                };
                self.units = units.clamp(1.0, MAX_PROGRESSION_UNITS);
            }
            _ => {}
        }
    }
}

fn scale(base: i64, units: f64) -> i64 {
    (base as f64 * units) as i64
}
