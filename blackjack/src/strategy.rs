use serde::{Deserialize, Serialize};

use crate::counting::{DeviationAction, StrategyConfig};
use crate::table::{Card, Hand};
use crate::{CardCount, Decision, EngineError, Rule};

/// Everything a playing strategy may look at when deciding.
#[derive(Debug, Clone)]
pub struct DecisionContext<'a> {
    pub hand: &'a Hand,
    pub dealer_up_card: Card,
    pub valid_actions: Vec<Decision>,
    pub true_count: f64,
    pub number_of_hands: usize,
    pub rule: &'a Rule,
}

impl DecisionContext<'_> {
    fn allows(&self, decision: Decision) -> bool {
        self.valid_actions.contains(&decision)
    }
}

/// The closed set of playing strategies. `decide` always returns a member of
/// the context's valid actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayingStrategy {
    Basic,
    /// Hits exactly like the dealer does.
    MimicDealer,
    /// Stands on 12 or more against a dealer 2 to 6.
    Conservative,
    /// Doubles every 9, 10 and 11 whenever it may.
    Aggressive,
    /// Basic strategy plus index plays driven by the true count.
    #[serde(rename = "card_counting")]
    Deviations(StrategyConfig),
}

impl PlayingStrategy {
    pub const NAMES: [&'static str; 5] = [
        "basic",
        "mimic_dealer",
        "conservative",
        "aggressive",
        "card_counting",
    ];

    /// `card_counting` uses the default counting preset.
    pub fn from_name(name: &str) -> Result<Self, EngineError> {
        match name {
            "basic" => Ok(PlayingStrategy::Basic),
            "mimic_dealer" => Ok(PlayingStrategy::MimicDealer),
            "conservative" => Ok(PlayingStrategy::Conservative),
            "aggressive" => Ok(PlayingStrategy::Aggressive),
            "card_counting" => Ok(PlayingStrategy::Deviations(
                StrategyConfig::default_preset(),
            )),
            _ => Err(EngineError::invalid_config(format!(
                "unknown playing strategy {:?}",
                name
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlayingStrategy::Basic => "basic",
            PlayingStrategy::MimicDealer => "mimic_dealer",
            PlayingStrategy::Conservative => "conservative",
            PlayingStrategy::Aggressive => "aggressive",
            PlayingStrategy::Deviations(_) => "card_counting",
        }
    }

    pub fn decide(&self, context: &DecisionContext) -> Decision {
        let decision = match self {
            PlayingStrategy::Basic => BasicStrategy::decide(context),
            PlayingStrategy::MimicDealer => mimic_dealer(context),
            PlayingStrategy::Conservative => {
                let up = context.dealer_up_card.blackjack_value();
                if context.hand.value() >= 12 && (2..=6).contains(&up) {
                    Decision::Stand
                } else {
                    BasicStrategy::decide(context)
                }
            }
            PlayingStrategy::Aggressive => {
                if (9..=11).contains(&context.hand.value()) && context.allows(Decision::Double) {
                    Decision::Double
                } else {
                    BasicStrategy::decide(context)
                }
            }
            PlayingStrategy::Deviations(config) => {
                deviation(config, context).unwrap_or_else(|| BasicStrategy::decide(context))
            }
        };
        if context.allows(decision) {
            decision
        } else {
            Decision::Stand
        }
    }
}

fn mimic_dealer(context: &DecisionContext) -> Decision {
    let hand = context.hand;
    let value = hand.value();
    let hits_soft_17 = value == 17 && hand.is_soft() && context.rule.dealer_hit_on_soft17;
    if value < 17 || hits_soft_17 {
        Decision::Hit
    } else {
        Decision::Stand
    }
}

/// Index plays only apply to hard hands.
fn deviation(config: &StrategyConfig, context: &DecisionContext) -> Option<Decision> {
    let hand = context.hand;
    if hand.is_soft() {
        return None;
    }
    let up = context.dealer_up_card.blackjack_value();
    config
        .deviations
        .iter()
        .filter(|rule| rule.applies(hand.value(), up, context.true_count))
        .find_map(|rule| match rule.action {
            DeviationAction::Hit => Some(Decision::Hit),
            DeviationAction::Stand => Some(Decision::Stand),
            DeviationAction::Double if context.allows(Decision::Double) => Some(Decision::Double),
            DeviationAction::Double => None,
            DeviationAction::NoSplit if hand.is_pair() && context.allows(Decision::Split) => {
                Some(Decision::Stand)
            }
            DeviationAction::NoSplit => None,
        })
}

type Cell = (Decision, Decision);

const H: Cell = (Decision::Hit, Decision::Hit);
const S: Cell = (Decision::Stand, Decision::Stand);
const P: Cell = (Decision::Split, Decision::Split);
const DH: Cell = (Decision::Double, Decision::Hit);
const DS: Cell = (Decision::Double, Decision::Stand);
const RH: Cell = (Decision::Surrender, Decision::Hit);
const RS: Cell = (Decision::Surrender, Decision::Stand);
const RP: Cell = (Decision::Surrender, Decision::Split);

// Columns are the dealer up card: A, 2, 3, ..., 10.
const HARD_CHART: [[Cell; 10]; 14] = [
    [H, H, H, H, H, H, H, H, H, H], // 5
    [H, H, H, H, H, H, H, H, H, H],
    [H, H, H, H, H, H, H, H, H, H],
    [H, H, H, H, H, H, H, H, H, H],
    [H, H, DH, DH, DH, DH, H, H, H, H],
    [H, DH, DH, DH, DH, DH, DH, DH, DH, H],
    [DH, DH, DH, DH, DH, DH, DH, DH, DH, DH],
    [H, H, H, S, S, S, H, H, H, H],
    [H, S, S, S, S, S, H, H, H, H],
    [H, S, S, S, S, S, H, H, H, H],
    [RH, S, S, S, S, S, H, H, H, RH],
    [RH, S, S, S, S, S, H, H, RH, RH],
    [RS, S, S, S, S, S, S, S, S, S], // 17
    [S, S, S, S, S, S, S, S, S, S],  // 18, 18+
];
const SOFT_CHART: [[Cell; 10]; 9] = [
    [H, H, H, H, DH, DH, H, H, H, H], // Ace + 2
    [H, H, H, H, DH, DH, H, H, H, H],
    [H, H, H, DH, DH, DH, H, H, H, H],
    [H, H, H, DH, DH, DH, H, H, H, H],
    [H, H, DH, DH, DH, DH, H, H, H, H],
    [H, DS, DS, DS, DS, DS, S, S, H, H],
    [S, S, S, S, S, DS, S, S, S, S],
    [S, S, S, S, S, S, S, S, S, S], // Ace + 9
    [S, S, S, S, S, S, S, S, S, S], // Ace + 10
];
const PAIR_CHART: [[Cell; 10]; 10] = [
    [P, P, P, P, P, P, P, P, P, P], // Double Ace
    [H, P, P, P, P, P, P, H, H, H], // Double 2
    [H, P, P, P, P, P, P, H, H, H],
    [H, H, H, H, P, P, H, H, H, H],
    [H, DH, DH, DH, DH, DH, DH, DH, DH, H],
    [H, P, P, P, P, P, H, H, H, H],
    [H, P, P, P, P, P, P, H, H, H],
    [RP, P, P, P, P, P, P, P, P, P],
    [S, P, P, P, P, P, S, P, P, S],
    [S, S, S, S, S, S, S, S, S, S], // Double 10
];

/// Table-driven basic strategy. A chart cell holds the preferred action and
/// the one to take when the preferred action is not allowed.
pub struct BasicStrategy;

impl BasicStrategy {
    pub fn decide(context: &DecisionContext) -> Decision {
        Self::chart_action(
            context.hand.get_card_count(),
            context.dealer_up_card.blackjack_value(),
            &context.valid_actions,
        )
    }

    /// The chart's action for `hand` against the dealer up card value
    /// (Ace is 1), restricted to `valid_actions`. Falls back to standing.
    pub fn chart_action(hand: &CardCount, dealer_up: u8, valid_actions: &[Decision]) -> Decision {
        let allows = |decision: Decision| valid_actions.contains(&decision);
        let col = (dealer_up - 1) as usize;

        if allows(Decision::Split) {
            if let Some(pair_value) = pair_value(hand) {
                let (primary, fallback) = PAIR_CHART[(pair_value - 1) as usize][col];
                if allows(primary) {
                    return primary;
                }
                if fallback == Decision::Split {
                    return Decision::Split;
                }
            }
        }

        let (primary, fallback) = Self::total_cell(hand, col);
        if allows(primary) {
            primary
        } else if allows(fallback) {
            fallback
        } else if primary == Decision::Double && fallback == Decision::Stand {
            Decision::Stand
        } else if allows(Decision::Hit) && fallback == Decision::Hit {
            Decision::Hit
        } else {
            Decision::Stand
        }
    }

    fn total_cell(hand: &CardCount, col: usize) -> Cell {
        let sum = hand.get_sum();
        if hand.is_soft() {
            if sum <= 2 {
                // Two Aces that may not be split play as soft 12.
                return H;
            }
            let row = (sum - 3).min(8) as usize;
            SOFT_CHART[row][col]
        } else {
            let row = (sum.clamp(5, 18) - 5) as usize;
            HARD_CHART[row][col]
        }
    }
}

fn pair_value(hand: &CardCount) -> Option<u8> {
    if hand.get_total() != 2 || hand.get_sum() % 2 != 0 {
        return None;
    }
    let value = (hand.get_sum() / 2) as u8;
    (hand[value] == 2).then_some(value)
}
