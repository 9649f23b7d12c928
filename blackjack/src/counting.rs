use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::table::Card;
use crate::EngineError;

/// Rank labels indexed by face value - 1.
pub const RANK_LABELS: [&str; 13] = [
    "A", "2", "3", "4", "5", "6", "7", "8", "9", "10", "J", "Q", "K",
];
const RANK_NAMES: [&str; 13] = [
    "ACE", "TWO", "THREE", "FOUR", "FIVE", "SIX", "SEVEN", "EIGHT", "NINE", "TEN", "JACK", "QUEEN",
    "KING",
];

/// Accepts both the short labels ("A", "10", "K") and the long rank names
/// ("ACE", "TEN", "KING"). Returns the face value in [1, 13].
pub fn face_value_from_label(label: &str) -> Option<u8> {
    let label = label.trim();
    RANK_LABELS
        .iter()
        .position(|l| l.eq_ignore_ascii_case(label))
        .or_else(|| RANK_NAMES.iter().position(|n| n.eq_ignore_ascii_case(label)))
        .or_else(|| (label.eq_ignore_ascii_case("T")).then_some(9))
        .map(|index| index as u8 + 1)
}

/// Count weights per rank plus an Ace side-count adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountingSystem {
    weights: [i32; 13],
    ace_adjustment: i32,
}

impl CountingSystem {
    /// Low cards 2-6 count +1, 7-9 count 0, tens and Aces count -1.
    pub fn hi_lo() -> Self {
        let mut weights = [0; 13];
        for (index, weight) in weights.iter_mut().enumerate() {
            let face_value = index + 1;
            *weight = match face_value {
                2..=6 => 1,
                7..=9 => 0,
                _ => -1,
            };
        }
        CountingSystem {
            weights,
            ace_adjustment: 0,
        }
    }

    /// Ranks missing from the map count 0.
    pub fn from_card_values(
        card_values: &BTreeMap<String, i32>,
        ace_adjustment: i32,
    ) -> Result<Self, EngineError> {
        let mut weights = [0; 13];
        for (label, weight) in card_values {
            let face_value = face_value_from_label(label).ok_or_else(|| {
                EngineError::invalid_config(format!("unknown rank label {:?}", label))
            })?;
            weights[(face_value - 1) as usize] = *weight;
        }
        Ok(CountingSystem {
            weights,
            ace_adjustment,
        })
    }

    pub fn weight(&self, card: Card) -> i32 {
        self.weights[(card.face_value - 1) as usize]
    }

    pub fn ace_adjustment(&self) -> i32 {
        self.ace_adjustment
    }

    pub fn card_values(&self) -> BTreeMap<String, i32> {
        RANK_LABELS
            .iter()
            .zip(self.weights.iter())
            .map(|(label, weight)| (label.to_string(), *weight))
            .collect()
    }
}

impl Default for CountingSystem {
    fn default() -> Self {
        Self::hi_lo()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

impl Comparison {
    pub fn holds(&self, true_count: f64, threshold: f64) -> bool {
        match self {
            Comparison::Greater => true_count > threshold,
            Comparison::GreaterEqual => true_count >= threshold,
            Comparison::Less => true_count < threshold,
            Comparison::LessEqual => true_count <= threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviationAction {
    Hit,
    Stand,
    Double,
    /// Stand on a pair of 8s instead of splitting it.
    NoSplit,
}

/// An index play: take `action` with a hard `player_total` against
/// `dealer_card` (Ace is 1) when the true count satisfies the comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationRule {
    pub name: String,
    pub player_total: u8,
    pub dealer_card: u8,
    pub action: DeviationAction,
    pub count_threshold: f64,
    pub comparison: Comparison,
}

impl DeviationRule {
    fn new(
        name: &str,
        player_total: u8,
        dealer_card: u8,
        action: DeviationAction,
        count_threshold: f64,
        comparison: Comparison,
    ) -> Self {
        DeviationRule {
            name: name.to_owned(),
            player_total,
            dealer_card,
            action,
            count_threshold,
            comparison,
        }
    }

    pub fn applies(&self, hard_total: u16, dealer_up: u8, true_count: f64) -> bool {
        hard_total == self.player_total as u16
            && dealer_up == self.dealer_card
            && self.comparison.holds(true_count, self.count_threshold)
    }
}

pub fn default_deviations() -> Vec<DeviationRule> {
    use Comparison::*;
    use DeviationAction::*;
    vec![
        DeviationRule::new("16_vs_10_stand", 16, 10, Stand, 0.0, Greater),
        DeviationRule::new("12_vs_3_stand", 12, 3, Stand, 5.0, GreaterEqual),
        DeviationRule::new("12_vs_2_stand", 12, 2, Stand, 10.0, GreaterEqual),
        DeviationRule::new("13_vs_2_hit", 13, 2, Hit, -5.0, Less),
        DeviationRule::new("13_vs_3_hit", 13, 3, Hit, -10.0, Less),
        DeviationRule::new("11_vs_5_double", 11, 5, Double, 10.0, Greater),
        DeviationRule::new("11_vs_6_double", 11, 6, Double, 10.0, Greater),
        DeviationRule::new("88_vs_10_no_split", 16, 10, NoSplit, 0.0, Greater),
    ]
}

/// A user-defined counting system with its bet ramp and index plays.
/// Immutable for the duration of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub card_values: BTreeMap<String, i32>,
    pub ace_adjustment: i32,
    /// True count at which the bet ramp starts.
    pub bet_threshold: f64,
    /// True-count distance per extra betting unit above the threshold.
    pub bet_increment: f64,
    pub max_bet_units: u32,
    #[serde(default = "default_deviations")]
    pub deviations: Vec<DeviationRule>,
}

impl StrategyConfig {
    pub fn default_preset() -> Self {
        Self::from_weights(
            [-3, 0, 3, 4, 5, 3, 0, -1, -2, -3, -3, -3, -3],
            4,
            5.0,
        )
    }

    pub fn optimized_preset() -> Self {
        Self::from_weights(
            [-3, 0, 3, 3, 4, 4, 0, 0, -3, -3, -3, -3, -3],
            5,
            3.0,
        )
    }

    fn from_weights(weights: [i32; 13], ace_adjustment: i32, bet_threshold: f64) -> Self {
        StrategyConfig {
            card_values: CountingSystem {
                weights,
                ace_adjustment,
            }
            .card_values(),
            ace_adjustment,
            bet_threshold,
            bet_increment: 5.0,
            max_bet_units: 20,
            deviations: default_deviations(),
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.bet_increment > 0.0) {
            return Err(EngineError::invalid_config(format!(
                "bet_increment must be > 0 (got {})",
                self.bet_increment
            )));
        }
        if self.max_bet_units == 0 {
            return Err(EngineError::invalid_config("max_bet_units must be > 0"));
        }
        self.counting_system().map(|_| ())
    }

    pub fn counting_system(&self) -> Result<CountingSystem, EngineError> {
        CountingSystem::from_card_values(&self.card_values, self.ace_adjustment)
    }

    /// Betting units for a true count: 1 below the threshold, then one extra
    /// unit per full increment, capped at `max_bet_units`.
    pub fn bet_units(&self, true_count: f64) -> u32 {
        if true_count < self.bet_threshold {
            return 1;
        }
        let extra = ((true_count - self.bet_threshold) / self.bet_increment) as u32;
        (1 + extra).min(self.max_bet_units)
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::default_preset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Suit;

    fn card(face_value: u8) -> Card {
        Card {
            face_value,
            suit: Suit::Spade,
        }
    }

    #[test]
    fn hi_lo_weights() {
        let hi_lo = CountingSystem::hi_lo();
        assert_eq!(hi_lo.weight(card(2)), 1);
        assert_eq!(hi_lo.weight(card(6)), 1);
        assert_eq!(hi_lo.weight(card(8)), 0);
        assert_eq!(hi_lo.weight(card(1)), -1);
        assert_eq!(hi_lo.weight(card(13)), -1);
        let total: i32 = (1..=13).map(|v| hi_lo.weight(card(v))).sum();
        assert_eq!(total, 0);
    }

    #[test]
    fn labels_accept_short_and_long_names() {
        assert_eq!(face_value_from_label("A"), Some(1));
        assert_eq!(face_value_from_label("ACE"), Some(1));
        assert_eq!(face_value_from_label("10"), Some(10));
        assert_eq!(face_value_from_label("queen"), Some(12));
        assert_eq!(face_value_from_label("Z"), None);
    }

    #[test]
    fn unknown_label_is_invalid_config() {
        let mut values = BTreeMap::new();
        values.insert("Joker".to_owned(), 1);
        assert!(matches!(
            CountingSystem::from_card_values(&values, 0),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn presets() {
        let default = StrategyConfig::default_preset();
        assert_eq!(default.card_values["5"], 5);
        assert_eq!(default.card_values["A"], -3);
        assert_eq!(default.ace_adjustment, 4);
        assert_eq!(default.deviations.len(), 8);
        assert!(default.validate().is_ok());

        let optimized = StrategyConfig::optimized_preset();
        assert_eq!(optimized.card_values["6"], 4);
        assert_eq!(optimized.card_values["9"], -3);
        assert_eq!(optimized.ace_adjustment, 5);
        assert_eq!(optimized.bet_threshold, 3.0);
    }

    #[test]
    fn bet_ramp() {
        let config = StrategyConfig::default_preset();
        assert_eq!(config.bet_units(-4.0), 1);
        assert_eq!(config.bet_units(4.9), 1);
        assert_eq!(config.bet_units(5.0), 1);
        assert_eq!(config.bet_units(10.0), 2);
        assert_eq!(config.bet_units(14.9), 2);
        assert_eq!(config.bet_units(1000.0), 20);
    }

    #[test]
    fn comparisons() {
        assert!(Comparison::Greater.holds(0.1, 0.0));
        assert!(!Comparison::Greater.holds(0.0, 0.0));
        assert!(Comparison::GreaterEqual.holds(5.0, 5.0));
        assert!(Comparison::Less.holds(-5.5, -5.0));
        assert!(Comparison::LessEqual.holds(-5.0, -5.0));
    }

    #[test]
    fn deviation_config_deserializes_from_json() {
        let json = r#"{
            "name": "16_vs_10_stand",
            "player_total": 16,
            "dealer_card": 10,
            "action": "STAND",
            "count_threshold": 0,
            "comparison": "greater"
        }"#;
        let rule: DeviationRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.action, DeviationAction::Stand);
        assert!(rule.applies(16, 10, 1.0));
        assert!(!rule.applies(16, 10, 0.0));
    }
}
