pub mod api;
pub mod betting;
pub mod calculation;
pub mod counting;
mod error;
pub mod simulation;
mod statearray;
pub mod strategy;
pub mod table;

use serde::{Deserialize, Serialize};
use serde_enum_str::{Deserialize_enum_str, Serialize_enum_str};

pub use error::EngineError;
pub use statearray::{CardCount, SingleStateArray};

/// Table rules of one blackjack game.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub number_of_decks: u8,
    /// Fraction of the shoe dealt before it is reshuffled at the next round
    /// boundary.
    pub penetration: f64,
    pub dealer_hit_on_soft17: bool,
    pub peek_policy: PeekPolicy,
    pub allow_late_surrender: bool,
    pub allow_das: bool,
    /// Number of player hands a round may hold. 2 means a single split and no
    /// re-split.
    pub max_hands: u8,
    pub payout_blackjack: PayoutRatio,
    pub min_bet: i64,
    pub max_bet: i64,
}

impl Default for Rule {
    fn default() -> Self {
        Rule {
            number_of_decks: 6,
            penetration: 0.75,
            dealer_hit_on_soft17: false,
            peek_policy: PeekPolicy::UpAceOrTen,
            allow_late_surrender: true,
            allow_das: true,
            max_hands: 2,
            payout_blackjack: PayoutRatio::THREE_TO_TWO,
            min_bet: 5,
            max_bet: 500,
        }
    }
}

impl Rule {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(1..=8).contains(&self.number_of_decks) {
            return Err(EngineError::invalid_config(format!(
                "number_of_decks must be in [1, 8] (got {})",
                self.number_of_decks
            )));
        }
        if !(self.penetration > 0.0 && self.penetration <= 1.0) {
            return Err(EngineError::invalid_config(format!(
                "penetration must be in (0, 1] (got {})",
                self.penetration
            )));
        }
        if !(1..=4).contains(&self.max_hands) {
            return Err(EngineError::invalid_config(format!(
                "max_hands must be in [1, 4] (got {})",
                self.max_hands
            )));
        }
        if self.min_bet <= 0 {
            return Err(EngineError::invalid_config(format!(
                "min_bet must be > 0 (got {})",
                self.min_bet
            )));
        }
        if self.max_bet < self.min_bet {
            return Err(EngineError::invalid_config(format!(
                "max_bet {} is below min_bet {}",
                self.max_bet, self.min_bet
            )));
        }
        if self.payout_blackjack.denominator == 0 {
            return Err(EngineError::invalid_config(
                "payout_blackjack denominator must be > 0",
            ));
        }
        Ok(())
    }

    /// Whether the dealer checks the hole card for a natural when showing the
    /// given up card.
    pub fn dealer_peeks(&self, up_card_value: u8) -> bool {
        match self.peek_policy {
            PeekPolicy::UpAceOrTen => up_card_value == 1 || up_card_value == 10,
            PeekPolicy::UpAce => up_card_value == 1,
            PeekPolicy::NoPeek => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_enum_str, Deserialize_enum_str)]
pub enum PeekPolicy {
    UpAceOrTen,
    UpAce,
    NoPeek,
}

/// Integer payout ratio, e.g. 3:2 for a blackjack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRatio {
    pub numerator: u32,
    pub denominator: u32,
}

impl PayoutRatio {
    pub const THREE_TO_TWO: PayoutRatio = PayoutRatio {
        numerator: 3,
        denominator: 2,
    };
    pub const SIX_TO_FIVE: PayoutRatio = PayoutRatio {
        numerator: 6,
        denominator: 5,
    };

    /// Winnings on top of the returned stake. Rounds toward zero.
    pub fn winnings(&self, stake: i64) -> i64 {
        stake * self.numerator as i64 / self.denominator as i64
    }

    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

/// The five player actions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize_enum_str, Deserialize_enum_str,
)]
pub enum Decision {
    #[serde(rename = "stand")]
    Stand,
    #[serde(rename = "hit")]
    Hit,
    #[serde(rename = "double")]
    Double,
    #[serde(rename = "split")]
    Split,
    #[serde(rename = "surrender")]
    Surrender,
}

impl Decision {
    /// Preference order used to break ties between equally valued actions.
    pub const TIE_ORDER: [Decision; 5] = [
        Decision::Stand,
        Decision::Hit,
        Decision::Double,
        Decision::Split,
        Decision::Surrender,
    ];
}
