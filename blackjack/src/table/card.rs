use serde::{Deserialize, Serialize};
use strum_macros::EnumIter;

use crate::counting::RANK_LABELS;

static FACE_VALUE_TO_BLACKJACK_VALUE: [u8; 13] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 10, 10, 10];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
pub enum Suit {
    Diamond = 0,
    Club,
    Heart,
    Spade,
}

/// Represents a card in the real world with a suit and a face value.
/// Face values run from 1 (Ace) to 13 (King).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawCard")]
pub struct Card {
    pub face_value: u8,
    pub suit: Suit,
}

#[derive(Deserialize)]
struct RawCard {
    face_value: u8,
    suit: Suit,
}

impl TryFrom<RawCard> for Card {
    type Error = String;

    fn try_from(raw: RawCard) -> Result<Self, Self::Error> {
        if !(1..=13).contains(&raw.face_value) {
            return Err(format!("face_value must be in [1, 13] (got {})", raw.face_value));
        }
        Ok(Card {
            face_value: raw.face_value,
            suit: raw.suit,
        })
    }
}

impl Card {
    /// Ace is 1, face cards are 10.
    pub fn blackjack_value(&self) -> u8 {
        FACE_VALUE_TO_BLACKJACK_VALUE[(self.face_value - 1) as usize]
    }

    pub fn is_ace(&self) -> bool {
        self.face_value == 1
    }

    /// "A", "2".."10", "J", "Q", "K".
    pub fn label(&self) -> &'static str {
        RANK_LABELS[(self.face_value - 1) as usize]
    }
}

impl Default for Card {
    fn default() -> Self {
        Card {
            face_value: 1,
            suit: Suit::Diamond,
        }
    }
}

impl std::fmt::Display for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let suit = match self.suit {
            Suit::Diamond => 'D',
            Suit::Club => 'C',
            Suit::Heart => 'H',
            Suit::Spade => 'S',
        };
        write!(f, "{}{}", suit, self.label())
    }
}

impl From<Card> for u8 {
    fn from(card: Card) -> u8 {
        card.suit as u8 * 13 + card.face_value - 1
    }
}

impl TryFrom<u8> for Card {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let suit = match value / 13 {
            0 => Suit::Diamond,
            1 => Suit::Club,
            2 => Suit::Heart,
            3 => Suit::Spade,
            _ => return Err(()),
        };
        Ok(Card {
            suit,
            face_value: value % 13 + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_integer_conversion() {
        for integer in 0..52u8 {
            let card = Card::try_from(integer).unwrap();
            assert_eq!(u8::from(card), integer);
        }
        assert!(Card::try_from(52).is_err());
    }

    #[test]
    fn values_and_labels() {
        let king = Card {
            face_value: 13,
            suit: Suit::Heart,
        };
        assert_eq!(king.blackjack_value(), 10);
        assert_eq!(king.label(), "K");
        assert_eq!(king.to_string(), "HK");

        let ten = Card {
            face_value: 10,
            suit: Suit::Club,
        };
        assert_eq!(ten.to_string(), "C10");
        assert!(Card::default().is_ace());
    }

    #[test]
    fn deserialization_rejects_unknown_faces() {
        let queen: Card = serde_json::from_str(r#"{"face_value":12,"suit":"Spade"}"#).unwrap();
        assert_eq!(queen.label(), "Q");
        assert_eq!(serde_json::to_string(&queen).unwrap(), r#"{"face_value":12,"suit":"Spade"}"#);

        for face_value in [0, 14, 255] {
            let json = format!(r#"{{"face_value":{},"suit":"Club"}}"#, face_value);
            let error = serde_json::from_str::<Card>(&json).unwrap_err();
            assert!(error.to_string().contains("face_value must be in [1, 13]"));
        }
    }
}
