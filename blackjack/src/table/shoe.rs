use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use strum::IntoEnumIterator;
use tracing::debug;

use super::{Card, Suit};
use crate::counting::CountingSystem;
use crate::{CardCount, EngineError};

/// A new round forces a reshuffle when fewer cards than this remain.
pub const MIN_CARDS_BEFORE_ROUND: usize = 20;
const MIN_DECKS_REMAINING: f64 = 0.5;

/// Represents a shoe in the real world, together with the card counter
/// watching it.
///
/// Cards dealt face down are not counted until they are revealed. The
/// composition, on the other hand, always describes the undealt cards.
#[derive(Debug, Clone)]
pub struct Shoe {
    number_of_decks: u8,
    penetration: f64,
    cut_card_index: usize,
    cards: Vec<Card>,
    current_index: usize,
    card_count: CardCount,
    counting_system: CountingSystem,
    running_count: i32,
    aces_seen: u16,
    rng: ChaCha8Rng,
}

impl Shoe {
    /// Creates a shuffled shoe seeded from system entropy.
    pub fn new(number_of_decks: u8, penetration: f64, counting_system: CountingSystem) -> Shoe {
        Self::with_rng(
            number_of_decks,
            penetration,
            counting_system,
            ChaCha8Rng::from_entropy(),
        )
    }

    /// Creates a shuffled shoe whose card order is fully determined by `seed`.
    pub fn with_seed(
        number_of_decks: u8,
        penetration: f64,
        counting_system: CountingSystem,
        seed: u64,
    ) -> Shoe {
        Self::with_rng(
            number_of_decks,
            penetration,
            counting_system,
            ChaCha8Rng::seed_from_u64(seed),
        )
    }

    fn with_rng(
        number_of_decks: u8,
        penetration: f64,
        counting_system: CountingSystem,
        rng: ChaCha8Rng,
    ) -> Shoe {
        let mut cards = Vec::with_capacity(number_of_decks as usize * 52);
        for _ in 0..number_of_decks {
            for suit in Suit::iter() {
                for face_value in 1..=13 {
                    cards.push(Card { face_value, suit });
                }
            }
        }
        let number_of_cards = cards.len();
        let mut shoe = Shoe {
            number_of_decks,
            penetration,
            cut_card_index: (penetration * number_of_cards as f64) as usize,
            cards,
            current_index: 0,
            card_count: CardCount::with_number_of_decks(number_of_decks),
            counting_system,
            running_count: 0,
            aces_seen: 0,
            rng,
        };
        shoe.shuffle();
        shoe
    }

    /// Returns all dealt cards back into the shoe, shuffles, and resets the
    /// count.
    pub fn shuffle(&mut self) {
        self.cards.shuffle(&mut self.rng);
        self.reset_counters();
        debug!(
            decks = self.number_of_decks,
            cards = self.cards.len(),
            "shoe reshuffled"
        );
    }

    /// Returns the dealt cards back into the shoe, and shuffles. This method
    /// makes sure the given first few cards will be at the frontmost positions
    /// of the shoe. The cards are given in blackjack values (i.e., 1 stands for
    /// A, 10 stands for 10 and J, Q, K).
    pub fn shuffle_with_firsts(&mut self, firsts: &[u8]) -> Result<(), EngineError> {
        let mut counts = [self.number_of_decks; 52];
        let mut front = Vec::with_capacity(firsts.len());
        for blackjack_value in firsts {
            let card_integer = find_suitable_card(&counts, *blackjack_value).ok_or_else(|| {
                EngineError::invalid_config(format!(
                    "the shoe cannot supply another card of value {}",
                    blackjack_value
                ))
            })?;
            counts[card_integer as usize] -= 1;
            let card =
                Card::try_from(card_integer).map_err(|_| EngineError::ShoeExhausted)?;
            front.push(card);
        }

        let mut idx = 0;
        for card in &front {
            self.cards[idx] = *card;
            idx += 1;
        }
        for suit in Suit::iter() {
            for face_value in 1..=13 {
                let card = Card { face_value, suit };
                let card_integer: u8 = card.into();
                for _ in 0..counts[card_integer as usize] {
                    self.cards[idx] = card;
                    idx += 1;
                }
            }
        }

        self.cards[firsts.len()..].shuffle(&mut self.rng);
        self.reset_counters();
        Ok(())
    }

    /// Deals a face-up card and counts it.
    pub fn deal_one(&mut self) -> Result<Card, EngineError> {
        let card = self.deal_face_down()?;
        self.count_card(card);
        Ok(card)
    }

    /// Deals a card without counting it. Call [`Shoe::reveal`] once it is
    /// turned over.
    pub fn deal_face_down(&mut self) -> Result<Card, EngineError> {
        let card = *self
            .cards
            .get(self.current_index)
            .ok_or(EngineError::ShoeExhausted)?;
        self.current_index += 1;
        self.card_count.remove_card(card.blackjack_value());
        Ok(card)
    }

    /// Counts a card that was dealt face down.
    pub fn reveal(&mut self, card: Card) {
        self.count_card(card);
    }

    /// Shuffles the discards back in without touching the cards still on
    /// the table. `in_play` stays dealt and the count starts over.
    pub fn shuffle_discards(&mut self, in_play: &[Card]) -> Result<(), EngineError> {
        let mut rest = self.cards.clone();
        for card in in_play {
            if let Some(position) = rest.iter().position(|other| other == card) {
                rest.swap_remove(position);
            }
        }
        if rest.is_empty() {
            return Err(EngineError::ShoeExhausted);
        }
        rest.shuffle(&mut self.rng);

        self.cards = in_play.iter().copied().chain(rest).collect();
        self.reset_counters();
        self.current_index = in_play.len();
        for card in in_play {
            self.card_count.remove_card(card.blackjack_value());
        }
        debug!(in_play = in_play.len(), "discards shuffled back in");
        Ok(())
    }

    /// Checks if the cut card has been reached.
    pub fn reached_cut_card(&self) -> bool {
        self.current_index >= self.cut_card_index
    }

    /// Whether the next round must start from a fresh shoe.
    pub fn needs_shuffle(&self) -> bool {
        self.reached_cut_card() || self.remaining() < MIN_CARDS_BEFORE_ROUND
    }

    pub fn remaining(&self) -> usize {
        self.cards.len() - self.current_index
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Fraction of the shoe already dealt.
    pub fn penetration_dealt(&self) -> f64 {
        self.current_index as f64 / self.cards.len() as f64
    }

    pub fn penetration(&self) -> f64 {
        self.penetration
    }

    pub fn number_of_decks(&self) -> u8 {
        self.number_of_decks
    }

    /// Undealt decks, never below half a deck.
    pub fn decks_remaining(&self) -> f64 {
        (self.remaining() as f64 / 52.0).max(MIN_DECKS_REMAINING)
    }

    pub fn running_count(&self) -> i32 {
        self.running_count
    }

    pub fn true_count(&self) -> f64 {
        self.running_count as f64 / self.decks_remaining()
    }

    /// Aces remaining beyond the expected four per remaining deck.
    fn extra_aces(&self) -> f64 {
        let aces_remaining = (self.number_of_decks as u16 * 4 - self.aces_seen) as f64;
        aces_remaining - self.decks_remaining() * 4.0
    }

    /// True count after the Ace side-count adjustment. Equal to
    /// [`Shoe::true_count`] when the counting system has no adjustment.
    pub fn adjusted_true_count(&self) -> f64 {
        let adjustment = self.counting_system.ace_adjustment();
        if adjustment == 0 {
            return self.true_count();
        }
        let adjusted = self.running_count as f64 + self.extra_aces() * adjustment as f64;
        adjusted / self.decks_remaining()
    }

    pub fn ace_excess_per_deck(&self) -> f64 {
        self.extra_aces() / self.decks_remaining()
    }

    pub fn aces_seen(&self) -> u16 {
        self.aces_seen
    }

    /// Composition of the undealt cards.
    pub fn get_card_count(&self) -> &CardCount {
        &self.card_count
    }

    pub fn counting_system(&self) -> &CountingSystem {
        &self.counting_system
    }

    fn count_card(&mut self, card: Card) {
        self.running_count += self.counting_system.weight(card);
        if card.is_ace() {
            self.aces_seen += 1;
        }
    }

    fn reset_counters(&mut self) {
        self.current_index = 0;
        self.card_count = CardCount::with_number_of_decks(self.number_of_decks);
        self.running_count = 0;
        self.aces_seen = 0;
    }
}

fn find_suitable_card(counts: &[u8; 52], blackjack_value: u8) -> Option<u8> {
    let (lo, hi) = match blackjack_value {
        10 => (10, 13),
        1..=9 => (blackjack_value, blackjack_value),
        _ => return None,
    };

    for face_value in lo..=hi {
        for suit in Suit::iter() {
            let card: u8 = Card { face_value, suit }.into();
            if counts[card as usize] > 0 {
                return Some(card);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number_of_cards_is_correct(shoe: &Shoe) -> bool {
        let mut counts = [0u8; 52];
        for card in &shoe.cards {
            let card_integer: u8 = (*card).into();
            counts[card_integer as usize] += 1;
        }
        counts.iter().all(|count| *count == shoe.number_of_decks)
    }

    fn seeded(number_of_decks: u8) -> Shoe {
        Shoe::with_seed(number_of_decks, 0.75, CountingSystem::hi_lo(), 7)
    }

    #[test]
    fn new_shoe_holds_every_card() {
        let shoe = seeded(3);
        assert!(number_of_cards_is_correct(&shoe));
        assert_eq!(shoe.len(), 156);
        assert_eq!(shoe.remaining(), 156);
        assert_eq!(shoe.get_card_count().get_total(), 156);
    }

    #[test]
    fn test_shuffle_with_firsts() {
        let mut shoe = seeded(1);
        let mut firsts = vec![1, 2, 6, 6, 9];
        shoe.shuffle_with_firsts(&firsts).unwrap();
        assert!(number_of_cards_is_correct(&shoe));
        for (i, blackjack_value) in firsts.iter().enumerate() {
            assert_eq!(shoe.cards[i].blackjack_value(), *blackjack_value);
        }

        firsts = vec![9, 10, 10, 10, 10, 10];
        shoe.shuffle_with_firsts(&firsts).unwrap();
        assert!(number_of_cards_is_correct(&shoe));
        for (i, blackjack_value) in firsts.iter().enumerate() {
            assert_eq!(shoe.cards[i].blackjack_value(), *blackjack_value);
        }
    }

    #[test]
    fn invalid_firsts_are_rejected() {
        let mut shoe = seeded(1);
        let result = shoe.shuffle_with_firsts(&[1, 2, 6, 6, 9, 6, 6, 6]);
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));

        let mut shoe = seeded(2);
        assert!(shoe.shuffle_with_firsts(&[10; 33]).is_err());
        assert!(shoe.shuffle_with_firsts(&[11]).is_err());
    }

    #[test]
    fn card_count_is_correctly_synced() {
        let mut shoe = seeded(2);
        shoe.shuffle_with_firsts(&[1, 4, 4, 10]).unwrap();
        shoe.deal_one().unwrap();
        assert_eq!(shoe.get_card_count()[1], 7);
        shoe.deal_one().unwrap();
        assert_eq!(shoe.get_card_count()[4], 7);
        shoe.deal_one().unwrap();
        assert_eq!(shoe.get_card_count()[4], 6);
        shoe.deal_one().unwrap();
        assert_eq!(shoe.get_card_count()[10], 31);
        // A, 4, 4, 10 under Hi-Lo.
        assert_eq!(shoe.running_count(), 0);
        assert_eq!(shoe.aces_seen(), 1);
    }

    #[test]
    fn face_down_cards_are_counted_on_reveal() {
        let mut shoe = seeded(1);
        shoe.shuffle_with_firsts(&[5]).unwrap();
        let card = shoe.deal_face_down().unwrap();
        assert_eq!(shoe.running_count(), 0);
        assert_eq!(shoe.get_card_count()[5], 3);
        shoe.reveal(card);
        assert_eq!(shoe.running_count(), 1);
    }

    #[test]
    fn dealing_past_the_end_fails() {
        let mut shoe = seeded(1);
        for _ in 0..52 {
            shoe.deal_one().unwrap();
        }
        assert!(shoe.is_empty());
        assert_eq!(shoe.deal_one(), Err(EngineError::ShoeExhausted));
        assert_eq!(shoe.remaining(), 0);
    }

    #[test]
    fn discards_come_back_without_the_cards_in_play() {
        let mut shoe = seeded(1);
        let mut dealt = Vec::new();
        for _ in 0..52 {
            dealt.push(shoe.deal_one().unwrap());
        }
        let in_play = &dealt[40..];
        shoe.shuffle_discards(in_play).unwrap();
        assert!(number_of_cards_is_correct(&shoe));
        assert_eq!(shoe.remaining(), 40);
        assert_eq!(shoe.get_card_count().get_total(), 40);
        assert_eq!(shoe.running_count(), 0);
        let mut drawn = Vec::new();
        while let Ok(card) = shoe.deal_one() {
            drawn.push(card);
        }
        assert_eq!(drawn.len(), 40);
        assert!(drawn.iter().all(|card| !in_play.contains(card)));

        assert_eq!(shoe.shuffle_discards(&dealt), Err(EngineError::ShoeExhausted));
    }

    #[test]
    fn true_count_resets_after_shuffle() {
        let mut shoe = seeded(6);
        shoe.shuffle_with_firsts(&[2, 3, 4, 5, 6]).unwrap();
        for _ in 0..5 {
            shoe.deal_one().unwrap();
        }
        assert_eq!(shoe.running_count(), 5);
        assert!(shoe.true_count() > 0.0);
        shoe.shuffle();
        assert_eq!(shoe.true_count(), 0.0);
        assert_eq!(shoe.running_count(), 0);
    }

    #[test]
    fn decks_remaining_is_floored() {
        let mut shoe = seeded(1);
        for _ in 0..50 {
            shoe.deal_one().unwrap();
        }
        assert_eq!(shoe.decks_remaining(), 0.5);
        assert_eq!(shoe.true_count(), shoe.running_count() as f64 * 2.0);
    }

    #[test]
    fn needs_shuffle_after_penetration() {
        let mut shoe = seeded(2);
        assert!(!shoe.needs_shuffle());
        for _ in 0..77 {
            shoe.deal_one().unwrap();
        }
        assert!(!shoe.needs_shuffle());
        shoe.deal_one().unwrap();
        assert!(shoe.needs_shuffle());
        assert!((shoe.penetration_dealt() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn minimum_reserve_forces_shuffle() {
        let mut shoe = Shoe::with_seed(1, 1.0, CountingSystem::hi_lo(), 1);
        for _ in 0..32 {
            shoe.deal_one().unwrap();
        }
        assert!(!shoe.needs_shuffle());
        shoe.deal_one().unwrap();
        assert!(shoe.needs_shuffle());
    }

    #[test]
    fn same_seed_same_order() {
        let a = Shoe::with_seed(6, 0.75, CountingSystem::hi_lo(), 42);
        let b = Shoe::with_seed(6, 0.75, CountingSystem::hi_lo(), 42);
        let c = Shoe::with_seed(6, 0.75, CountingSystem::hi_lo(), 43);
        assert_eq!(a.cards, b.cards);
        assert_ne!(a.cards, c.cards);
    }

    #[test]
    fn ace_adjustment() {
        let system = crate::counting::StrategyConfig::default_preset()
            .counting_system()
            .unwrap();
        let mut shoe = Shoe::with_seed(1, 0.75, system, 3);
        shoe.shuffle_with_firsts(&[2; 4]).unwrap();
        for _ in 0..4 {
            shoe.deal_one().unwrap();
        }
        // No ace seen after 4 cards: 4 aces remain against 48/52 * 4 expected.
        let decks = 48.0 / 52.0;
        let extra = 4.0 - decks * 4.0;
        assert!((shoe.ace_excess_per_deck() - extra / decks).abs() < 1e-9);
        let expected = (shoe.running_count() as f64 + extra * 4.0) / decks;
        assert!((shoe.adjusted_true_count() - expected).abs() < 1e-9);

        let plain = seeded(1);
        assert_eq!(plain.adjusted_true_count(), plain.true_count());
    }
}
