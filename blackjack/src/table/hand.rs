use crate::CardCount;

use super::Card;

/// One player hand (or the dealer hand): its cards, the stake riding on it,
/// and the markers the round needs to know what the hand may still do.
#[derive(Debug, Clone, Default)]
pub struct Hand {
    cards: Vec<Card>,
    card_count: CardCount,
    bet: i64,
    doubled: bool,
    surrendered: bool,
    from_split: bool,
    split_aces: bool,
    /// No more decisions can be made on this hand.
    finished: bool,
}

impl Hand {
    pub fn new(bet: i64) -> Hand {
        Hand {
            cards: Vec::with_capacity(3),
            bet,
            ..Default::default()
        }
    }

    pub fn receive_card(&mut self, card: Card) {
        self.cards.push(card);
        self.card_count.add_card(card.blackjack_value());
    }

    /// Moves the second card into a new hand carrying the same stake. Both
    /// hands are then marked as coming from a split.
    pub(crate) fn split(&mut self) -> Option<Hand> {
        if !self.is_pair() {
            return None;
        }
        let card = self.cards.pop()?;
        self.card_count.remove_card(card.blackjack_value());
        self.from_split = true;
        self.split_aces = card.is_ace();

        let mut new_hand = Hand::new(self.bet);
        new_hand.receive_card(card);
        new_hand.from_split = true;
        new_hand.split_aces = self.split_aces;
        Some(new_hand)
    }

    pub(crate) fn double_down(&mut self) {
        self.bet *= 2;
        self.doubled = true;
    }

    pub(crate) fn surrender(&mut self) {
        self.surrendered = true;
        self.finished = true;
    }

    pub(crate) fn finish(&mut self) {
        self.finished = true;
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn get_card_count(&self) -> &CardCount {
        &self.card_count
    }

    pub fn bet(&self) -> i64 {
        self.bet
    }

    /// Best total: Aces count 11 and are demoted to 1 while the total
    /// exceeds 21.
    pub fn value(&self) -> u16 {
        self.card_count.get_actual_sum()
    }

    /// Total with every Ace counted as 1.
    pub fn hard_total(&self) -> u16 {
        self.card_count.get_sum()
    }

    pub fn is_soft(&self) -> bool {
        self.card_count.is_soft()
    }

    pub fn is_bust(&self) -> bool {
        self.card_count.bust()
    }

    /// A two-card 21 that did not come from a split.
    pub fn is_blackjack(&self) -> bool {
        !self.from_split && self.card_count.is_natural()
    }

    pub fn is_pair(&self) -> bool {
        self.cards.len() == 2 && self.cards[0].blackjack_value() == self.cards[1].blackjack_value()
    }

    pub fn is_doubled(&self) -> bool {
        self.doubled
    }

    pub fn is_surrendered(&self) -> bool {
        self.surrendered
    }

    pub fn is_split(&self) -> bool {
        self.from_split
    }

    pub fn is_split_aces(&self) -> bool {
        self.split_aces
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Neither bust nor surrendered, so the dealer's hand still matters.
    pub fn is_live(&self) -> bool {
        !self.is_bust() && !self.surrendered
    }
}
