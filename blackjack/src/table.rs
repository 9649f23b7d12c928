pub mod card;
pub mod hand;
pub mod shoe;

use blackjack_macros::allowed_phase;
use serde::{Deserialize, Serialize};
use serde_enum_str::{Deserialize_enum_str, Serialize_enum_str};
use tracing::debug;

use crate::counting::CountingSystem;
use crate::strategy::{DecisionContext, PlayingStrategy};
use crate::{Decision, EngineError, Rule};

pub use self::card::{Card, Suit};
pub use self::hand::Hand;
pub use self::shoe::Shoe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_enum_str, Deserialize_enum_str)]
pub enum Phase {
    #[serde(rename = "betting")]
    Betting,
    #[serde(rename = "player_turn")]
    PlayerTurn,
    #[serde(rename = "dealer_turn")]
    DealerTurn,
    #[serde(rename = "round_over")]
    RoundOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_enum_str, Deserialize_enum_str)]
pub enum Outcome {
    #[serde(rename = "win")]
    Win,
    #[serde(rename = "lose")]
    Lose,
    #[serde(rename = "push")]
    Push,
    #[serde(rename = "blackjack")]
    Blackjack,
    #[serde(rename = "surrender")]
    Surrender,
}

/// Settlement of one player hand. `payout` is what goes back to the bankroll
/// (stake included), so `net = payout - bet`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandResult {
    #[serde(rename = "result")]
    pub outcome: Outcome,
    pub bet: i64,
    pub payout: i64,
    pub net: i64,
    pub player_value: u16,
    pub dealer_value: u16,
}

/// State of the round in progress. Player hands form a flat sequence; splits
/// insert the new hand right after the one being split, and hands are played
/// strictly left to right.
#[derive(Debug, Clone)]
pub struct Round {
    phase: Phase,
    dealer: Hand,
    hole_card_revealed: bool,
    hands: Vec<Hand>,
    current_hand_index: usize,
    results: Vec<HandResult>,
}

impl Round {
    fn new() -> Self {
        Round {
            phase: Phase::Betting,
            dealer: Hand::new(0),
            hole_card_revealed: false,
            hands: Vec::new(),
            current_hand_index: 0,
            results: Vec::new(),
        }
    }
}

/// Observer of automatically played rounds.
pub trait RoundEventHandler {
    fn on_round_begin(&mut self, _shoe: &Shoe) {}
    fn on_bet(&mut self, _bet: i64, _true_count: f64) {}
    fn on_deal(&mut self, _player: &Hand, _dealer_up_card: Card) {}
    fn on_decision(&mut self, _decision: Decision, _hand_index: usize) {}
    fn on_round_end(&mut self, _results: &[HandResult], _dealer: &Hand, _bankroll: i64) {}
}

impl RoundEventHandler for () {}

/// One player seat at a blackjack table: the shoe, the player's bankroll and
/// the round being played. Every state-changing method is gated on the round
/// phase and validates before it mutates anything.
#[derive(Debug, Clone)]
pub struct Table {
    rule: Rule,
    shoe: Shoe,
    bankroll: i64,
    round: Round,
}

impl Table {
    /// A table with a Hi-Lo counted shoe seeded from system entropy.
    pub fn new(rule: Rule, bankroll: i64) -> Result<Self, EngineError> {
        let shoe = Shoe::new(rule.number_of_decks, rule.penetration, CountingSystem::hi_lo());
        Self::with_shoe(rule, bankroll, shoe)
    }

    pub fn with_seed(
        rule: Rule,
        bankroll: i64,
        counting_system: CountingSystem,
        seed: u64,
    ) -> Result<Self, EngineError> {
        let shoe = Shoe::with_seed(rule.number_of_decks, rule.penetration, counting_system, seed);
        Self::with_shoe(rule, bankroll, shoe)
    }

    pub fn with_shoe(rule: Rule, bankroll: i64, shoe: Shoe) -> Result<Self, EngineError> {
        rule.validate()?;
        if bankroll < 0 {
            return Err(EngineError::invalid_config(format!(
                "bankroll must be >= 0 (got {})",
                bankroll
            )));
        }
        Ok(Table {
            rule,
            shoe,
            bankroll,
            round: Round::new(),
        })
    }

    /// Reshuffles so that the next round deals the given blackjack values
    /// first, in dealing order: player, dealer up, player, dealer hole, then
    /// any later draws.
    #[allowed_phase(Betting)]
    pub fn shuffle_with_firsts(&mut self, firsts: &[u8]) -> Result<(), EngineError> {
        self.shoe.shuffle_with_firsts(firsts)
    }

    /// Places the initial wager and deals. Ends in `PlayerTurn`, or in
    /// `RoundOver` when a natural settles the round at once.
    #[allowed_phase(Betting)]
    pub fn place_bet(&mut self, amount: i64) -> Result<(), EngineError> {
        if amount < self.rule.min_bet {
            return Err(EngineError::invalid_bet(
                amount,
                format!("below the table minimum {}", self.rule.min_bet),
            ));
        }
        if amount > self.rule.max_bet {
            return Err(EngineError::invalid_bet(
                amount,
                format!("above the table maximum {}", self.rule.max_bet),
            ));
        }
        if amount > self.bankroll {
            return Err(EngineError::invalid_bet(
                amount,
                format!("exceeds the bankroll {}", self.bankroll),
            ));
        }

        if self.shoe.needs_shuffle() {
            self.shoe.shuffle();
        }

        let mut hand = Hand::new(amount);
        let mut dealer = Hand::new(0);
        hand.receive_card(self.shoe.deal_one()?);
        dealer.receive_card(self.shoe.deal_one()?);
        hand.receive_card(self.shoe.deal_one()?);
        dealer.receive_card(self.shoe.deal_face_down()?);

        self.bankroll -= amount;
        self.round = Round::new();
        self.round.hands.push(hand);
        self.round.dealer = dealer;

        let up_card_value = self.round.dealer.cards()[0].blackjack_value();
        let dealer_shows_natural =
            self.rule.dealer_peeks(up_card_value) && self.round.dealer.is_blackjack();
        if dealer_shows_natural || self.round.hands[0].is_blackjack() {
            self.round.hands[0].finish();
            self.round.phase = Phase::DealerTurn;
            self.dealer_plays_and_settle()
        } else {
            self.round.phase = Phase::PlayerTurn;
            Ok(())
        }
    }

    /// The actions legal for the current hand. Empty outside `PlayerTurn`.
    pub fn valid_actions(&self) -> Vec<Decision> {
        let hand = match self.current_hand() {
            Some(hand) if self.round.phase == Phase::PlayerTurn && !hand.is_finished() => hand,
            _ => return Vec::new(),
        };

        let mut actions = vec![Decision::Hit, Decision::Stand];
        let can_cover = self.bankroll >= hand.bet();
        let two_cards = hand.cards().len() == 2;
        if two_cards && can_cover && (!hand.is_split() || self.rule.allow_das) {
            actions.push(Decision::Double);
        }
        if hand.is_pair()
            && can_cover
            && !hand.is_split_aces()
            && self.round.hands.len() < self.rule.max_hands as usize
        {
            actions.push(Decision::Split);
        }
        if self.rule.allow_late_surrender
            && two_cards
            && !hand.is_split()
            && self.round.hands.len() == 1
        {
            actions.push(Decision::Surrender);
        }
        actions
    }

    /// Applies one player action to the current hand.
    #[allowed_phase(PlayerTurn)]
    pub fn act(&mut self, decision: Decision) -> Result<(), EngineError> {
        if !self.valid_actions().contains(&decision) {
            return Err(EngineError::InvalidAction(format!(
                "{} is not allowed for the current hand",
                decision
            )));
        }
        let cards_needed = match decision {
            Decision::Hit | Decision::Double => 1,
            Decision::Split => 2,
            Decision::Stand | Decision::Surrender => 0,
        };
        if self.shoe.len() - self.cards_in_play().len() < cards_needed {
            return Err(EngineError::ShoeExhausted);
        }

        let index = self.round.current_hand_index;
        match decision {
            Decision::Hit => {
                let card = self.draw()?;
                let hand = &mut self.round.hands[index];
                hand.receive_card(card);
                if hand.is_bust() {
                    hand.finish();
                }
            }
            Decision::Stand => self.round.hands[index].finish(),
            Decision::Double => {
                let card = self.draw()?;
                let hand = &mut self.round.hands[index];
                self.bankroll -= hand.bet();
                hand.double_down();
                hand.receive_card(card);
                hand.finish();
            }
            Decision::Split => {
                let new_hand = self.round.hands[index].split().ok_or_else(|| {
                    EngineError::InvalidAction(String::from("only a pair can be split"))
                })?;
                self.bankroll -= new_hand.bet();
                self.round.hands.insert(index + 1, new_hand);
                for split_index in [index, index + 1] {
                    let card = self.draw()?;
                    let hand = &mut self.round.hands[split_index];
                    hand.receive_card(card);
                    if hand.is_split_aces() {
                        hand.finish();
                    }
                }
            }
            Decision::Surrender => self.round.hands[index].surrender(),
        }

        self.advance()
    }

    pub fn hit(&mut self) -> Result<(), EngineError> {
        self.act(Decision::Hit)
    }

    pub fn stand(&mut self) -> Result<(), EngineError> {
        self.act(Decision::Stand)
    }

    pub fn double_down(&mut self) -> Result<(), EngineError> {
        self.act(Decision::Double)
    }

    pub fn split(&mut self) -> Result<(), EngineError> {
        self.act(Decision::Split)
    }

    pub fn surrender(&mut self) -> Result<(), EngineError> {
        self.act(Decision::Surrender)
    }

    /// Lets `strategy` make every remaining decision of the player turn.
    /// Returns the decisions taken.
    #[allowed_phase(PlayerTurn)]
    pub fn auto_play(&mut self, strategy: &PlayingStrategy) -> Result<Vec<Decision>, EngineError> {
        let mut decisions = Vec::new();
        self.play_out(strategy, &mut (), &mut decisions)?;
        Ok(decisions)
    }

    /// Plays one whole round: bet, every decision from `strategy`, dealer turn
    /// and settlement. The table is left in `RoundOver`.
    #[allowed_phase(Betting)]
    pub fn play_round<H: RoundEventHandler>(
        &mut self,
        bet: i64,
        strategy: &PlayingStrategy,
        handler: &mut H,
    ) -> Result<&[HandResult], EngineError> {
        handler.on_round_begin(&self.shoe);
        self.place_bet(bet)?;
        handler.on_bet(bet, self.shoe.adjusted_true_count());
        if let Some(up_card) = self.dealer_up_card() {
            handler.on_deal(&self.round.hands[0], up_card);
        }

        let mut decisions = Vec::new();
        self.play_out(strategy, handler, &mut decisions)?;

        handler.on_round_end(&self.round.results, &self.round.dealer, self.bankroll);
        Ok(&self.round.results)
    }

    /// Clears the settled round. Reshuffles first when the shoe has passed
    /// its penetration.
    #[allowed_phase(Betting, RoundOver)]
    pub fn new_round(&mut self) -> Result<(), EngineError> {
        if self.shoe.needs_shuffle() {
            self.shoe.shuffle();
        }
        self.round = Round::new();
        Ok(())
    }

    pub fn decision_context(&self) -> Option<DecisionContext<'_>> {
        if self.round.phase != Phase::PlayerTurn {
            return None;
        }
        let hand = self.current_hand()?;
        Some(DecisionContext {
            hand,
            dealer_up_card: self.dealer_up_card()?,
            valid_actions: self.valid_actions(),
            true_count: self.shoe.adjusted_true_count(),
            number_of_hands: self.round.hands.len(),
            rule: &self.rule,
        })
    }

    pub fn phase(&self) -> Phase {
        self.round.phase
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn shoe(&self) -> &Shoe {
        &self.shoe
    }

    pub fn bankroll(&self) -> i64 {
        self.bankroll
    }

    pub fn player_hands(&self) -> &[Hand] {
        &self.round.hands
    }

    pub fn current_hand_index(&self) -> usize {
        self.round.current_hand_index
    }

    pub fn current_hand(&self) -> Option<&Hand> {
        self.round.hands.get(self.round.current_hand_index)
    }

    pub fn dealer_hand(&self) -> &Hand {
        &self.round.dealer
    }

    pub fn dealer_up_card(&self) -> Option<Card> {
        self.round.dealer.cards().first().copied()
    }

    pub fn is_hole_card_revealed(&self) -> bool {
        self.round.hole_card_revealed
    }

    /// Results of the settled round, empty before `RoundOver`.
    pub fn results(&self) -> &[HandResult] {
        &self.round.results
    }

    fn play_out<H: RoundEventHandler>(
        &mut self,
        strategy: &PlayingStrategy,
        handler: &mut H,
        decisions: &mut Vec<Decision>,
    ) -> Result<(), EngineError> {
        while self.round.phase == Phase::PlayerTurn {
            let hand_index = self.round.current_hand_index;
            let decision = match self.decision_context() {
                Some(context) => strategy.decide(&context),
                None => break,
            };
            handler.on_decision(decision, hand_index);
            self.act(decision)?;
            decisions.push(decision);
        }
        Ok(())
    }

    /// Moves to the next unfinished hand, or to the dealer turn when none is
    /// left.
    fn advance(&mut self) -> Result<(), EngineError> {
        while let Some(hand) = self.round.hands.get(self.round.current_hand_index) {
            if !hand.is_finished() {
                return Ok(());
            }
            self.round.current_hand_index += 1;
        }
        self.round.current_hand_index = self.round.hands.len() - 1;
        self.round.phase = Phase::DealerTurn;
        self.dealer_plays_and_settle()
    }

    /// Deals the next card, shuffling the discards back in first when the
    /// shoe runs dry mid-round.
    fn draw(&mut self) -> Result<Card, EngineError> {
        if self.shoe.is_empty() {
            let in_play = self.cards_in_play();
            self.shoe.shuffle_discards(&in_play)?;
        }
        self.shoe.deal_one()
    }

    fn cards_in_play(&self) -> Vec<Card> {
        self.round
            .hands
            .iter()
            .chain(std::iter::once(&self.round.dealer))
            .flat_map(|hand| hand.cards().iter().copied())
            .collect()
    }

    fn dealer_must_hit(&self) -> bool {
        let dealer = &self.round.dealer;
        let value = dealer.value();
        value < 17 || (value == 17 && dealer.is_soft() && self.rule.dealer_hit_on_soft17)
    }

    /// Reveals the hole card, draws by the house rule when any hand still
    /// needs the dealer's total, and settles every hand.
    #[allowed_phase(DealerTurn)]
    fn dealer_plays_and_settle(&mut self) -> Result<(), EngineError> {
        if !self.round.hole_card_revealed {
            if let Some(hole) = self.round.dealer.cards().get(1).copied() {
                self.shoe.reveal(hole);
            }
            self.round.hole_card_revealed = true;
        }

        let dealer_needs_to_draw = !self.round.dealer.is_blackjack()
            && self
                .round
                .hands
                .iter()
                .any(|hand| hand.is_live() && !hand.is_blackjack());
        if dealer_needs_to_draw {
            while self.dealer_must_hit() {
                let card = self.draw()?;
                self.round.dealer.receive_card(card);
            }
        }

        let results: Vec<HandResult> = self
            .round
            .hands
            .iter()
            .map(|hand| settle_hand(hand, &self.round.dealer, &self.rule))
            .collect();
        let payout: i64 = results.iter().map(|result| result.payout).sum();
        self.bankroll += payout;
        debug!(
            hands = results.len(),
            dealer_value = self.round.dealer.value(),
            payout,
            bankroll = self.bankroll,
            "round settled"
        );
        self.round.results = results;
        self.round.phase = Phase::RoundOver;
        Ok(())
    }
}

fn settle_hand(hand: &Hand, dealer: &Hand, rule: &Rule) -> HandResult {
    let bet = hand.bet();
    let dealer_value = dealer.value();
    let player_value = hand.value();
    let (outcome, payout) = if hand.is_surrendered() {
        (Outcome::Surrender, bet / 2)
    } else if hand.is_bust() {
        (Outcome::Lose, 0)
    } else if hand.is_blackjack() && dealer.is_blackjack() {
        (Outcome::Push, bet)
    } else if hand.is_blackjack() {
        (
            Outcome::Blackjack,
            bet + rule.payout_blackjack.winnings(bet),
        )
    } else if dealer.is_blackjack() {
        (Outcome::Lose, 0)
    } else if dealer.is_bust() || player_value > dealer_value {
        (Outcome::Win, bet * 2)
    } else if player_value == dealer_value {
        (Outcome::Push, bet)
    } else {
        (Outcome::Lose, 0)
    };
    HandResult {
        outcome,
        bet,
        payout,
        net: payout - bet,
        player_value,
        dealer_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PeekPolicy;
    use proptest::prelude::*;

    fn table_with_firsts(firsts: &[u8]) -> Table {
        let mut table = Table::with_seed(Rule::default(), 1000, CountingSystem::hi_lo(), 11).unwrap();
        table.shuffle_with_firsts(firsts).unwrap();
        table
    }

    #[test]
    fn test_allowed_phase() {
        let mut table = table_with_firsts(&[]);
        assert_eq!(table.phase(), Phase::Betting);
        assert!(matches!(table.hit(), Err(EngineError::InvalidAction(_))));
        assert!(matches!(table.new_round(), Ok(())));
        assert_eq!(table.bankroll(), 1000);
    }

    #[test]
    fn invalid_bets_leave_state_unchanged() {
        let mut table = table_with_firsts(&[10, 7, 9, 10]);
        assert!(matches!(
            table.place_bet(4),
            Err(EngineError::InvalidBet { amount: 4, .. })
        ));
        assert!(table.place_bet(501).is_err());
        let mut poor = Table::with_seed(Rule::default(), 20, CountingSystem::hi_lo(), 1).unwrap();
        assert!(poor.place_bet(25).is_err());
        assert_eq!(poor.bankroll(), 20);
        assert_eq!(table.phase(), Phase::Betting);
        assert_eq!(table.shoe().remaining(), 312);
    }

    #[test]
    fn deal_order_is_player_dealer_player_dealer() {
        let mut table = table_with_firsts(&[10, 7, 9, 10]);
        table.place_bet(10).unwrap();
        assert_eq!(table.phase(), Phase::PlayerTurn);
        assert_eq!(table.player_hands()[0].value(), 19);
        assert_eq!(table.dealer_up_card().map(|c| c.blackjack_value()), Some(7));
        assert!(!table.is_hole_card_revealed());
        assert_eq!(table.bankroll(), 990);
        assert_eq!(
            table.valid_actions(),
            vec![Decision::Hit, Decision::Stand, Decision::Double, Decision::Surrender]
        );
    }

    #[test]
    fn stand_wins_against_lower_dealer() {
        let mut table = table_with_firsts(&[10, 7, 9, 10]);
        table.place_bet(10).unwrap();
        table.stand().unwrap();
        assert_eq!(table.phase(), Phase::RoundOver);
        let result = &table.results()[0];
        assert_eq!(result.outcome, Outcome::Win);
        assert_eq!(result.net, 10);
        assert_eq!(result.dealer_value, 17);
        assert_eq!(table.bankroll(), 1010);
        assert!(table.is_hole_card_revealed());
    }

    #[test]
    fn player_blackjack_pays_three_to_two_and_dealer_does_not_draw() {
        let mut table = table_with_firsts(&[1, 6, 10, 10, 5]);
        table.place_bet(10).unwrap();
        assert_eq!(table.phase(), Phase::RoundOver);
        assert_eq!(table.dealer_hand().cards().len(), 2);
        let result = &table.results()[0];
        assert_eq!(result.outcome, Outcome::Blackjack);
        assert_eq!(result.payout, 25);
        assert_eq!(table.bankroll(), 1015);
    }

    #[test]
    fn both_blackjack_is_a_push() {
        let mut table = table_with_firsts(&[1, 1, 10, 10]);
        table.place_bet(10).unwrap();
        assert_eq!(table.phase(), Phase::RoundOver);
        assert_eq!(table.results()[0].outcome, Outcome::Push);
        assert_eq!(table.bankroll(), 1000);
    }

    #[test]
    fn dealer_peeked_natural_ends_round() {
        let mut table = table_with_firsts(&[10, 10, 9, 1]);
        table.place_bet(10).unwrap();
        assert_eq!(table.phase(), Phase::RoundOver);
        assert_eq!(table.results()[0].outcome, Outcome::Lose);
        assert_eq!(table.bankroll(), 990);
    }

    #[test]
    fn unpeeked_natural_beats_player_21() {
        let mut rule = Rule::default();
        rule.peek_policy = PeekPolicy::NoPeek;
        let mut table = Table::with_seed(rule, 1000, CountingSystem::hi_lo(), 5).unwrap();
        table.shuffle_with_firsts(&[5, 10, 6, 1, 10]).unwrap();
        table.place_bet(10).unwrap();
        assert_eq!(table.phase(), Phase::PlayerTurn);
        table.hit().unwrap();
        assert_eq!(table.player_hands()[0].value(), 21);
        table.stand().unwrap();
        assert_eq!(table.results()[0].outcome, Outcome::Lose);
    }

    #[test]
    fn bust_loses_and_dealer_skips_drawing() {
        let mut table = table_with_firsts(&[10, 6, 6, 10, 10, 5]);
        table.place_bet(10).unwrap();
        table.hit().unwrap();
        assert_eq!(table.phase(), Phase::RoundOver);
        assert_eq!(table.dealer_hand().cards().len(), 2);
        assert_eq!(table.results()[0].outcome, Outcome::Lose);
        assert_eq!(table.results()[0].net, -10);
        assert!(table.hit().is_err());
    }

    #[test]
    fn dealer_hits_soft_17_only_when_configured() {
        // Dealer shows A, hole 6, next card 3.
        let firsts = [10, 1, 9, 6, 3];
        let mut table = table_with_firsts(&firsts);
        table.place_bet(10).unwrap();
        table.stand().unwrap();
        assert_eq!(table.dealer_hand().value(), 17);
        assert_eq!(table.results()[0].outcome, Outcome::Win);

        let mut rule = Rule::default();
        rule.dealer_hit_on_soft17 = true;
        let mut table = Table::with_seed(rule, 1000, CountingSystem::hi_lo(), 3).unwrap();
        table.shuffle_with_firsts(&firsts).unwrap();
        table.place_bet(10).unwrap();
        table.stand().unwrap();
        assert_eq!(table.dealer_hand().value(), 20);
        assert_eq!(table.results()[0].outcome, Outcome::Lose);
    }

    #[test]
    fn dealer_draws_deterministically() {
        let firsts = [10, 2, 8, 3, 2, 2, 10];
        let mut a = table_with_firsts(&firsts);
        let mut b = table_with_firsts(&firsts);
        for table in [&mut a, &mut b] {
            table.place_bet(10).unwrap();
            table.stand().unwrap();
        }
        assert_eq!(a.dealer_hand().cards(), b.dealer_hand().cards());
        assert_eq!(a.dealer_hand().value(), 19);
    }

    #[test]
    fn double_draws_one_card_and_doubles_stake() {
        let mut table = table_with_firsts(&[6, 9, 5, 8, 10]);
        table.place_bet(10).unwrap();
        table.double_down().unwrap();
        assert_eq!(table.player_hands()[0].cards().len(), 3);
        assert_eq!(table.player_hands()[0].value(), 21);
        let result = &table.results()[0];
        assert_eq!(result.bet, 20);
        assert_eq!(result.net, 20);
        assert_eq!(table.bankroll(), 1020);
    }

    #[test]
    fn surrender_returns_half() {
        let mut table = table_with_firsts(&[10, 10, 6, 9]);
        table.place_bet(10).unwrap();
        table.surrender().unwrap();
        assert_eq!(table.phase(), Phase::RoundOver);
        let result = &table.results()[0];
        assert_eq!(result.outcome, Outcome::Surrender);
        assert_eq!(result.net, -5);
        assert_eq!(table.bankroll(), 995);
        assert_eq!(table.dealer_hand().cards().len(), 2);
    }

    #[test]
    fn split_plays_hands_left_to_right() {
        // Player 8 8, dealer 6 + 10. Splits get 3 and 10; first hand hits a 10.
        let mut table = table_with_firsts(&[8, 6, 8, 10, 3, 10, 10]);
        table.place_bet(10).unwrap();
        assert!(table.valid_actions().contains(&Decision::Split));
        table.split().unwrap();
        assert_eq!(table.player_hands().len(), 2);
        assert_eq!(table.bankroll(), 980);
        assert_eq!(table.current_hand_index(), 0);
        assert_eq!(table.player_hands()[0].value(), 11);
        assert_eq!(table.player_hands()[1].value(), 18);
        // No re-split and no surrender on split hands.
        assert!(!table.valid_actions().contains(&Decision::Surrender));
        table.hit().unwrap();
        assert_eq!(table.player_hands()[0].value(), 21);
        table.stand().unwrap();
        assert_eq!(table.current_hand_index(), 1);
        table.stand().unwrap();
        assert_eq!(table.phase(), Phase::RoundOver);
        assert_eq!(table.results().len(), 2);
    }

    #[test]
    fn split_aces_get_one_card_each() {
        let mut table = table_with_firsts(&[1, 9, 1, 8, 10, 5]);
        table.place_bet(10).unwrap();
        table.split().unwrap();
        assert_eq!(table.phase(), Phase::RoundOver);
        let hands = table.player_hands();
        assert!(hands.iter().all(|hand| hand.cards().len() == 2));
        assert!(hands.iter().all(|hand| hand.is_split_aces()));
        assert_eq!(hands[0].value(), 21);
        assert!(!hands[0].is_blackjack());
        assert_eq!(table.results()[0].outcome, Outcome::Win);
        assert_eq!(table.results()[0].net, 10);
    }

    #[test]
    fn dealer_draws_from_discards_when_the_shoe_runs_dry() {
        let rule = Rule {
            number_of_decks: 1,
            penetration: 1.0,
            max_hands: 3,
            ..Rule::default()
        };
        let mut table = Table::with_seed(rule, 100, CountingSystem::hi_lo(), 5).unwrap();
        let mut firsts = vec![6, 6, 6, 6, 7, 7, 7, 7, 8, 8, 8, 8, 9, 9, 9, 9];
        firsts.extend([10; 16]);
        firsts.extend([4, 2, 4, 3]);
        firsts.extend([4, 5, 5, 5, 5, 4, 3, 3, 3, 2, 2, 2, 1, 1, 1, 1]);
        table.shuffle_with_firsts(&firsts).unwrap();
        let mut discards = Vec::new();
        for _ in 0..32 {
            discards.push(table.shoe.deal_one().unwrap());
        }

        table.place_bet(10).unwrap();
        table.split().unwrap();
        table.split().unwrap();
        assert_eq!(table.player_hands().len(), 3);
        assert_eq!(table.bankroll(), 70);
        for _ in 0..3 {
            table.hit().unwrap();
        }
        table.stand().unwrap();
        for _ in 0..5 {
            table.hit().unwrap();
        }
        table.stand().unwrap();
        for _ in 0..4 {
            table.hit().unwrap();
        }
        assert_eq!(table.shoe().remaining(), 0);
        let values: Vec<u16> = table.player_hands().iter().map(|hand| hand.value()).collect();
        assert_eq!(values, vec![21, 21, 13]);

        table.stand().unwrap();
        assert_eq!(table.phase(), Phase::RoundOver);
        assert!(table.dealer_hand().value() >= 17);
        assert!(table.dealer_hand().cards()[2..]
            .iter()
            .all(|card| discards.contains(card)));
        let payout: i64 = table.results().iter().map(|result| result.payout).sum();
        let net: i64 = table.results().iter().map(|result| result.net).sum();
        assert_eq!(table.bankroll(), 70 + payout);
        assert_eq!(table.bankroll(), 100 + net);
        table.new_round().unwrap();
        assert_eq!(table.phase(), Phase::Betting);
    }

    #[test]
    fn actions_outside_valid_set_fail_without_change() {
        let mut table = table_with_firsts(&[10, 7, 9, 10]);
        table.place_bet(10).unwrap();
        let remaining = table.shoe().remaining();
        assert!(matches!(
            table.split(),
            Err(EngineError::InvalidAction(_))
        ));
        assert_eq!(table.shoe().remaining(), remaining);
        assert_eq!(table.bankroll(), 990);
    }

    #[test]
    fn double_requires_bankroll() {
        let mut table = Table::with_seed(Rule::default(), 15, CountingSystem::hi_lo(), 2).unwrap();
        table.shuffle_with_firsts(&[5, 9, 6, 7]).unwrap();
        table.place_bet(10).unwrap();
        assert!(!table.valid_actions().contains(&Decision::Double));
        assert!(table.double_down().is_err());
    }

    #[test]
    fn new_round_keeps_bankroll_and_shoe() {
        let mut table = table_with_firsts(&[10, 7, 9, 10]);
        table.place_bet(10).unwrap();
        assert!(table.new_round().is_err());
        table.stand().unwrap();
        let remaining = table.shoe().remaining();
        table.new_round().unwrap();
        assert_eq!(table.phase(), Phase::Betting);
        assert!(table.results().is_empty());
        assert_eq!(table.bankroll(), 1010);
        assert_eq!(table.shoe().remaining(), remaining);
    }

    #[test]
    fn auto_play_finishes_the_player_turn() {
        let mut table = table_with_firsts(&[10, 10, 2, 9, 10]);
        table.place_bet(10).unwrap();
        let decisions = table.auto_play(&PlayingStrategy::Basic).unwrap();
        assert_eq!(decisions, vec![Decision::Hit]);
        assert_eq!(table.phase(), Phase::RoundOver);
    }

    struct Recorder {
        decisions: usize,
        rounds: usize,
    }

    impl RoundEventHandler for Recorder {
        fn on_decision(&mut self, _decision: Decision, _hand_index: usize) {
            self.decisions += 1;
        }

        fn on_round_end(&mut self, _results: &[HandResult], _dealer: &Hand, _bankroll: i64) {
            self.rounds += 1;
        }
    }

    #[test]
    fn play_round_notifies_handler() {
        let mut table = table_with_firsts(&[10, 7, 9, 10]);
        let mut recorder = Recorder {
            decisions: 0,
            rounds: 0,
        };
        let results = table
            .play_round(10, &PlayingStrategy::Basic, &mut recorder)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(recorder.decisions, 1);
        assert_eq!(recorder.rounds, 1);
    }

    proptest! {
        #[test]
        fn bankroll_is_conserved(seed in any::<u64>(), bet in 5i64..=100) {
            let mut table =
                Table::with_seed(Rule::default(), 1000, CountingSystem::hi_lo(), seed).unwrap();
            let before = table.bankroll();
            let results = table.play_round(bet, &PlayingStrategy::Basic, &mut ()).unwrap().to_vec();
            let stake: i64 = results.iter().map(|result| result.bet).sum();
            let payout: i64 = results.iter().map(|result| result.payout).sum();
            let net: i64 = results.iter().map(|result| result.net).sum();
            prop_assert_eq!(table.bankroll(), before - stake + payout);
            prop_assert_eq!(net, payout - stake);
        }
    }
}
