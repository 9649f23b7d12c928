pub mod dealer_play;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_enum_str::{Deserialize_enum_str, Serialize_enum_str};

use crate::strategy::BasicStrategy;
use crate::table::{Card, Hand, Phase, Table};
use crate::{CardCount, Decision, Rule, SingleStateArray};

pub use self::dealer_play::{dealer_distribution, DealerDistribution};

/// Dealer distributions are cached per unseen composition. The cache is
/// dropped once it holds this many compositions.
const DEALER_CACHE_LIMIT: usize = 4096;
/// EVs closer than this are treated as equal.
const EV_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_enum_str, Deserialize_enum_str)]
pub enum HandStrength {
    #[serde(rename = "blackjack")]
    Blackjack,
    #[serde(rename = "very_strong")]
    VeryStrong,
    #[serde(rename = "strong")]
    Strong,
    #[serde(rename = "moderate")]
    Moderate,
    #[serde(rename = "weak")]
    Weak,
    #[serde(rename = "very_weak")]
    VeryWeak,
}

impl HandStrength {
    pub fn of(hand: &Hand) -> Self {
        match hand.value() {
            _ if hand.is_blackjack() => HandStrength::Blackjack,
            20..=u16::MAX => HandStrength::VeryStrong,
            18..=19 => HandStrength::Strong,
            15..=17 => HandStrength::Moderate,
            12..=14 => HandStrength::Weak,
            _ => HandStrength::VeryWeak,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeProbabilities {
    pub win: f64,
    pub lose: f64,
    pub push: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerHandStatistics {
    pub value: u16,
    pub is_soft: bool,
    pub strength: HandStrength,
    /// Probability that one more card busts the hand.
    pub bust_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealerStatistics {
    pub up_card: Card,
    pub bust_probability: f64,
    pub final_value_probabilities: DealerDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// The legal action with the highest expected value.
    pub action: Decision,
    pub basic_strategy_action: Decision,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub player_hand: PlayerHandStatistics,
    pub dealer: DealerStatistics,
    /// Standing now against the dealer distribution.
    pub outcome_probabilities: OutcomeProbabilities,
    /// Per unit of the hand's current stake, for every legal action.
    pub expected_values: BTreeMap<Decision, f64>,
    pub recommendation: Recommendation,
}

/// Live guidance for the player. Only available during the player turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveStatistics {
    pub available: bool,
    pub true_count: f64,
    #[serde(flatten)]
    pub analysis: Option<Analysis>,
}

/// Exact probability and EV analysis of the current player decision.
#[derive(Debug, Clone)]
pub struct Analyzer {
    rule: Rule,
    dealer_cache: SingleStateArray<[Option<DealerDistribution>; 10]>,
}

impl Analyzer {
    pub fn new(rule: Rule) -> Self {
        Analyzer {
            rule,
            dealer_cache: SingleStateArray::new(),
        }
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// Unavailable, not an error, outside `PlayerTurn`.
    pub fn analyze(&mut self, table: &Table) -> LiveStatistics {
        let true_count = table.shoe().adjusted_true_count();
        let unavailable = LiveStatistics {
            available: false,
            true_count,
            analysis: None,
        };
        if table.phase() != Phase::PlayerTurn {
            return unavailable;
        }
        let (hand, up_card) = match (table.current_hand(), table.dealer_up_card()) {
            (Some(hand), Some(up_card)) => (hand, up_card),
            _ => return unavailable,
        };

        // The hole card is still unseen from the player's point of view.
        let mut unseen = *table.shoe().get_card_count();
        if let Some(hole_card) = table.dealer_hand().cards().get(1) {
            unseen.add_card(hole_card.blackjack_value());
        }

        let analysis = self.analyze_hand(hand, up_card, &unseen, &table.valid_actions());
        LiveStatistics {
            available: true,
            true_count,
            analysis: Some(analysis),
        }
    }

    /// Analysis of `hand` against `up_card`, where `unseen` is every card
    /// the player has not seen.
    pub fn analyze_hand(
        &mut self,
        hand: &Hand,
        up_card: Card,
        unseen: &CardCount,
        valid_actions: &[Decision],
    ) -> Analysis {
        let up_value = up_card.blackjack_value();
        let dealer = self.dealer_distribution(unseen, up_value);
        let player = hand.get_card_count();
        let value = hand.value();

        let outcome_probabilities = if hand.is_bust() {
            OutcomeProbabilities {
                win: 0.0,
                lose: 1.0,
                push: 0.0,
            }
        } else {
            OutcomeProbabilities {
                win: dealer.p_worse_than_player(value),
                lose: dealer.p_better_than_player(value),
                push: dealer.p_same_as_player(value),
            }
        };

        let mut evaluator = PlayerEvaluator::new(&dealer, unseen);
        let expected_values: BTreeMap<Decision, f64> = valid_actions
            .iter()
            .map(|decision| {
                let ev = match decision {
                    Decision::Stand => stand_ev(&dealer, player),
                    Decision::Hit => evaluator.hit_ev(player),
                    Decision::Double => evaluator.double_ev(player),
                    Decision::Split => evaluator.split_ev(player),
                    Decision::Surrender => -0.5,
                };
                (*decision, ev)
            })
            .collect();

        let action = best_action(&expected_values).unwrap_or(Decision::Stand);
        let basic_strategy_action = BasicStrategy::chart_action(player, up_value, valid_actions);

        Analysis {
            player_hand: PlayerHandStatistics {
                value,
                is_soft: hand.is_soft(),
                strength: HandStrength::of(hand),
                bust_probability: evaluator.bust_probability(player),
            },
            dealer: DealerStatistics {
                up_card,
                bust_probability: dealer.bust,
                final_value_probabilities: dealer,
            },
            outcome_probabilities,
            expected_values,
            recommendation: Recommendation {
                action,
                basic_strategy_action,
                explanation: explain(hand, up_value, basic_strategy_action, &dealer),
            },
        }
    }

    /// Cached by unseen composition and up card.
    pub fn dealer_distribution(&mut self, unseen: &CardCount, up_card: u8) -> DealerDistribution {
        let slot = (up_card - 1) as usize;
        if let Some(Some(distribution)) = self.dealer_cache.get(unseen).map(|cached| cached[slot]) {
            return distribution;
        }
        if self.dealer_cache.len() >= DEALER_CACHE_LIMIT {
            self.dealer_cache.clear();
        }
        let distribution = dealer_distribution(&self.rule, unseen, up_card);
        self.dealer_cache.get_or_default(unseen)[slot] = Some(distribution);
        distribution
    }
}

/// Tie order: stand, hit, double, split, surrender.
fn best_action(expected_values: &BTreeMap<Decision, f64>) -> Option<Decision> {
    let mut best: Option<(Decision, f64)> = None;
    for decision in Decision::TIE_ORDER {
        if let Some(ev) = expected_values.get(&decision) {
            match best {
                Some((_, best_ev)) if *ev <= best_ev + EV_EPSILON => {}
                _ => best = Some((decision, *ev)),
            }
        }
    }
    best.map(|(decision, _)| decision)
}

fn stand_ev(dealer: &DealerDistribution, player: &CardCount) -> f64 {
    if player.bust() {
        return -1.0;
    }
    let value = player.get_actual_sum();
    dealer.p_worse_than_player(value) - dealer.p_better_than_player(value)
}

/// Player-side expectations against a fixed dealer distribution. Cards the
/// player draws are removed from the unseen pool; the dealer distribution is
/// not recomputed for them.
struct PlayerEvaluator<'a> {
    dealer: &'a DealerDistribution,
    unseen: &'a CardCount,
    /// Best EV of continuing with hit or stand, keyed by the player's hand.
    /// Hands that share a composition share a pool, as long as the starting
    /// hand is the same.
    best_ev: SingleStateArray<f64>,
}

impl<'a> PlayerEvaluator<'a> {
    fn new(dealer: &'a DealerDistribution, unseen: &'a CardCount) -> Self {
        PlayerEvaluator {
            dealer,
            unseen,
            best_ev: SingleStateArray::new(),
        }
    }

    /// Probabilities of the next card by value, given the cards the player
    /// drew since the start of the evaluation.
    fn draw_probabilities(&self, drawn: &CardCount) -> Option<[f64; 10]> {
        let total = self.unseen.get_total().saturating_sub(drawn.get_total());
        if total == 0 {
            return None;
        }
        let mut probabilities = [0.0; 10];
        for card_value in 1..=10u8 {
            let left = self.unseen[card_value].saturating_sub(drawn[card_value]);
            probabilities[(card_value - 1) as usize] = left as f64 / total as f64;
        }
        Some(probabilities)
    }

    fn bust_probability(&self, player: &CardCount) -> f64 {
        let probabilities = match self.draw_probabilities(&CardCount::empty()) {
            Some(probabilities) => probabilities,
            None => return 0.0,
        };
        (1..=10u16)
            .filter(|card_value| player.get_sum() + card_value > 21)
            .map(|card_value| probabilities[(card_value - 1) as usize])
            .sum()
    }

    fn hit_ev(&mut self, player: &CardCount) -> f64 {
        self.best_ev.clear();
        let mut hand = *player;
        let mut drawn = CardCount::empty();
        self.hit_ev_from(&mut hand, &mut drawn)
    }

    fn hit_ev_from(&mut self, hand: &mut CardCount, drawn: &mut CardCount) -> f64 {
        let probabilities = match self.draw_probabilities(drawn) {
            Some(probabilities) => probabilities,
            None => return stand_ev(self.dealer, hand),
        };
        let mut ev = 0.0;
        for card_value in 1..=10u8 {
            let p = probabilities[(card_value - 1) as usize];
            if p == 0.0 {
                continue;
            }
            hand.add_card(card_value);
            drawn.add_card(card_value);
            let next = if hand.bust() {
                -1.0
            } else {
                self.best_ev_from(hand, drawn)
            };
            drawn.remove_card(card_value);
            hand.remove_card(card_value);
            ev += p * next;
        }
        ev
    }

    fn best_ev_from(&mut self, hand: &mut CardCount, drawn: &mut CardCount) -> f64 {
        if let Some(ev) = self.best_ev.get(hand) {
            return *ev;
        }
        let stand = stand_ev(self.dealer, hand);
        let ev = if hand.get_actual_sum() >= 21 {
            stand
        } else {
            stand.max(self.hit_ev_from(hand, drawn))
        };
        self.best_ev.insert(hand, ev);
        ev
    }

    fn double_ev(&self, player: &CardCount) -> f64 {
        self.one_card_stand_ev(player) * 2.0
    }

    /// Two independent hands, each starting from one card of the pair and
    /// played with hit or stand. Split Aces get exactly one card.
    fn split_ev(&self, player: &CardCount) -> f64 {
        let pair_value = match (1..=10u8).find(|card_value| player[*card_value] == 2) {
            Some(pair_value) => pair_value,
            None => return -1.0,
        };
        let mut single = CardCount::empty();
        single.add_card(pair_value);
        let ev = if pair_value == 1 {
            self.one_card_stand_ev(&single)
        } else {
            let mut evaluator = PlayerEvaluator::new(self.dealer, self.unseen);
            let mut drawn = CardCount::empty();
            let mut hand = single;
            let probabilities = match self.draw_probabilities(&drawn) {
                Some(probabilities) => probabilities,
                None => return -1.0,
            };
            let mut ev = 0.0;
            for card_value in 1..=10u8 {
                let p = probabilities[(card_value - 1) as usize];
                if p == 0.0 {
                    continue;
                }
                hand.add_card(card_value);
                drawn.add_card(card_value);
                ev += p * evaluator.best_ev_from(&mut hand, &mut drawn);
                drawn.remove_card(card_value);
                hand.remove_card(card_value);
            }
            ev
        };
        ev * 2.0
    }

    /// Standing after exactly one more card.
    fn one_card_stand_ev(&self, player: &CardCount) -> f64 {
        let probabilities = match self.draw_probabilities(&CardCount::empty()) {
            Some(probabilities) => probabilities,
            None => return stand_ev(self.dealer, player),
        };
        let mut hand = *player;
        let mut ev = 0.0;
        for card_value in 1..=10u8 {
            let p = probabilities[(card_value - 1) as usize];
            if p == 0.0 {
                continue;
            }
            hand.add_card(card_value);
            ev += p * stand_ev(self.dealer, &hand);
            hand.remove_card(card_value);
        }
        ev
    }
}

fn explain(hand: &Hand, dealer_value: u8, action: Decision, dealer: &DealerDistribution) -> String {
    let value = hand.value();
    let dealer_bust = dealer.bust * 100.0;
    match action {
        Decision::Hit if value <= 11 => format!(
            "With {} you cannot bust, improve against the dealer's {}",
            value, dealer_value
        ),
        Decision::Hit if hand.is_soft() => {
            format!("Soft {} cannot bust on one card, worth improving", value)
        }
        Decision::Hit => format!(
            "Dealer showing {} is strong, {} needs improving",
            dealer_value, value
        ),
        Decision::Stand if value >= 17 => format!(
            "{} is strong enough against the dealer's {}",
            value, dealer_value
        ),
        Decision::Stand if (2..=6).contains(&dealer_value) => format!(
            "Dealer showing {} busts {:.1}% of the time, let the dealer take the risk",
            dealer_value, dealer_bust
        ),
        Decision::Stand => format!("Hitting {} is too likely to bust", value),
        Decision::Double if value == 11 => {
            String::from("11 is the best doubling hand, any ten makes 21")
        }
        Decision::Double if (2..=6).contains(&dealer_value) => format!(
            "Double against the weak dealer {} (busts {:.1}%)",
            dealer_value, dealer_bust
        ),
        Decision::Double => format!("{} against {} is worth a double", value, dealer_value),
        Decision::Split => match hand.cards().first().map(|card| card.blackjack_value()) {
            Some(1) => String::from("Always split Aces, two chances at 21"),
            Some(8) => String::from("Always split 8s, a hard 16 becomes two fair hands"),
            Some(pair) => format!("Splitting {}s against {} gains value", pair, dealer_value),
            None => String::from("Split the pair"),
        },
        Decision::Surrender => format!(
            "{} against {} loses more than half the stake on average, surrender",
            value, dealer_value
        ),
    }
}
