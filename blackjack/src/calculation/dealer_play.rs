use serde::{Deserialize, Serialize};

use crate::{CardCount, Rule, SingleStateArray};

/// Probability mass over the dealer's final hand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DealerDistribution {
    /// Finishing on 17, 18, 19, 20 and 21 (not a natural).
    pub totals: [f64; 5],
    pub bust: f64,
    /// Two-card 21. Zero once the dealer has peeked and found none.
    pub natural: f64,
}

impl DealerDistribution {
    pub fn total(&self, value: u16) -> f64 {
        match value {
            17..=21 => self.totals[(value - 17) as usize],
            _ => 0.0,
        }
    }

    /// Dealer busts or stands on less than `player_value`.
    pub fn p_worse_than_player(&self, player_value: u16) -> f64 {
        self.bust + (17..player_value.min(22)).map(|v| self.total(v)).sum::<f64>()
    }

    pub fn p_same_as_player(&self, player_value: u16) -> f64 {
        self.total(player_value)
    }

    /// Dealer natural, or a higher standing total.
    pub fn p_better_than_player(&self, player_value: u16) -> f64 {
        self.natural
            + (player_value.max(16) + 1..=21)
                .map(|v| self.total(v))
                .sum::<f64>()
    }

    pub fn sum(&self) -> f64 {
        self.totals.iter().sum::<f64>() + self.bust + self.natural
    }

    fn end_with_bust() -> Self {
        DealerDistribution {
            bust: 1.0,
            ..Default::default()
        }
    }

    fn end_with_normal(dealer_actual_sum: u16) -> Self {
        let mut distribution = DealerDistribution::default();
        distribution.totals[(dealer_actual_sum - 17) as usize] = 1.0;
        distribution
    }

    fn end_with_natural() -> Self {
        DealerDistribution {
            natural: 1.0,
            ..Default::default()
        }
    }

    fn add_assign_with_p(&mut self, rhs: &Self, p: f64) {
        for (total, rhs_total) in self.totals.iter_mut().zip(rhs.totals.iter()) {
            *total += rhs_total * p;
        }
        self.bust += rhs.bust * p;
        self.natural += rhs.natural * p;
    }
}

/// Exact final-hand distribution of a dealer showing `up_card` (Ace is 1),
/// drawing without replacement from `unseen`. `unseen` holds every card the
/// player cannot see, the hole card included, but not the up card.
///
/// When the rule makes the dealer peek at this up card, the hole card is
/// known not to complete a natural and the distribution is conditioned on it.
pub fn dealer_distribution(rule: &Rule, unseen: &CardCount, up_card: u8) -> DealerDistribution {
    let impossible_hole_card = if !rule.dealer_peeks(up_card) {
        0
    } else if up_card == 1 {
        10
    } else if up_card == 10 {
        1
    } else {
        0
    };

    let mut dealer_hand = CardCount::empty();
    dealer_hand.add_card(up_card);
    let mut odds = SingleStateArray::new();
    memoization_dealer_gets_cards(
        rule,
        unseen,
        up_card,
        impossible_hole_card,
        &mut dealer_hand,
        &mut odds,
    )
}

fn memoization_dealer_gets_cards(
    // Input parameters
    rule: &Rule,
    unseen: &CardCount,
    up_card: u8,
    impossible_hole_card: u8,

    // Parameters to maintain current state
    dealer_hand: &mut CardCount,

    // Output parameters
    odds: &mut SingleStateArray<DealerDistribution>,
) -> DealerDistribution {
    if let Some(distribution) = odds.get(dealer_hand) {
        return *distribution;
    }

    // Case 1: Dealer must stand.
    let is_hole_card_draw = dealer_hand.get_total() == 1;
    let actual_sum = dealer_hand.get_actual_sum();
    let finished = if dealer_hand.bust() {
        Some(DealerDistribution::end_with_bust())
    } else if dealer_hand.is_natural() {
        Some(DealerDistribution::end_with_natural())
    } else if actual_sum > 17
        || (actual_sum == 17 && !(dealer_hand.is_soft() && rule.dealer_hit_on_soft17))
    {
        Some(DealerDistribution::end_with_normal(actual_sum))
    } else {
        None
    };
    if let Some(distribution) = finished {
        odds.insert(dealer_hand, distribution);
        return distribution;
    }

    // Case 2: Dealer must hit.
    let mut available = [0u16; 10];
    for card_value in 1..=10u8 {
        if is_hole_card_draw && card_value == impossible_hole_card {
            continue;
        }
        let drawn = dealer_hand[card_value] - u16::from(card_value == up_card);
        available[(card_value - 1) as usize] = unseen[card_value].saturating_sub(drawn);
    }
    let valid_total: u16 = available.iter().sum();
    if valid_total == 0 {
        // An exhausted pool leaves the dealer short of 17, which loses like a
        // bust.
        let distribution = DealerDistribution::end_with_bust();
        odds.insert(dealer_hand, distribution);
        return distribution;
    }

    let mut distribution = DealerDistribution::default();
    for card_value in 1..=10u8 {
        let number = available[(card_value - 1) as usize];
        if number == 0 {
            continue;
        }
        let p = number as f64 / valid_total as f64;
        dealer_hand.add_card(card_value);
        let next = memoization_dealer_gets_cards(
            rule,
            unseen,
            up_card,
            impossible_hole_card,
            dealer_hand,
            odds,
        );
        dealer_hand.remove_card(card_value);
        distribution.add_assign_with_p(&next, p);
    }

    odds.insert(dealer_hand, distribution);
    distribution
}
