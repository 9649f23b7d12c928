use std::collections::HashMap;
use std::hash::Hash;
use std::ops::Index;

const MOD: u128 = 3817949514078926267; // A prime number with 62 bits.
const BASE: u128 = 211;
const POW_BASE: [u128; 10] = get_powers_of_base();

const fn get_powers_of_base() -> [u128; 10] {
    let mut ret: [u128; 10] = [0; 10];
    ret[0] = 1;

    let mut i = 1;
    while i < ret.len() {
        ret[i] = ret[i - 1] * BASE % MOD;
        i += 1;
    }

    ret
}

/// This struct provide a convenient way to use CardCount as the index of the
/// array. The analyzer memoizes dealer and player states with it.
#[derive(Debug, Default, Clone)]
pub struct SingleStateArray<T: Default> {
    data: HashMap<u128, T>,
}

impl<T: Default> SingleStateArray<T> {
    pub fn new() -> SingleStateArray<T> {
        SingleStateArray {
            data: HashMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn get(&self, index: &CardCount) -> Option<&T> {
        self.data.get(&index.hash_value)
    }

    pub fn insert(&mut self, index: &CardCount, value: T) {
        self.data.insert(index.hash_value, value);
    }

    /// The slot for `index`, filled with `T::default()` on first use.
    pub fn get_or_default(&mut self, index: &CardCount) -> &mut T {
        self.data.entry(index.hash_value).or_default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// This provides a container to store the numbers of each card value (from
/// 1 to 10 inclusive). Ace is stored as 1, every ten-valued rank as 10.
///
/// It describes the undealt part of a shoe as well as the cards of a single
/// hand, which makes a hand value a pure function of its composition.
#[derive(Clone, Copy, Debug)]
pub struct CardCount {
    counts: [u16; 10],
    hash_value: u128,
    sum: u16,
    total: u16,
}

impl CardCount {
    pub fn new(counts: &[u16; 10]) -> CardCount {
        let mut card_count = CardCount {
            counts: *counts,
            hash_value: 0,
            sum: 0,
            total: 0,
        };

        card_count.propagate_counts();

        card_count
    }

    pub fn with_number_of_decks(number_of_decks: u8) -> CardCount {
        let mut counts = [number_of_decks as u16 * 4; 10];
        counts[9] = number_of_decks as u16 * 16;
        Self::new(&counts)
    }

    pub fn empty() -> CardCount {
        Self::new(&[0; 10])
    }

    /// Add a card of given card value.
    ///
    /// Note that this method won't check if the card value is valid.
    pub fn add_card(&mut self, card_value: u8) {
        let index = (card_value - 1) as usize;
        self.counts[index] += 1;
        self.hash_value = (self.hash_value + POW_BASE[index]) % MOD;
        self.sum += card_value as u16;
        self.total += 1;
    }

    /// Remove a card of given card value.
    ///
    /// Note that this method won't check if the card value is valid. It also
    /// won't check if the number of the given card value is already 0.
    pub fn remove_card(&mut self, card_value: u8) {
        let index = (card_value - 1) as usize;
        self.counts[index] -= 1;
        self.hash_value = (self.hash_value + MOD - POW_BASE[index]) % MOD;
        self.sum -= card_value as u16;
        self.total -= 1;
    }

    /// Note that this method treats Ace as 1.
    pub fn get_sum(&self) -> u16 {
        self.sum
    }

    pub fn get_total(&self) -> u16 {
        self.total
    }

    pub fn has_ace(&self) -> bool {
        self.counts[0] > 0
    }

    /// True when one Ace can still be counted as 11 without busting.
    pub fn is_soft(&self) -> bool {
        self.has_ace() && self.sum + 10 <= 21
    }

    pub fn bust(&self) -> bool {
        self.sum > 21
    }

    pub fn is_natural(&self) -> bool {
        self.total == 2 && self.counts[0] == 1 && self.counts[9] == 1
    }

    /// The best total: every Ace counts 1, and one of them is promoted to 11
    /// when that does not bust. Promoting a second Ace would always bust.
    pub fn get_actual_sum(&self) -> u16 {
        if self.is_soft() {
            self.sum + 10
        } else {
            self.sum
        }
    }

    fn propagate_counts(&mut self) {
        self.hash_value = 0;
        self.sum = 0;
        self.total = 0;
        for i in 0..self.counts.len() {
            self.hash_value += (self.counts[i] as u128) * POW_BASE[i];
            self.sum += ((i + 1) as u16) * self.counts[i];
            self.total += self.counts[i];
        }
        self.hash_value %= MOD;
    }
}

impl Index<u8> for CardCount {
    type Output = u16;
    fn index(&self, index: u8) -> &Self::Output {
        &self.counts[(index - 1) as usize]
    }
}

impl Hash for CardCount {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u128(self.hash_value);
    }
}

impl PartialEq for CardCount {
    fn eq(&self, other: &Self) -> bool {
        self.counts == other.counts
    }
}

impl Eq for CardCount {}

impl Default for CardCount {
    fn default() -> Self {
        Self::empty()
    }
}
