use self::private::Statistics;
use blackjack::betting::Bettor;
use blackjack::simulation::SimulationConfig;
use blackjack::table::{Card, Hand, HandResult, RoundEventHandler, Shoe, Table};
use blackjack::{Decision, EngineError};
use tracing::info;

mod private {
    #[derive(Debug, Clone, Copy, Default)]
    pub struct Statistics {
        current_money: i64,
        total_bet: i64,

        last_money: i64,
        last_bet: i64,

        min_money: i64,
    }

    impl Statistics {
        pub fn bet_money(&mut self, money: i64) {
            self.total_bet += money;
            self.current_money -= money;
            if self.min_money > self.current_money {
                self.min_money = self.current_money;
            }
        }

        pub fn receive_money(&mut self, money: i64) {
            self.current_money += money;
        }

        pub fn get_current_money(&self) -> i64 {
            self.current_money
        }

        pub fn get_total_bet(&self) -> i64 {
            self.total_bet
        }

        pub fn get_rate(&self) -> f64 {
            if self.total_bet == 0 {
                return 0.0;
            }
            self.current_money as f64 / self.total_bet as f64
        }

        pub fn get_delta_money(&mut self) -> i64 {
            let ret = self.current_money - self.last_money;
            self.last_money = self.current_money;
            ret
        }

        pub fn get_delta_bet(&mut self) -> i64 {
            let ret = self.total_bet - self.last_bet;
            self.last_bet = self.total_bet;
            ret
        }

        pub fn get_min_money(&self) -> i64 {
            self.min_money
        }
    }
}

/// Prints a transcript of every round and keeps running totals.
#[derive(Debug, Clone, Default)]
struct Handler {
    round_id: u64,
    cards_in_shoe_before_round: usize,
    true_count_before_bet: f64,
    dealer_up_card: Option<Card>,
    decisions: Vec<Vec<String>>,

    stat: Statistics,
}

impl RoundEventHandler for Handler {
    fn on_round_begin(&mut self, shoe: &Shoe) {
        self.round_id += 1;
        self.cards_in_shoe_before_round = shoe.remaining();
        self.dealer_up_card = None;
        self.decisions.clear();
    }

    fn on_bet(&mut self, _bet: i64, true_count: f64) {
        self.true_count_before_bet = true_count;
    }

    fn on_deal(&mut self, _player: &Hand, dealer_up_card: Card) {
        self.dealer_up_card = Some(dealer_up_card);
    }

    fn on_decision(&mut self, decision: Decision, hand_index: usize) {
        while self.decisions.len() <= hand_index {
            self.decisions.push(Vec::new());
        }
        self.decisions[hand_index].push(decision.to_string());
    }

    fn on_round_end(&mut self, results: &[HandResult], dealer: &Hand, bankroll: i64) {
        println!("Round #{}", self.round_id);
        println!(
            "Cards in shoe: {}   True count: {:.2}",
            self.cards_in_shoe_before_round, self.true_count_before_bet
        );
        if let Some(card) = self.dealer_up_card {
            println!("Dealer up card: {}", card);
        }

        for (hand_index, decisions) in self.decisions.iter().enumerate() {
            print!("Decisions for hand {}:", hand_index);
            for decision in decisions {
                print!(" {}", decision);
            }
            println!();
        }

        print!("Dealer cards:");
        for card in dealer.cards() {
            print!(" {}", card);
        }
        println!();

        // Stakes include doubles and splits.
        self.stat
            .bet_money(results.iter().map(|result| result.bet).sum());
        for (hand_index, result) in results.iter().enumerate() {
            println!(
                "Hand {}: {} ({} vs {}), net {}",
                hand_index, result.outcome, result.player_value, result.dealer_value, result.net
            );
            self.stat.receive_money(result.payout);
        }

        println!(
            "Money: {}({}). Total bet: {}({}). Rate: {:.2}%. Min money: {}. Bankroll: {}.",
            self.stat.get_current_money(),
            self.stat.get_delta_money(),
            self.stat.get_total_bet(),
            self.stat.get_delta_bet(),
            self.stat.get_rate() * 100.0,
            self.stat.get_min_money(),
            bankroll,
        );
        println!("----------------------------------------------------");
    }
}

/// Plays `rounds` rounds at one table, printing each. Stops early when the
/// bankroll can no longer cover the table minimum. Returns the final
/// bankroll.
pub fn play_rounds(config: &SimulationConfig, rounds: u32) -> Result<i64, EngineError> {
    let rule = config.rule;
    let counting_system = config.counting_system()?;
    let shoe = match config.seed {
        Some(seed) => Shoe::with_seed(rule.number_of_decks, rule.penetration, counting_system, seed),
        None => Shoe::new(rule.number_of_decks, rule.penetration, counting_system),
    };
    let mut table = Table::with_shoe(rule, config.initial_bankroll, shoe)?;
    let mut bettor = Bettor::new(config.betting_strategy.clone(), config.base_bet);
    let mut handler = Handler::default();

    for _ in 0..rounds {
        let bet = bettor.next_bet(table.shoe().adjusted_true_count(), table.bankroll(), &rule);
        if bet == 0 {
            info!(bankroll = table.bankroll(), "bankroll below the table minimum");
            break;
        }
        let net: i64 = table
            .play_round(bet, &config.playing_strategy, &mut handler)?
            .iter()
            .map(|result| result.net)
            .sum();
        bettor.record(net);
        table.new_round()?;
    }

    Ok(table.bankroll())
}
