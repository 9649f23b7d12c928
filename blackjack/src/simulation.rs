use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::betting::{Bettor, BettingStrategy};
use crate::counting::{CountingSystem, StrategyConfig};
use crate::strategy::PlayingStrategy;
use crate::table::{Hand, HandResult, Outcome, RoundEventHandler, Shoe, Table};
use crate::{EngineError, Rule};

/// Cooperative cancellation of a running batch. Checked between rounds.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub rule: Rule,
    pub playing_strategy: PlayingStrategy,
    pub betting_strategy: BettingStrategy,
    #[serde(alias = "bankroll")]
    pub initial_bankroll: i64,
    pub base_bet: i64,
    pub num_hands: u32,
    pub num_simulations: u32,
    /// Run `i` is seeded with `seed + i`. Without a seed every run draws from
    /// system entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Defaults to the counting system of a counting strategy, else Hi-Lo.
    #[serde(default)]
    pub counting_system: Option<CountingSystem>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            rule: Rule::default(),
            playing_strategy: PlayingStrategy::Basic,
            betting_strategy: BettingStrategy::Flat,
            initial_bankroll: 1000,
            base_bet: 10,
            num_hands: 1000,
            num_simulations: 100,
            seed: None,
            counting_system: None,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.rule.validate()?;
        if self.num_hands == 0 {
            return Err(EngineError::invalid_config("num_hands must be > 0"));
        }
        if self.num_simulations == 0 {
            return Err(EngineError::invalid_config("num_simulations must be > 0"));
        }
        if self.initial_bankroll <= 0 {
            return Err(EngineError::invalid_config(format!(
                "initial_bankroll must be > 0 (got {})",
                self.initial_bankroll
            )));
        }
        if self.base_bet < self.rule.min_bet || self.base_bet > self.rule.max_bet {
            return Err(EngineError::invalid_config(format!(
                "base_bet {} is outside the table limits [{}, {}]",
                self.base_bet, self.rule.min_bet, self.rule.max_bet
            )));
        }
        self.betting_strategy.validate()?;
        if let PlayingStrategy::Deviations(config) = &self.playing_strategy {
            config.validate()?;
        }
        self.counting_system().map(|_| ())
    }

    pub fn counting_system(&self) -> Result<CountingSystem, EngineError> {
        if let Some(counting_system) = self.counting_system {
            return Ok(counting_system);
        }
        match (&self.betting_strategy, &self.playing_strategy) {
            (BettingStrategy::TrueCountRamp(config), _) | (_, PlayingStrategy::Deviations(config)) => {
                config.counting_system()
            }
            _ => Ok(CountingSystem::hi_lo()),
        }
    }
}

/// Outcome of one simulated bankroll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub run_index: u32,
    pub hands_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub pushes: u32,
    pub blackjacks: u32,
    pub surrenders: u32,
    pub total_wagered: i64,
    /// Net amount won over the run, negative when money was lost.
    pub total_won: i64,
    pub initial_bankroll: i64,
    pub final_bankroll: i64,
    pub max_bankroll: i64,
    pub min_bankroll: i64,
    /// (final - initial) / initial.
    pub roi: f64,
    /// Won hands over settled hands.
    pub win_rate: f64,
    /// The bankroll fell below the table minimum before the run finished.
    pub busted_out: bool,
    /// Rounds per initial bet, keyed by the bet as a multiple of the table
    /// minimum.
    pub bet_histogram: BTreeMap<i64, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub run_index: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub runs: usize,
    pub failed_runs: usize,
    pub mean_roi: f64,
    pub std_roi: f64,
    pub mean_final_bankroll: f64,
    pub bust_rate: f64,
    pub mean_win_rate: f64,
    pub total_hands: u64,
}

impl SimulationSummary {
    pub fn from_results(results: &[SimulationResult], failed_runs: usize) -> Self {
        let runs = results.len();
        let n = runs.max(1) as f64;
        let mean_roi = results.iter().map(|r| r.roi).sum::<f64>() / n;
        let variance = results
            .iter()
            .map(|r| (r.roi - mean_roi).powi(2))
            .sum::<f64>()
            / n;
        SimulationSummary {
            runs,
            failed_runs,
            mean_roi,
            std_roi: variance.sqrt(),
            mean_final_bankroll: results.iter().map(|r| r.final_bankroll as f64).sum::<f64>() / n,
            bust_rate: results.iter().filter(|r| r.busted_out).count() as f64 / n,
            mean_win_rate: results.iter().map(|r| r.win_rate).sum::<f64>() / n,
            total_hands: results.iter().map(|r| r.hands_played as u64).sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Successful runs in run-index order.
    pub results: Vec<SimulationResult>,
    pub failures: Vec<RunFailure>,
    pub summary: SimulationSummary,
    /// The batch was cancelled; results hold the rounds completed before.
    pub cancelled: bool,
}

/// Collects the statistics of one run from the table's round events.
#[derive(Debug, Clone)]
pub struct RunStatistics {
    min_bet: i64,
    hands_played: u32,
    wins: u32,
    losses: u32,
    pushes: u32,
    blackjacks: u32,
    surrenders: u32,
    total_wagered: i64,
    total_won: i64,
    initial_bankroll: i64,
    current_bankroll: i64,
    max_bankroll: i64,
    min_bankroll: i64,
    bet_histogram: BTreeMap<i64, u64>,
}

impl RunStatistics {
    pub fn new(initial_bankroll: i64, min_bet: i64) -> Self {
        RunStatistics {
            min_bet,
            hands_played: 0,
            wins: 0,
            losses: 0,
            pushes: 0,
            blackjacks: 0,
            surrenders: 0,
            total_wagered: 0,
            total_won: 0,
            initial_bankroll,
            current_bankroll: initial_bankroll,
            max_bankroll: initial_bankroll,
            min_bankroll: initial_bankroll,
            bet_histogram: BTreeMap::new(),
        }
    }

    pub fn settled_hands(&self) -> u32 {
        self.wins + self.losses + self.pushes
    }

    pub fn into_result(self, run_index: u32, busted_out: bool) -> SimulationResult {
        let settled = self.settled_hands();
        SimulationResult {
            run_index,
            hands_played: self.hands_played,
            wins: self.wins,
            losses: self.losses,
            pushes: self.pushes,
            blackjacks: self.blackjacks,
            surrenders: self.surrenders,
            total_wagered: self.total_wagered,
            total_won: self.total_won,
            initial_bankroll: self.initial_bankroll,
            final_bankroll: self.current_bankroll,
            max_bankroll: self.max_bankroll,
            min_bankroll: self.min_bankroll,
            roi: (self.current_bankroll - self.initial_bankroll) as f64
                / self.initial_bankroll as f64,
            win_rate: ratio(self.wins, settled),
            busted_out,
            bet_histogram: self.bet_histogram,
        }
    }
}

impl RoundEventHandler for RunStatistics {
    fn on_bet(&mut self, bet: i64, _true_count: f64) {
        *self.bet_histogram.entry(bet / self.min_bet).or_default() += 1;
    }

    fn on_round_end(&mut self, results: &[HandResult], _dealer: &Hand, bankroll: i64) {
        self.hands_played += 1;
        for result in results {
            self.total_wagered += result.bet;
            self.total_won += result.net;
            // Blackjacks count as wins, surrenders as losses.
            match result.outcome {
                Outcome::Win => self.wins += 1,
                Outcome::Blackjack => {
                    self.wins += 1;
                    self.blackjacks += 1;
                }
                Outcome::Push => self.pushes += 1,
                Outcome::Lose => self.losses += 1,
                Outcome::Surrender => {
                    self.losses += 1;
                    self.surrenders += 1;
                }
            }
        }
        self.current_bankroll = bankroll;
        self.max_bankroll = self.max_bankroll.max(bankroll);
        self.min_bankroll = self.min_bankroll.min(bankroll);
    }
}

fn ratio(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Runs `config.num_simulations` independent bankrolls in parallel.
/// A failing run is reported in `failures` and does not abort the batch.
pub fn run(config: &SimulationConfig, cancel: &CancelToken) -> Result<BatchReport, EngineError> {
    config.validate()?;
    let counting_system = config.counting_system()?;
    info!(
        playing = config.playing_strategy.name(),
        betting = config.betting_strategy.name(),
        num_hands = config.num_hands,
        num_simulations = config.num_simulations,
        seed = ?config.seed,
        "simulation batch started"
    );

    let outcomes: Vec<Result<SimulationResult, RunFailure>> = (0..config.num_simulations)
        .into_par_iter()
        .map(|run_index| {
            isolate(run_index, || run_one(config, counting_system, run_index, cancel))
        })
        .collect();

    let mut results = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(result) => results.push(result),
            Err(failure) => {
                warn!(run_index = failure.run_index, reason = %failure.reason, "simulation run failed");
                failures.push(failure);
            }
        }
    }

    let cancelled = cancel.is_cancelled();
    if cancelled {
        info!("simulation batch cancelled");
    }
    let summary = SimulationSummary::from_results(&results, failures.len());
    info!(
        runs = summary.runs,
        failed_runs = summary.failed_runs,
        mean_roi = summary.mean_roi,
        bust_rate = summary.bust_rate,
        "simulation batch finished"
    );
    Ok(BatchReport {
        results,
        failures,
        summary,
        cancelled,
    })
}

/// Turns an error or a panic inside one run into a `RunFailure`.
fn isolate<F>(run_index: u32, f: F) -> Result<SimulationResult, RunFailure>
where
    F: FnOnce() -> Result<SimulationResult, EngineError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => Err(RunFailure {
            run_index,
            reason: err.to_string(),
        }),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| String::from("run panicked"));
            Err(RunFailure { run_index, reason })
        }
    }
}

fn run_one(
    config: &SimulationConfig,
    counting_system: CountingSystem,
    run_index: u32,
    cancel: &CancelToken,
) -> Result<SimulationResult, EngineError> {
    let rule = config.rule;
    let shoe = match config.seed {
        Some(seed) => Shoe::with_seed(
            rule.number_of_decks,
            rule.penetration,
            counting_system,
            seed.wrapping_add(run_index as u64),
        ),
        None => Shoe::new(rule.number_of_decks, rule.penetration, counting_system),
    };
    let mut table = Table::with_shoe(rule, config.initial_bankroll, shoe)?;
    let mut bettor = Bettor::new(config.betting_strategy.clone(), config.base_bet);
    let mut statistics = RunStatistics::new(config.initial_bankroll, rule.min_bet);

    let mut busted_out = false;
    for _ in 0..config.num_hands {
        if cancel.is_cancelled() {
            break;
        }
        let bet = bettor.next_bet(table.shoe().adjusted_true_count(), table.bankroll(), &rule);
        if bet == 0 {
            busted_out = true;
            break;
        }
        let net: i64 = table
            .play_round(bet, &config.playing_strategy, &mut statistics)?
            .iter()
            .map(|result| result.net)
            .sum();
        bettor.record(net);
        table.new_round()?;
    }

    Ok(statistics.into_result(run_index, busted_out))
}

/// Shared parameters of a strategy comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareParams {
    #[serde(default)]
    pub rule: Rule,
    pub num_hands: u32,
    pub num_simulations: u32,
    #[serde(alias = "bankroll")]
    pub initial_bankroll: i64,
    pub base_bet: i64,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for CompareParams {
    fn default() -> Self {
        CompareParams {
            rule: Rule::default(),
            num_hands: 1000,
            num_simulations: 100,
            initial_bankroll: 1000,
            base_bet: 10,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub playing_strategy: String,
    pub betting_strategy: String,
    pub avg_roi: f64,
    pub std_roi: f64,
    pub avg_final_bankroll: f64,
    pub bust_rate: f64,
    pub failed_runs: usize,
}

/// The fixed catalog of compared strategy pairs.
pub fn comparison_catalog() -> Vec<(&'static str, PlayingStrategy, BettingStrategy)> {
    vec![
        ("basic_flat", PlayingStrategy::Basic, BettingStrategy::Flat),
        (
            "basic_martingale",
            PlayingStrategy::Basic,
            BettingStrategy::Martingale,
        ),
        (
            "basic_kelly_criterion",
            PlayingStrategy::Basic,
            BettingStrategy::KellyCriterion,
        ),
        (
            "card_counting_kelly_criterion",
            PlayingStrategy::Deviations(StrategyConfig::default_preset()),
            BettingStrategy::KellyCriterion,
        ),
        (
            "conservative_flat",
            PlayingStrategy::Conservative,
            BettingStrategy::Flat,
        ),
        (
            "aggressive_flat",
            PlayingStrategy::Aggressive,
            BettingStrategy::Flat,
        ),
    ]
}

/// Runs every catalog pair with the same parameters and seed. Keys are the
/// catalog names, so the order is stable.
pub fn compare(
    params: &CompareParams,
    cancel: &CancelToken,
) -> Result<BTreeMap<String, ComparisonEntry>, EngineError> {
    let mut comparison = BTreeMap::new();
    for (name, playing_strategy, betting_strategy) in comparison_catalog() {
        let config = SimulationConfig {
            rule: params.rule,
            playing_strategy,
            betting_strategy,
            initial_bankroll: params.initial_bankroll,
            base_bet: params.base_bet,
            num_hands: params.num_hands,
            num_simulations: params.num_simulations,
            seed: params.seed,
            counting_system: None,
        };
        let report = run(&config, cancel)?;
        comparison.insert(
            name.to_owned(),
            ComparisonEntry {
                playing_strategy: config.playing_strategy.name().to_owned(),
                betting_strategy: config.betting_strategy.name().to_owned(),
                avg_roi: report.summary.mean_roi,
                std_roi: report.summary.std_roi,
                avg_final_bankroll: report.summary.mean_final_bankroll,
                bust_rate: report.summary.bust_rate,
                failed_runs: report.summary.failed_runs,
            },
        );
    }
    Ok(comparison)
}

fn default_custom_num_hands() -> u32 {
    10_000
}

fn default_custom_bankroll() -> i64 {
    10_000
}

fn default_custom_min_bet() -> i64 {
    10
}

fn default_custom_num_decks() -> u8 {
    6
}

fn default_custom_penetration() -> f64 {
    0.72
}

/// One bankroll played with a counting configuration: its index plays and
/// its bet ramp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomSimulationRequest {
    pub config: StrategyConfig,
    #[serde(default = "default_custom_num_hands")]
    pub num_hands: u32,
    #[serde(default = "default_custom_bankroll")]
    pub bankroll: i64,
    #[serde(default = "default_custom_min_bet")]
    pub min_bet: i64,
    #[serde(default = "default_custom_num_decks")]
    pub num_decks: u8,
    #[serde(default = "default_custom_penetration")]
    pub penetration: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl CustomSimulationRequest {
    pub fn new(config: StrategyConfig) -> Self {
        CustomSimulationRequest {
            config,
            num_hands: default_custom_num_hands(),
            bankroll: default_custom_bankroll(),
            min_bet: default_custom_min_bet(),
            num_decks: default_custom_num_decks(),
            penetration: default_custom_penetration(),
            seed: None,
        }
    }

    fn simulation_config(&self) -> SimulationConfig {
        let rule = Rule {
            number_of_decks: self.num_decks,
            penetration: self.penetration,
            min_bet: self.min_bet,
            max_bet: (self.min_bet * self.config.max_bet_units as i64).max(500),
            ..Rule::default()
        };
        SimulationConfig {
            rule,
            playing_strategy: PlayingStrategy::Deviations(self.config.clone()),
            betting_strategy: BettingStrategy::TrueCountRamp(self.config.clone()),
            initial_bankroll: self.bankroll,
            base_bet: self.min_bet,
            num_hands: self.num_hands,
            num_simulations: 1,
            seed: self.seed,
            counting_system: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomSimulationReport {
    pub hands_played: u32,
    pub total_wagered: i64,
    pub total_won_lost: i64,
    /// Net result over the total amount wagered.
    pub roi: f64,
    pub win_rate: f64,
    pub loss_rate: f64,
    pub push_rate: f64,
    pub avg_bet: f64,
    /// Rounds per initial bet, keyed by the bet in units of the minimum.
    pub bet_distribution: BTreeMap<String, u64>,
    pub wins: u32,
    pub losses: u32,
    pub pushes: u32,
    pub blackjacks: u32,
    pub final_bankroll: i64,
    pub max_bankroll: i64,
    pub min_bankroll: i64,
    pub busted_out: bool,
}

impl From<SimulationResult> for CustomSimulationReport {
    fn from(result: SimulationResult) -> Self {
        let settled = result.wins + result.losses + result.pushes;
        CustomSimulationReport {
            hands_played: result.hands_played,
            total_wagered: result.total_wagered,
            total_won_lost: result.total_won,
            roi: if result.total_wagered == 0 {
                0.0
            } else {
                result.total_won as f64 / result.total_wagered as f64
            },
            win_rate: ratio(result.wins, settled),
            loss_rate: ratio(result.losses, settled),
            push_rate: ratio(result.pushes, settled),
            avg_bet: if settled == 0 {
                0.0
            } else {
                result.total_wagered as f64 / settled as f64
            },
            bet_distribution: result
                .bet_histogram
                .iter()
                .map(|(units, count)| (units.to_string(), *count))
                .collect(),
            wins: result.wins,
            losses: result.losses,
            pushes: result.pushes,
            blackjacks: result.blackjacks,
            final_bankroll: result.final_bankroll,
            max_bankroll: result.max_bankroll,
            min_bankroll: result.min_bankroll,
            busted_out: result.busted_out,
        }
    }
}

/// Runs the custom strategy tester.
pub fn run_custom(
    request: &CustomSimulationRequest,
    cancel: &CancelToken,
) -> Result<CustomSimulationReport, EngineError> {
    request.config.validate()?;
    let config = request.simulation_config();
    let mut report = run(&config, cancel)?;
    if let Some(failure) = report.failures.pop() {
        return Err(EngineError::InvalidConfig(failure.reason));
    }
    report
        .results
        .pop()
        .map(CustomSimulationReport::from)
        .ok_or_else(|| EngineError::invalid_config("the custom simulation produced no result"))
}

/// The default and optimized counting configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPresets {
    pub default: StrategyConfig,
    pub optimized: StrategyConfig,
}

pub fn presets() -> StrategyPresets {
    StrategyPresets {
        default: StrategyConfig::default_preset(),
        optimized: StrategyConfig::optimized_preset(),
    }
}
