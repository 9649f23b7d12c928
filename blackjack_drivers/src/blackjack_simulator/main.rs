mod simulation;

use std::fs;
use std::process::ExitCode;

use blackjack::counting::StrategyConfig;
use blackjack::simulation::{CancelToken, CompareParams, CustomSimulationRequest};
use blackjack::EngineError;
use blackjack_drivers::{parse_config_from_file, Config, ConfigError};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn, Level};

const DEFAULT_CONFIG_PATH: &str = "~/.blackjack.yml";

#[derive(Debug, Parser)]
#[command(author, about, long_about = None)]
struct CommandLineArgs {
    /// The path of the config file
    #[arg(short, long, default_value_t = String::from(DEFAULT_CONFIG_PATH))]
    config: String,

    /// Log level (error, warn, info, debug, trace). Overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs a batch of simulations with the configured strategies
    Simulate {
        #[arg(long)]
        playing: Option<String>,
        #[arg(long)]
        betting: Option<String>,
        #[arg(long)]
        hands: Option<u32>,
        #[arg(long)]
        simulations: Option<u32>,
        #[arg(long)]
        seed: Option<u64>,
        /// Print every run instead of the summary only
        #[arg(long)]
        details: bool,
    },
    /// Compares the fixed catalog of strategy pairs
    Compare {
        #[arg(long)]
        hands: Option<u32>,
        #[arg(long)]
        simulations: Option<u32>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Tests one counting configuration
    Custom {
        #[arg(long, value_enum, default_value_t = Preset::Default)]
        preset: Preset,
        /// JSON file holding a counting configuration; overrides --preset
        #[arg(long)]
        strategy_file: Option<String>,
        #[arg(long, default_value_t = 10_000)]
        hands: u32,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Prints the default and optimized counting configurations
    Presets,
    /// Plays rounds at one table and prints each of them
    Play {
        #[arg(long, default_value_t = 10)]
        rounds: u32,
        #[arg(long)]
        playing: Option<String>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Default,
    Optimized,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("cannot encode output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot find home directory")]
    NoHomeDirectory,

    #[error("invalid log level {0:?}")]
    LogLevel(String),
}

fn main() -> ExitCode {
    let args = CommandLineArgs::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: CommandLineArgs) -> Result<(), CliError> {
    let loaded = load_config(&args.config)?;
    let using_defaults = loaded.is_none();
    let config = loaded.unwrap_or_default();
    let log_level = args.log_level.as_deref().unwrap_or(&config.log_level);
    let level: Level = log_level
        .parse()
        .map_err(|_| CliError::LogLevel(log_level.to_owned()))?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    if using_defaults {
        warn!("no config file at {}, using defaults", args.config);
    }

    let rule: blackjack::Rule = config.rule.clone().try_into()?;
    let simulator = &config.blackjack_simulator;
    let cancel = CancelToken::new();

    match args.command {
        Command::Simulate {
            playing,
            betting,
            hands,
            simulations,
            seed,
            details,
        } => {
            let mut simulator = simulator.clone();
            if let Some(playing) = playing {
                simulator.playing_strategy = playing;
            }
            if let Some(betting) = betting {
                simulator.betting_strategy = betting;
            }
            simulator.num_hands = hands.unwrap_or(simulator.num_hands);
            simulator.num_simulations = simulations.unwrap_or(simulator.num_simulations);
            simulator.seed = seed.or(simulator.seed);

            let simulation_config = simulator.to_simulation_config(rule)?;
            let report = blackjack::simulation::run(&simulation_config, &cancel)?;
            if details {
                print_json(&report)
            } else {
                print_json(&report.summary)
            }
        }
        Command::Compare {
            hands,
            simulations,
            seed,
        } => {
            let params = CompareParams {
                rule,
                num_hands: hands.unwrap_or(simulator.num_hands),
                num_simulations: simulations.unwrap_or(simulator.num_simulations),
                initial_bankroll: simulator.initial_bankroll,
                base_bet: simulator.base_bet,
                seed: seed.or(simulator.seed),
            };
            print_json(&blackjack::simulation::compare(&params, &cancel)?)
        }
        Command::Custom {
            preset,
            strategy_file,
            hands,
            seed,
        } => {
            let strategy_config = match strategy_file {
                Some(path) => {
                    let content = fs::read_to_string(&path)
                        .map_err(|source| CliError::Read { path, source })?;
                    serde_json::from_str(&content)?
                }
                None => match preset {
                    Preset::Default => StrategyConfig::default_preset(),
                    Preset::Optimized => StrategyConfig::optimized_preset(),
                },
            };
            let mut request = CustomSimulationRequest::new(strategy_config);
            request.num_hands = hands;
            request.seed = seed;
            request.num_decks = rule.number_of_decks;
            request.penetration = rule.penetration;
            print_json(&blackjack::simulation::run_custom(&request, &cancel)?)
        }
        Command::Presets => print_json(&blackjack::simulation::presets()),
        Command::Play {
            rounds,
            playing,
            seed,
        } => {
            let mut simulator = simulator.clone();
            if let Some(playing) = playing {
                simulator.playing_strategy = playing;
            }
            simulator.seed = seed.or(simulator.seed);
            let simulation_config = simulator.to_simulation_config(rule)?;
            let bankroll = simulation::play_rounds(&simulation_config, rounds)?;
            info!(bankroll, "play finished");
            Ok(())
        }
    }
}

/// Resolves `~/.blackjack.yml` against the home directory. `None` when the
/// default file does not exist; an explicit path must exist.
fn load_config(path: &str) -> Result<Option<Config>, CliError> {
    if path != DEFAULT_CONFIG_PATH {
        return Ok(Some(parse_config_from_file(path)?));
    }
    let home_dir = home::home_dir().ok_or(CliError::NoHomeDirectory)?;
    let config_file_path = home_dir.join(".blackjack.yml");
    if !config_file_path.is_file() {
        return Ok(None);
    }
    Ok(Some(parse_config_from_file(
        &config_file_path.to_string_lossy(),
    )?))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
