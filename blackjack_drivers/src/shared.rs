use blackjack::betting::BettingStrategy;
use blackjack::simulation::SimulationConfig;
use blackjack::strategy::PlayingStrategy;
use blackjack::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid rule: {0}")]
    Rule(#[from] serde::de::value::Error),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

fn default_log_level() -> String {
    String::from("info")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub rule: ConfigRule,
    pub blackjack_simulator: ConfigBlackjackSimulator,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rule: ConfigRule::default(),
            blackjack_simulator: ConfigBlackjackSimulator::default(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRule {
    pub number_of_decks: u8,
    pub penetration: f64,
    pub dealer_hit_on_soft17: bool,
    pub peek_policy: String,
    pub allow_late_surrender: bool,
    pub allow_das: bool,
    pub max_hands: u8,
    /// "3:2", "6:5", ...
    pub payout_blackjack: String,
    pub min_bet: i64,
    pub max_bet: i64,
}

impl Default for ConfigRule {
    fn default() -> Self {
        let rule = blackjack::Rule::default();
        ConfigRule {
            number_of_decks: rule.number_of_decks,
            penetration: rule.penetration,
            dealer_hit_on_soft17: rule.dealer_hit_on_soft17,
            peek_policy: rule.peek_policy.to_string(),
            allow_late_surrender: rule.allow_late_surrender,
            allow_das: rule.allow_das,
            max_hands: rule.max_hands,
            payout_blackjack: format!(
                "{}:{}",
                rule.payout_blackjack.numerator, rule.payout_blackjack.denominator
            ),
            min_bet: rule.min_bet,
            max_bet: rule.max_bet,
        }
    }
}

impl TryInto<blackjack::Rule> for ConfigRule {
    type Error = ConfigError;

    fn try_into(self) -> Result<blackjack::Rule, Self::Error> {
        let blackjack_rule = blackjack::Rule {
            number_of_decks: self.number_of_decks,
            penetration: self.penetration,
            dealer_hit_on_soft17: self.dealer_hit_on_soft17,
            peek_policy: self.peek_policy.parse()?,
            allow_late_surrender: self.allow_late_surrender,
            allow_das: self.allow_das,
            max_hands: self.max_hands,
            payout_blackjack: parse_payout_ratio(&self.payout_blackjack)?,
            min_bet: self.min_bet,
            max_bet: self.max_bet,
        };
        blackjack_rule.validate()?;

        Ok(blackjack_rule)
    }
}

fn parse_payout_ratio(ratio: &str) -> Result<blackjack::PayoutRatio, ConfigError> {
    let invalid = || ConfigError::InvalidValue(format!("payout ratio {:?}", ratio));
    let (numerator, denominator) = ratio.split_once(':').ok_or_else(invalid)?;
    Ok(blackjack::PayoutRatio {
        numerator: numerator.trim().parse().map_err(|_| invalid())?,
        denominator: denominator.trim().parse().map_err(|_| invalid())?,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigBlackjackSimulator {
    pub playing_strategy: String,
    pub betting_strategy: String,
    pub initial_bankroll: i64,
    pub base_bet: i64,
    pub num_hands: u32,
    pub num_simulations: u32,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ConfigBlackjackSimulator {
    fn default() -> Self {
        let config = SimulationConfig::default();
        ConfigBlackjackSimulator {
            playing_strategy: config.playing_strategy.name().to_owned(),
            betting_strategy: config.betting_strategy.name().to_owned(),
            initial_bankroll: config.initial_bankroll,
            base_bet: config.base_bet,
            num_hands: config.num_hands,
            num_simulations: config.num_simulations,
            seed: config.seed,
        }
    }
}

impl ConfigBlackjackSimulator {
    /// Builds a validated simulation config played under `rule`.
    pub fn to_simulation_config(
        &self,
        rule: blackjack::Rule,
    ) -> Result<SimulationConfig, ConfigError> {
        let config = SimulationConfig {
            rule,
            playing_strategy: PlayingStrategy::from_name(&self.playing_strategy)?,
            betting_strategy: BettingStrategy::from_name(&self.betting_strategy)?,
            initial_bankroll: self.initial_bankroll,
            base_bet: self.base_bet,
            num_hands: self.num_hands,
            num_simulations: self.num_simulations,
            seed: self.seed,
            counting_system: None,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Reads the content of a given config file and parses it to a Config.
pub fn parse_config_from_file(filename: &str) -> Result<Config, ConfigError> {
    let file_content = fs::read_to_string(filename)?;
    Ok(serde_yaml::from_str(&file_content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_typical_config_rule() -> ConfigRule {
        ConfigRule {
            number_of_decks: 8,
            penetration: 0.5,
            dealer_hit_on_soft17: true,
            peek_policy: String::from("UpAce"),
            allow_late_surrender: false,
            allow_das: false,
            max_hands: 4,
            payout_blackjack: String::from("6:5"),
            min_bet: 10,
            max_bet: 1000,
        }
    }

    #[test]
    fn can_convert_rule() {
        let config_rule = get_typical_config_rule();
        let converted_rule: blackjack::Rule = config_rule.try_into().unwrap();
        assert_eq!(converted_rule.number_of_decks, 8);
        assert_eq!(converted_rule.penetration, 0.5);
        assert_eq!(converted_rule.peek_policy, blackjack::PeekPolicy::UpAce);
        assert_eq!(
            converted_rule.payout_blackjack,
            blackjack::PayoutRatio::SIX_TO_FIVE
        );
        assert_eq!(converted_rule.max_hands, 4);
    }

    #[test]
    fn should_return_error_when_converting_rule() {
        let mut config_rule = get_typical_config_rule();
        config_rule.peek_policy = String::from("Not a policy");
        let convert_result: Result<blackjack::Rule, ConfigError> = config_rule.try_into();
        assert!(matches!(convert_result, Err(ConfigError::Rule(_))));

        let mut config_rule = get_typical_config_rule();
        config_rule.payout_blackjack = String::from("three to two");
        let convert_result: Result<blackjack::Rule, ConfigError> = config_rule.try_into();
        assert!(matches!(convert_result, Err(ConfigError::InvalidValue(_))));

        let mut config_rule = get_typical_config_rule();
        config_rule.number_of_decks = 9;
        let convert_result: Result<blackjack::Rule, ConfigError> = config_rule.try_into();
        assert!(matches!(
            convert_result,
            Err(ConfigError::Engine(EngineError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn default_rule_round_trips() {
        let converted_rule: blackjack::Rule = ConfigRule::default().try_into().unwrap();
        assert_eq!(converted_rule, blackjack::Rule::default());
    }

    #[test]
    fn can_parse_yaml() {
        let yaml = r#"
rule:
  number_of_decks: 6
  penetration: 0.75
  dealer_hit_on_soft17: false
  peek_policy: UpAceOrTen
  allow_late_surrender: true
  allow_das: true
  max_hands: 2
  payout_blackjack: "3:2"
  min_bet: 5
  max_bet: 500
blackjack_simulator:
  playing_strategy: card_counting
  betting_strategy: kelly_criterion
  initial_bankroll: 1000
  base_bet: 10
  num_hands: 500
  num_simulations: 20
  seed: 7
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.log_level, "info");
        let rule: blackjack::Rule = config.rule.try_into().unwrap();
        let simulation = config.blackjack_simulator.to_simulation_config(rule).unwrap();
        assert_eq!(simulation.betting_strategy, BettingStrategy::KellyCriterion);
        assert_eq!(simulation.playing_strategy.name(), "card_counting");
        assert_eq!(simulation.seed, Some(7));
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let mut simulator = ConfigBlackjackSimulator::default();
        simulator.betting_strategy = String::from("double_or_nothing");
        assert!(matches!(
            simulator.to_simulation_config(blackjack::Rule::default()),
            Err(ConfigError::Engine(EngineError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(matches!(
            parse_config_from_file("/nonexistent/blackjack.yml"),
            Err(ConfigError::Io(_))
        ));
    }
}
