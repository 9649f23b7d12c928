//! Request/response contracts of the engine and the session facade that
//! serves them. Transport is left to the caller; every view here serializes
//! with serde.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::betting::{available_strategies, AvailableStrategies};
use crate::calculation::{Analyzer, LiveStatistics};
use crate::counting::CountingSystem;
use crate::simulation::{
    self, BatchReport, CancelToken, CompareParams, ComparisonEntry, CustomSimulationReport,
    CustomSimulationRequest, SimulationConfig, StrategyPresets,
};
use crate::strategy::PlayingStrategy;
use crate::table::{Card, Hand, HandResult, Phase, Shoe, Table};
use crate::{Decision, EngineError, Rule};

pub type SessionId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartSessionRequest {
    #[serde(default)]
    pub rule: Rule,
    pub bankroll: i64,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub counting_system: Option<CountingSystem>,
}

impl StartSessionRequest {
    pub fn new(bankroll: i64) -> Self {
        StartSessionRequest {
            rule: Rule::default(),
            bankroll,
            seed: None,
            counting_system: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardView {
    pub rank: String,
    pub suit: String,
    pub value: u8,
}

impl From<&Card> for CardView {
    fn from(card: &Card) -> Self {
        CardView {
            rank: card.label().to_owned(),
            suit: format!("{:?}", card.suit),
            value: card.blackjack_value(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandView {
    pub cards: Vec<CardView>,
    pub value: u16,
    pub is_soft: bool,
    pub bet: i64,
    pub is_doubled: bool,
    pub is_split: bool,
    pub is_finished: bool,
    pub is_bust: bool,
    pub is_blackjack: bool,
}

impl From<&Hand> for HandView {
    fn from(hand: &Hand) -> Self {
        HandView {
            cards: hand.cards().iter().map(CardView::from).collect(),
            value: hand.value(),
            is_soft: hand.is_soft(),
            bet: hand.bet(),
            is_doubled: hand.is_doubled(),
            is_split: hand.is_split(),
            is_finished: hand.is_finished(),
            is_bust: hand.is_bust(),
            is_blackjack: hand.is_blackjack(),
        }
    }
}

/// The dealer as the player sees it. Until the hole card is revealed only
/// the up card is listed and `value` is the up card's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealerView {
    pub cards: Vec<CardView>,
    pub value: u16,
    pub hole_card_hidden: bool,
}

impl DealerView {
    fn of(table: &Table) -> Self {
        let dealer = table.dealer_hand();
        let hidden = !table.is_hole_card_revealed() && dealer.cards().len() > 1;
        if hidden {
            let cards: Vec<CardView> = dealer.cards().iter().take(1).map(CardView::from).collect();
            let value = match table.dealer_up_card() {
                Some(card) if card.is_ace() => 11,
                Some(card) => card.blackjack_value() as u16,
                None => 0,
            };
            DealerView {
                cards,
                value,
                hole_card_hidden: true,
            }
        } else {
            DealerView {
                cards: dealer.cards().iter().map(CardView::from).collect(),
                value: dealer.value(),
                hole_card_hidden: false,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckInfo {
    pub remaining_cards: usize,
    pub running_count: i32,
    pub true_count: f64,
    pub penetration_dealt: f64,
}

impl DeckInfo {
    fn of(shoe: &Shoe) -> Self {
        DeckInfo {
            remaining_cards: shoe.remaining(),
            running_count: shoe.running_count(),
            true_count: shoe.adjusted_true_count(),
            penetration_dealt: shoe.penetration_dealt(),
        }
    }
}

/// Full game state returned by every session operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateView {
    pub session_id: SessionId,
    #[serde(rename = "state")]
    pub phase: Phase,
    pub bankroll: i64,
    pub player_hands: Vec<HandView>,
    pub current_hand_index: usize,
    pub dealer_hand: DealerView,
    pub valid_actions: Vec<Decision>,
    pub deck_info: DeckInfo,
    pub results: Vec<HandResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: String,
    pub amount: Option<i64>,
    /// Phase the round was left in.
    pub phase: Phase,
}

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    table: Table,
    analyzer: Analyzer,
    history: Vec<HistoryEntry>,
}

impl Session {
    fn new(id: SessionId, table: Table) -> Self {
        let analyzer = Analyzer::new(*table.rule());
        Session {
            id,
            table,
            analyzer,
            history: Vec::new(),
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn view(&self) -> GameStateView {
        let table = &self.table;
        GameStateView {
            session_id: self.id,
            phase: table.phase(),
            bankroll: table.bankroll(),
            player_hands: table.player_hands().iter().map(HandView::from).collect(),
            current_hand_index: table.current_hand_index(),
            dealer_hand: DealerView::of(table),
            valid_actions: table.valid_actions(),
            deck_info: DeckInfo::of(table.shoe()),
            results: table.results().to_vec(),
        }
    }

    fn record(&mut self, action: impl Into<String>, amount: Option<i64>) {
        self.history.push(HistoryEntry {
            action: action.into(),
            amount,
            phase: self.table.phase(),
        });
    }
}

/// Sessions keyed by id. A session is locked for the whole of one request;
/// different sessions never contend beyond the short map lookup.
#[derive(Debug, Default)]
pub struct BlackjackService {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl BlackjackService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_session(&self, request: &StartSessionRequest) -> Result<GameStateView, EngineError> {
        let counting_system = request.counting_system.unwrap_or_else(CountingSystem::hi_lo);
        let rule = request.rule;
        rule.validate()?;
        let table = match request.seed {
            Some(seed) => Table::with_seed(rule, request.bankroll, counting_system, seed)?,
            None => Table::with_shoe(
                rule,
                request.bankroll,
                Shoe::new(rule.number_of_decks, rule.penetration, counting_system),
            )?,
        };

        let id = Uuid::new_v4();
        let session = Session::new(id, table);
        let view = session.view();
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(Mutex::new(session)));
        info!(session_id = %id, bankroll = request.bankroll, "session started");
        Ok(view)
    }

    pub fn remove_session(&self, id: SessionId) -> Result<(), EngineError> {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .ok_or(EngineError::SessionNotFound(id))?;
        info!(session_id = %id, "session removed");
        Ok(())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Runs `f` with exclusive access to one session.
    pub fn with_session<T>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut Session) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let session = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(EngineError::SessionNotFound(id))?;
        let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut session)
    }

    pub fn place_bet(&self, id: SessionId, amount: i64) -> Result<GameStateView, EngineError> {
        self.with_session(id, |session| {
            session.table.place_bet(amount)?;
            session.record("bet", Some(amount));
            Ok(session.view())
        })
    }

    /// `action` is one of `hit`, `stand`, `double`, `split`, `surrender`.
    pub fn perform_action(&self, id: SessionId, action: &str) -> Result<GameStateView, EngineError> {
        let decision: Decision = action
            .parse()
            .map_err(|_| EngineError::InvalidAction(format!("unknown action {:?}", action)))?;
        self.with_session(id, |session| {
            session.table.act(decision)?;
            session.record(decision.to_string(), None);
            Ok(session.view())
        })
    }

    /// Lets the named playing strategy finish the player turn. Each decision
    /// lands in the history as it is applied, so a failed step leaves the
    /// earlier ones recorded.
    pub fn auto_play(&self, id: SessionId, strategy: &str) -> Result<GameStateView, EngineError> {
        let strategy = PlayingStrategy::from_name(strategy)?;
        self.with_session(id, |session| {
            if session.table.phase() != Phase::PlayerTurn {
                return Err(EngineError::InvalidAction(String::from(
                    "auto_play is only allowed in PlayerTurn phase",
                )));
            }
            while let Some(context) = session.table.decision_context() {
                let decision = strategy.decide(&context);
                session.table.act(decision)?;
                session.record(decision.to_string(), None);
            }
            Ok(session.view())
        })
    }

    pub fn new_round(&self, id: SessionId) -> Result<GameStateView, EngineError> {
        self.with_session(id, |session| {
            session.table.new_round()?;
            session.record("new_round", None);
            Ok(session.view())
        })
    }

    pub fn game_state(&self, id: SessionId) -> Result<GameStateView, EngineError> {
        self.with_session(id, |session| Ok(session.view()))
    }

    pub fn results(&self, id: SessionId) -> Result<Vec<HandResult>, EngineError> {
        self.with_session(id, |session| Ok(session.table.results().to_vec()))
    }

    pub fn history(&self, id: SessionId) -> Result<Vec<HistoryEntry>, EngineError> {
        self.with_session(id, |session| Ok(session.history.clone()))
    }

    pub fn live_statistics(&self, id: SessionId) -> Result<LiveStatistics, EngineError> {
        self.with_session(id, |session| {
            let Session {
                table, analyzer, ..
            } = session;
            Ok(analyzer.analyze(table))
        })
    }

    pub fn run_simulation(
        &self,
        config: &SimulationConfig,
        cancel: &CancelToken,
    ) -> Result<BatchReport, EngineError> {
        simulation::run(config, cancel)
    }

    pub fn compare_strategies(
        &self,
        params: &CompareParams,
        cancel: &CancelToken,
    ) -> Result<BTreeMap<String, ComparisonEntry>, EngineError> {
        simulation::compare(params, cancel)
    }

    pub fn strategy_presets(&self) -> StrategyPresets {
        simulation::presets()
    }

    pub fn run_custom_simulation(
        &self,
        request: &CustomSimulationRequest,
        cancel: &CancelToken,
    ) -> Result<CustomSimulationReport, EngineError> {
        simulation::run_custom(request, cancel)
    }

    pub fn available_strategies(&self) -> AvailableStrategies {
        available_strategies()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn seeded_session(service: &BlackjackService, firsts: &[u8]) -> SessionId {
        let mut request = StartSessionRequest::new(1000);
        request.seed = Some(3);
        let id = service.start_session(&request).unwrap().session_id;
        service
            .with_session(id, |session| session.table.shuffle_with_firsts(firsts))
            .unwrap();
        id
    }

    #[test]
    fn new_session_waits_for_a_bet() {
        let service = BlackjackService::new();
        let view = service.start_session(&StartSessionRequest::new(500)).unwrap();
        assert_eq!(view.phase, Phase::Betting);
        assert_eq!(view.bankroll, 500);
        assert!(view.player_hands.is_empty());
        assert!(view.valid_actions.is_empty());
        assert_eq!(view.deck_info.remaining_cards, 312);
        assert_eq!(service.session_count(), 1);
    }

    #[test]
    fn invalid_session_parameters_are_rejected() {
        let service = BlackjackService::new();
        let mut request = StartSessionRequest::new(1000);
        request.rule.number_of_decks = 0;
        assert!(matches!(
            service.start_session(&request),
            Err(EngineError::InvalidConfig(_))
        ));
        assert_eq!(service.session_count(), 0);
    }

    #[test]
    fn unknown_session() {
        let service = BlackjackService::new();
        let id = Uuid::new_v4();
        assert_eq!(service.game_state(id), Err(EngineError::SessionNotFound(id)));
        assert_eq!(service.remove_session(id), Err(EngineError::SessionNotFound(id)));
    }

    #[test]
    fn hole_card_stays_hidden_during_the_player_turn() {
        let service = BlackjackService::new();
        let id = seeded_session(&service, &[10, 6, 6, 9]);
        let view = service.place_bet(id, 10).unwrap();
        assert_eq!(view.phase, Phase::PlayerTurn);
        assert!(view.dealer_hand.hole_card_hidden);
        assert_eq!(view.dealer_hand.cards.len(), 1);
        assert_eq!(view.dealer_hand.value, 6);
        assert_eq!(view.player_hands[0].value, 16);
        assert!(view.valid_actions.contains(&Decision::Surrender));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["state"], "player_turn");
        assert!(json["deck_info"]["true_count"].is_number());
        assert_eq!(json["valid_actions"][0], "hit");

        let view = service.perform_action(id, "stand").unwrap();
        assert_eq!(view.phase, Phase::RoundOver);
        assert!(!view.dealer_hand.hole_card_hidden);
        assert!(view.dealer_hand.cards.len() >= 2);
        let net: i64 = view.results.iter().map(|r| r.net).sum();
        assert_eq!(view.bankroll, 1000 + net);
        assert_eq!(service.results(id).unwrap(), view.results);
    }

    #[test]
    fn failed_requests_leave_the_state_unchanged() {
        let service = BlackjackService::new();
        let id = seeded_session(&service, &[10, 6, 6, 9]);
        assert!(matches!(
            service.place_bet(id, 2000),
            Err(EngineError::InvalidBet { amount: 2000, .. })
        ));
        assert!(matches!(
            service.perform_action(id, "stand"),
            Err(EngineError::InvalidAction(_))
        ));
        let view = service.game_state(id).unwrap();
        assert_eq!(view.phase, Phase::Betting);
        assert_eq!(view.bankroll, 1000);

        service.place_bet(id, 10).unwrap();
        assert!(matches!(
            service.perform_action(id, "fold"),
            Err(EngineError::InvalidAction(_))
        ));
        // 10 and 6 is not a pair.
        assert!(matches!(
            service.perform_action(id, "split"),
            Err(EngineError::InvalidAction(_))
        ));
        assert_eq!(service.game_state(id).unwrap().phase, Phase::PlayerTurn);
        assert_eq!(service.history(id).unwrap().len(), 1);
    }

    #[test]
    fn history_and_new_round() {
        let service = BlackjackService::new();
        let id = seeded_session(&service, &[10, 6, 6, 9]);
        service.place_bet(id, 10).unwrap();
        service.perform_action(id, "surrender").unwrap();
        let view = service.new_round(id).unwrap();
        assert_eq!(view.phase, Phase::Betting);
        assert_eq!(view.bankroll, 995);
        assert!(view.results.is_empty());

        let history = service.history(id).unwrap();
        let actions: Vec<&str> = history.iter().map(|h| h.action.as_str()).collect();
        assert_eq!(actions, vec!["bet", "surrender", "new_round"]);
        assert_eq!(history[0].amount, Some(10));
        assert_eq!(history[0].phase, Phase::PlayerTurn);
        assert_eq!(history[1].phase, Phase::RoundOver);
    }

    #[test]
    fn auto_play_records_each_step_as_applied() {
        let service = BlackjackService::new();
        let id = seeded_session(&service, &[8, 6, 8, 10, 3, 10, 9, 10]);
        assert!(matches!(
            service.auto_play(id, "basic"),
            Err(EngineError::InvalidAction(_))
        ));
        assert!(service.history(id).unwrap().is_empty());

        service.place_bet(id, 10).unwrap();
        let view = service.auto_play(id, "basic").unwrap();
        assert_eq!(view.phase, Phase::RoundOver);
        assert_eq!(view.bankroll, 1030);

        let history = service.history(id).unwrap();
        let steps: Vec<(&str, Phase)> = history
            .iter()
            .map(|h| (h.action.as_str(), h.phase))
            .collect();
        assert_eq!(
            steps,
            vec![
                ("bet", Phase::PlayerTurn),
                ("split", Phase::PlayerTurn),
                ("double", Phase::PlayerTurn),
                ("stand", Phase::RoundOver),
            ]
        );
    }

    #[test]
    fn statistics_follow_the_phase() {
        let service = BlackjackService::new();
        let id = seeded_session(&service, &[10, 6, 6, 9]);
        assert!(!service.live_statistics(id).unwrap().available);

        service.place_bet(id, 10).unwrap();
        let statistics = service.live_statistics(id).unwrap();
        assert!(statistics.available);
        let analysis = statistics.analysis.unwrap();
        assert_eq!(analysis.player_hand.value, 16);
        assert_eq!(analysis.dealer.up_card.blackjack_value(), 6);

        service.auto_play(id, "basic").unwrap();
        assert!(!service.live_statistics(id).unwrap().available);
        assert!(matches!(
            service.auto_play(id, "telepathy"),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn removed_sessions_are_gone() {
        let service = BlackjackService::new();
        let id = service
            .start_session(&StartSessionRequest::new(100))
            .unwrap()
            .session_id;
        service.remove_session(id).unwrap();
        assert_eq!(service.session_count(), 0);
        assert_eq!(service.new_round(id), Err(EngineError::SessionNotFound(id)));
    }

    #[test]
    fn sessions_are_independent_across_threads() {
        let service = Arc::new(BlackjackService::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    let mut request = StartSessionRequest::new(1000);
                    request.seed = Some(i);
                    let id = service.start_session(&request).unwrap().session_id;
                    for _ in 0..20 {
                        let view = service.place_bet(id, 10).unwrap();
                        if view.phase == Phase::PlayerTurn {
                            service.auto_play(id, "basic").unwrap();
                        }
                        service.new_round(id).unwrap();
                    }
                    id
                })
            })
            .collect();
        for handle in handles {
            let id = handle.join().unwrap();
            assert_eq!(service.history(id).unwrap().first().map(|h| h.action.clone()), Some("bet".to_owned()));
        }
        assert_eq!(service.session_count(), 8);
    }

    #[test]
    fn facade_exposes_the_simulation_endpoints() {
        let service = BlackjackService::new();
        let strategies = service.available_strategies();
        assert!(strategies.playing.contains(&"basic".to_owned()));
        let presets = service.strategy_presets();
        assert_eq!(presets.default, crate::counting::StrategyConfig::default_preset());

        let config = SimulationConfig {
            num_hands: 20,
            num_simulations: 2,
            seed: Some(1),
            ..Default::default()
        };
        let report = service.run_simulation(&config, &CancelToken::new()).unwrap();
        assert_eq!(report.results.len(), 2);
    }
}
