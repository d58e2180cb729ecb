//! Room: one table's membership, mode, stake multiplier, engine and timers.

pub mod manager;

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config;
use crate::engine::{EngineError, GameEngine, Player};
use crate::protocol::{JoinPlayer, PlayerSummary, ReadyFlag, ServerToClient};

pub type Tx = mpsc::UnboundedSender<ServerToClient>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Classic,
    Fast,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Classic => "classic",
            Mode::Fast => "fast",
        }
    }
}

/// Rejected-action reasons surfaced to the initiating caller. Never fatal.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    #[error("room not found")]
    RoomNotFound,
    #[error("not enough chips, minimum required: {0}")]
    InsufficientChips(i64),
    #[error("not a member of this room")]
    NotAMember,
    #[error("not your turn")]
    NotYourTurn,
    #[error("round not active")]
    RoundNotActive,
    #[error("invalid discard")]
    InvalidDiscard,
    #[error("already declared this round")]
    AlreadyDeclared,
    #[error("hand value too high to declare")]
    HandTooHigh,
}

impl From<EngineError> for Denial {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotYourTurn => Denial::NotYourTurn,
            EngineError::InvalidDiscard => Denial::InvalidDiscard,
            EngineError::UnknownPlayer => Denial::NotAMember,
            EngineError::RoundNotActive | EngineError::NoPlayers => Denial::RoundNotActive,
        }
    }
}

/// Lifecycle of the table, driven by the session coordinator. The engine
/// keeps its own round-active flag; this tracks the coordinator's view,
/// including the pre-round countdown and the post-declare pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Waiting,
    Countdown,
    RoundActive,
    PostDeclare,
}

pub struct RoomState {
    pub engine: GameEngine,
    pub phase: Phase,
    pub has_declared: bool,
    senders: HashMap<String, Tx>,
}

/// Pending scheduled tasks. Installing a new timer of a category aborts any
/// prior one of the same key so effects never double-fire.
#[derive(Default)]
struct RoomTimers {
    countdown: Option<JoinHandle<()>>,
    round_restart: Option<JoinHandle<()>>,
    grace: HashMap<String, JoinHandle<()>>,
}

pub struct Room {
    pub id: String,
    pub mode: Mode,
    pub multiplier: i64,
    state: Mutex<RoomState>,
    timers: Mutex<RoomTimers>,
}

pub enum JoinOutcome {
    Seated {
        players: Vec<PlayerSummary>,
        waiting_for_players: bool,
    },
    Observer {
        snapshot: ServerToClient,
    },
}

pub struct ReadyOutcome {
    pub players: Vec<ReadyFlag>,
    pub start_countdown: bool,
}

fn summaries(engine: &GameEngine) -> Vec<PlayerSummary> {
    engine
        .players
        .iter()
        .map(|p| PlayerSummary {
            id: p.id.clone(),
            name: p.name.clone(),
            hand_size: p.hand.len(),
            score: p.score,
            chips: p.chips,
            ready: p.ready,
        })
        .collect()
}

impl Room {
    pub fn new(id: impl Into<String>, mode: Mode, multiplier: i64) -> Self {
        Self {
            id: id.into(),
            mode,
            multiplier,
            state: Mutex::new(RoomState {
                engine: GameEngine::new(Vec::new()),
                phase: Phase::Waiting,
                has_declared: false,
                senders: HashMap::new(),
            }),
            timers: Mutex::new(RoomTimers::default()),
        }
    }

    /// Chip balance required to take a seat. Zero for classic tables.
    pub fn min_chips(&self) -> i64 {
        match self.mode {
            Mode::Fast => self.multiplier * config::MIN_CHIPS_PER_MULTIPLIER,
            Mode::Classic => 0,
        }
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut RoomState) -> R) -> R {
        f(&mut self.state.lock())
    }

    pub fn is_open(&self) -> bool {
        let state = self.state.lock();
        state.engine.players.len() < config::ROOM_CAPACITY
            && matches!(state.phase, Phase::Waiting | Phase::Countdown)
    }

    pub fn is_member(&self, player_id: &str) -> bool {
        self.state.lock().engine.player(player_id).is_some()
    }

    /// Seat a player, or admit the connection as a read-only observer when
    /// the table is full or a round is running (including the post-declare
    /// pause, so nobody joins with stale deck knowledge).
    pub fn try_join(&self, player: JoinPlayer, tx: Tx) -> Result<JoinOutcome, Denial> {
        let mut state = self.state.lock();

        if state.engine.player(&player.id).is_some() {
            // rejoin: refresh the push channel, keep the seat untouched
            state.senders.insert(player.id.clone(), tx);
            let players = summaries(&state.engine);
            return Ok(JoinOutcome::Seated {
                waiting_for_players: players.len() < config::MIN_PLAYERS,
                players,
            });
        }

        if state.engine.players.len() >= config::ROOM_CAPACITY
            || matches!(state.phase, Phase::RoundActive | Phase::PostDeclare)
        {
            let snapshot = ServerToClient::SpectatorMode {
                room_id: self.id.clone(),
                discard_top: state.engine.discard_top(),
                deck_count: state.engine.draw_count(),
                players: summaries(&state.engine),
            };
            state.senders.insert(player.id.clone(), tx);
            return Ok(JoinOutcome::Observer { snapshot });
        }

        let chips = player.chips.unwrap_or(config::DEFAULT_CHIPS);
        let min = self.min_chips();
        if chips < min {
            return Err(Denial::InsufficientChips(min));
        }

        state
            .engine
            .players
            .push(Player::new(player.id.clone(), player.name, Some(chips)));
        state.senders.insert(player.id, tx);
        let players = summaries(&state.engine);
        Ok(JoinOutcome::Seated {
            waiting_for_players: players.len() < config::MIN_PLAYERS,
            players,
        })
    }

    /// Mark a player ready. Signals a countdown start exactly once per
    /// readiness cycle: a ready event landing while the countdown is already
    /// pending does not restart it.
    pub fn mark_ready(&self, player_id: &str) -> Result<ReadyOutcome, Denial> {
        let mut state = self.state.lock();
        let Some(p) = state.engine.players.iter_mut().find(|p| p.id == player_id) else {
            return Err(Denial::NotAMember);
        };
        p.ready = true;

        let players: Vec<ReadyFlag> = state
            .engine
            .players
            .iter()
            .map(|p| ReadyFlag {
                id: p.id.clone(),
                ready: p.ready,
            })
            .collect();

        let all_ready = state.engine.players.len() >= config::MIN_PLAYERS
            && state.engine.players.iter().all(|p| p.ready);
        let start_countdown = all_ready && state.phase == Phase::Waiting;
        if start_countdown {
            state.phase = Phase::Countdown;
        }
        Ok(ReadyOutcome {
            players,
            start_countdown,
        })
    }

    pub fn player_states(&self) -> Vec<PlayerSummary> {
        summaries(&self.state.lock().engine)
    }

    pub fn attach_sender(&self, player_id: &str, tx: Tx) {
        self.state.lock().senders.insert(player_id.to_string(), tx);
    }

    /// Detach the push channel only while it is still the one this
    /// connection attached. Returns false when a newer connection has
    /// already replaced it, in which case the channel stays in place.
    pub fn detach_sender_if_current(&self, player_id: &str, tx: &Tx) -> bool {
        let mut state = self.state.lock();
        match state.senders.get(player_id) {
            Some(current) if current.same_channel(tx) => {
                state.senders.remove(player_id);
                true
            }
            _ => false,
        }
    }

    pub fn broadcast(&self, msg: &ServerToClient) {
        let state = self.state.lock();
        for tx in state.senders.values() {
            let _ = tx.send(msg.clone());
        }
    }

    pub fn send_to(&self, player_id: &str, msg: &ServerToClient) {
        let state = self.state.lock();
        if let Some(tx) = state.senders.get(player_id) {
            let _ = tx.send(msg.clone());
        }
    }

    pub fn install_countdown(&self, handle: JoinHandle<()>) {
        let mut timers = self.timers.lock();
        if let Some(old) = timers.countdown.replace(handle) {
            old.abort();
        }
    }

    pub fn install_round_restart(&self, handle: JoinHandle<()>) {
        let mut timers = self.timers.lock();
        if let Some(old) = timers.round_restart.replace(handle) {
            old.abort();
        }
    }

    pub fn install_grace(&self, player_id: &str, handle: JoinHandle<()>) {
        let mut timers = self.timers.lock();
        if let Some(old) = timers.grace.insert(player_id.to_string(), handle) {
            old.abort();
        }
    }

    /// Cancel a pending removal; true if one was pending.
    pub fn cancel_grace(&self, player_id: &str) -> bool {
        let mut timers = self.timers.lock();
        match timers.grace.remove(player_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx() -> Tx {
        mpsc::unbounded_channel().0
    }

    fn join(room: &Room, id: &str, chips: Option<i64>) -> Result<JoinOutcome, Denial> {
        room.try_join(
            JoinPlayer {
                id: id.into(),
                name: id.to_uppercase(),
                chips,
            },
            tx(),
        )
    }

    #[test]
    fn fast_room_enforces_min_chip_gate() {
        let room = Room::new("r", Mode::Fast, 3);
        assert_eq!(room.min_chips(), 300);
        assert_eq!(
            join(&room, "poor", Some(299)).err(),
            Some(Denial::InsufficientChips(300))
        );
        assert!(matches!(
            join(&room, "rich", Some(300)),
            Ok(JoinOutcome::Seated { .. })
        ));
        // no chips supplied: server default clears the gate
        assert!(matches!(join(&room, "fresh", None), Ok(JoinOutcome::Seated { .. })));
    }

    #[test]
    fn full_room_admits_observers_only() {
        let room = Room::new("r", Mode::Classic, 1);
        for i in 0..config::ROOM_CAPACITY {
            assert!(matches!(
                join(&room, &format!("p{i}"), None),
                Ok(JoinOutcome::Seated { .. })
            ));
        }
        assert!(matches!(
            join(&room, "late", None),
            Ok(JoinOutcome::Observer { .. })
        ));
        assert_eq!(room.player_states().len(), config::ROOM_CAPACITY);
    }

    #[test]
    fn mid_round_join_becomes_observer() {
        let room = Room::new("r", Mode::Classic, 1);
        join(&room, "a", None).unwrap();
        join(&room, "b", None).unwrap();
        room.with_state(|s| {
            s.engine.start_new_round().unwrap();
            s.phase = Phase::RoundActive;
        });
        assert!(matches!(
            join(&room, "c", None),
            Ok(JoinOutcome::Observer { .. })
        ));
    }

    #[test]
    fn rejoin_keeps_existing_seat() {
        let room = Room::new("r", Mode::Classic, 1);
        join(&room, "a", None).unwrap();
        join(&room, "a", None).unwrap();
        assert_eq!(room.player_states().len(), 1);
    }

    #[test]
    fn countdown_signalled_once_per_readiness_cycle() {
        let room = Room::new("r", Mode::Classic, 1);
        join(&room, "a", None).unwrap();
        join(&room, "b", None).unwrap();

        let first = room.mark_ready("a").unwrap();
        assert!(!first.start_countdown);

        let second = room.mark_ready("b").unwrap();
        assert!(second.start_countdown);

        // duplicate ready after the countdown began must not restart it
        let third = room.mark_ready("a").unwrap();
        assert!(!third.start_countdown);
    }

    #[test]
    fn ready_from_stranger_is_denied() {
        let room = Room::new("r", Mode::Classic, 1);
        join(&room, "a", None).unwrap();
        assert_eq!(room.mark_ready("ghost").err(), Some(Denial::NotAMember));
    }

    #[test]
    fn solo_ready_never_starts_countdown() {
        let room = Room::new("r", Mode::Classic, 1);
        join(&room, "a", None).unwrap();
        let out = room.mark_ready("a").unwrap();
        assert!(!out.start_countdown);
    }
}
