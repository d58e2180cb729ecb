//! Session coordinator: drives room lifecycle transitions in response to
//! client events and timer expirations, and emits all outbound
//! notifications. Every event for a room is handled to completion under the
//! room's lock before the next one; rooms never block each other.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::cards::Card;
use crate::config;
use crate::protocol::{ClientToServer, JoinPlayer, ServerToClient};
use crate::room::manager::RoomManager;
use crate::room::{Denial, JoinOutcome, Phase, Room, Tx};

#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomManager>,
}

/// Route one decoded client event to its handler. `conn_player` is the
/// identity bound to the connection, used for lifecycle bookkeeping only.
pub fn dispatch(state: &AppState, conn_player: &str, event: ClientToServer, tx: &Tx) {
    match event {
        ClientToServer::Ping => {
            let _ = tx.send(ServerToClient::Pong);
        }
        ClientToServer::ListRooms => {
            let _ = tx.send(ServerToClient::RoomList {
                rooms: state.rooms.available_rooms(),
            });
        }
        ClientToServer::Join { room_id, player } => handle_join(state, &room_id, player, tx),
        ClientToServer::Ready { room_id, player_id } => {
            handle_ready(state, &room_id, &player_id, tx)
        }
        ClientToServer::Move {
            room_id,
            player_id,
            discard,
        } => handle_move(state, &room_id, &player_id, &discard, tx),
        ClientToServer::Declare { room_id, player_id } => {
            handle_declare(state, &room_id, &player_id, tx)
        }
        ClientToServer::Chat {
            room_id,
            from,
            message,
        } => handle_chat(state, &room_id, from, message, tx),
    }
    debug!(player_id = conn_player, "event handled");
}

fn deny(tx: &Tx, action: &str, denial: &Denial) {
    let _ = tx.send(ServerToClient::Denied {
        action: action.to_string(),
        reason: denial.to_string(),
    });
}

/// Join: seat the player (creating the room on first reference), or hand
/// the connection a spectator snapshot when the table is full or mid-round.
pub fn handle_join(state: &AppState, room_id: &str, player: JoinPlayer, tx: &Tx) {
    let room = state.rooms.get_or_create(room_id);
    match room.try_join(player, tx.clone()) {
        Ok(JoinOutcome::Seated {
            players,
            waiting_for_players,
        }) => {
            info!(room_id, players = players.len(), "player joined");
            room.broadcast(&ServerToClient::PlayerJoined { players });
            if waiting_for_players {
                room.broadcast(&ServerToClient::WaitingForPlayers {
                    room_id: room_id.to_string(),
                });
            }
        }
        Ok(JoinOutcome::Observer { snapshot }) => {
            debug!(room_id, "connection admitted as observer");
            let _ = tx.send(snapshot);
        }
        Err(denial) => {
            let _ = tx.send(ServerToClient::JoinDenied {
                reason: denial.to_string(),
            });
        }
    }
}

/// Ready: mark the player ready; when everyone (at least two) is ready and
/// nothing is running, begin the single pre-round countdown.
pub fn handle_ready(state: &AppState, room_id: &str, player_id: &str, tx: &Tx) {
    let Some(room) = state.rooms.get(room_id) else {
        return deny(tx, "ready", &Denial::RoomNotFound);
    };
    match room.mark_ready(player_id) {
        Ok(outcome) => {
            room.broadcast(&ServerToClient::ReadyStatus {
                players: outcome.players,
            });
            if outcome.start_countdown {
                info!(room_id, "all ready, starting countdown");
                room.broadcast(&ServerToClient::CountdownToStart {
                    seconds: config::COUNTDOWN.as_secs(),
                });
                let timer_room = room.clone();
                room.install_countdown(tokio::spawn(async move {
                    tokio::time::sleep(config::COUNTDOWN).await;
                    start_round(&timer_room);
                }));
            }
        }
        Err(denial) => deny(tx, "ready", &denial),
    }
}

/// Countdown or post-declare pause elapsed: deal the next round and push
/// the fresh public snapshot, private hands and the opening turn notice.
fn start_round(room: &Arc<Room>) {
    let started = room.with_state(|s| {
        s.has_declared = false;
        match s.engine.start_new_round() {
            Ok(()) => {
                s.phase = Phase::RoundActive;
                let hands: Vec<(String, Vec<_>)> = s
                    .engine
                    .players
                    .iter()
                    .map(|p| (p.id.clone(), p.hand.clone()))
                    .collect();
                let turn = s
                    .engine
                    .current_player()
                    .map(|p| (p.id.clone(), p.name.clone()));
                Some((s.engine.discard_top(), s.engine.draw_count(), hands, turn))
            }
            Err(err) => {
                warn!(room_id = %room.id, %err, "round start rejected");
                s.phase = Phase::Waiting;
                None
            }
        }
    });

    let Some((discard_top, deck_count, hands, turn)) = started else {
        return;
    };
    info!(room_id = %room.id, deck_count, "round started");
    room.broadcast(&ServerToClient::RoundStarted {
        players: room.player_states(),
        discard_top,
        deck_count,
    });
    for (player_id, hand) in hands {
        room.send_to(&player_id, &ServerToClient::HandDealt { hand });
    }
    room.broadcast(&ServerToClient::PlayerStates {
        players: room.player_states(),
    });
    if let Some((player_id, name)) = turn {
        room.broadcast(&ServerToClient::Turn { player_id, name });
    }
}

/// Move: discard-then-draw for the current actor, then advance the turn.
/// A rejected move reaches only the caller and mutates nothing.
pub fn handle_move(
    state: &AppState,
    room_id: &str,
    player_id: &str,
    discard: &[Card],
    tx: &Tx,
) {
    let Some(room) = state.rooms.get(room_id) else {
        return deny(tx, "move", &Denial::RoomNotFound);
    };

    let result = room.with_state(|s| {
        if s.phase != Phase::RoundActive {
            return Err(Denial::RoundNotActive);
        }
        let drawn = s.engine.perform_move(player_id, discard)?;
        let hand = s
            .engine
            .player(player_id)
            .map(|p| p.hand.clone())
            .unwrap_or_default();
        s.engine.advance_turn();
        let turn = s
            .engine
            .current_player()
            .map(|p| (p.id.clone(), p.name.clone()));
        Ok((drawn, hand, turn))
    });

    match result {
        Ok((drawn, hand, turn)) => {
            room.broadcast(&ServerToClient::PlayerMoved {
                player_id: player_id.to_string(),
                discard: discard.to_vec(),
                hand,
                drawn_card: drawn,
            });
            room.broadcast(&ServerToClient::PlayerStates {
                players: room.player_states(),
            });
            if let Some((player_id, name)) = turn {
                room.broadcast(&ServerToClient::Turn { player_id, name });
            }
        }
        Err(denial) => deny(tx, "move", &denial),
    }
}

/// Declare: only the current actor, once per round, with a hand at or
/// below the threshold. Resolution is broadcast and the next round is
/// scheduled after a fixed pause.
pub fn handle_declare(state: &AppState, room_id: &str, player_id: &str, tx: &Tx) {
    let Some(room) = state.rooms.get(room_id) else {
        return deny(tx, "declare", &Denial::RoomNotFound);
    };

    let multiplier = room.multiplier;
    let result = room.with_state(|s| {
        if s.phase != Phase::RoundActive {
            return Err(Denial::RoundNotActive);
        }
        if s.has_declared {
            return Err(Denial::AlreadyDeclared);
        }
        let current = s.engine.current_player().ok_or(Denial::RoundNotActive)?;
        if current.id != player_id {
            return Err(Denial::NotYourTurn);
        }
        if current.hand_value() > config::DECLARE_THRESHOLD {
            return Err(Denial::HandTooHigh);
        }
        let declaration = s.engine.resolve_declaration(player_id, multiplier)?;
        s.has_declared = true;
        s.phase = Phase::PostDeclare;
        Ok(declaration)
    });

    match result {
        Ok(declaration) => {
            info!(
                room_id,
                caller = player_id,
                outcome = ?declaration.outcome,
                "declaration resolved"
            );
            room.broadcast(&ServerToClient::DeclarationResult {
                outcome: declaration.outcome,
                challenger: declaration.challenger,
                scores: declaration.scores,
                chip_deltas: declaration.chip_deltas,
            });
            room.broadcast(&ServerToClient::PlayerStates {
                players: room.player_states(),
            });
            room.broadcast(&ServerToClient::RoundCountdown {
                seconds: config::ROUND_PAUSE.as_secs(),
            });
            let timer_room = room.clone();
            room.install_round_restart(tokio::spawn(async move {
                tokio::time::sleep(config::ROUND_PAUSE).await;
                start_round(&timer_room);
            }));
        }
        Err(denial) => deny(tx, "declare", &denial),
    }
}

/// Chat relay, stamped with server time.
pub fn handle_chat(state: &AppState, room_id: &str, from: String, message: String, tx: &Tx) {
    let Some(room) = state.rooms.get(room_id) else {
        return deny(tx, "chat", &Denial::RoomNotFound);
    };
    room.broadcast(&ServerToClient::Chat {
        from,
        message,
        at: OffsetDateTime::now_utc().unix_timestamp(),
    });
}

/// A connection opened for `player_id`: cancel any pending grace removals
/// and re-attach the push channel in every room they hold a seat in.
pub fn handle_connect(state: &AppState, player_id: &str, tx: &Tx) {
    let cancelled = state.rooms.cancel_grace(player_id);
    if cancelled > 0 {
        info!(player_id, cancelled, "player reconnected within grace");
    }
    for room in state.rooms.rooms_of(player_id) {
        room.attach_sender(player_id, tx.clone());
    }
}

/// The connection for `player_id` closed: detach the push channel and start
/// a grace timer per room; expiry removes the player from the roster. A
/// socket whose channel was already replaced by a newer connection is a
/// stale close and schedules nothing.
pub fn handle_disconnect(state: &AppState, player_id: &str, tx: &Tx) {
    for room in state.rooms.rooms_of(player_id) {
        if !room.detach_sender_if_current(player_id, tx) {
            debug!(room_id = %room.id, player_id, "stale socket closed, player already reconnected");
            continue;
        }
        info!(room_id = %room.id, player_id, "disconnected, grace timer started");
        let timer_room = room.clone();
        let pid = player_id.to_string();
        room.install_grace(
            player_id,
            tokio::spawn(async move {
                tokio::time::sleep(config::DISCONNECT_GRACE).await;
                remove_after_grace(&timer_room, &pid);
            }),
        );
    }
}

/// Grace expired: drop the player, advancing the turn pointer if it was
/// theirs, and tell the room.
fn remove_after_grace(room: &Arc<Room>, player_id: &str) {
    let removed = room.with_state(|s| {
        if !s.engine.remove_player(player_id) {
            return None;
        }
        if s.engine.players.is_empty() {
            s.phase = Phase::Waiting;
        }
        let turn = if s.engine.round_active() {
            s.engine
                .current_player()
                .map(|p| (p.id.clone(), p.name.clone()))
        } else {
            None
        };
        Some(turn)
    });

    let Some(turn) = removed else { return };
    info!(room_id = %room.id, player_id, "removed after grace period");
    room.broadcast(&ServerToClient::PlayerLeft {
        player_id: player_id.to_string(),
    });
    if let Some((player_id, name)) = turn {
        room.broadcast(&ServerToClient::Turn { player_id, name });
    }
}
