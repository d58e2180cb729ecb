//! Registry of rooms: creation, lookup, eligibility filtering, teardown.

use std::sync::Arc;

use dashmap::DashMap;

use crate::protocol::RoomSummary;
use crate::room::{Mode, Room};

#[derive(Default)]
pub struct RoomManager {
    rooms: DashMap<String, Arc<Room>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Seed the fixed default tables: fast-mode rooms with escalating
    /// stakes, empty and open for joining. Idempotent.
    pub fn seed_defaults(&self) {
        for (id, multiplier) in [("room-1", 1), ("room-2", 2), ("room-3", 3)] {
            if !self.rooms.contains_key(id) {
                self.rooms
                    .insert(id.to_string(), Arc::new(Room::new(id, Mode::Fast, multiplier)));
                tracing::info!(room_id = id, multiplier, "default room created");
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Room>> {
        self.rooms.get(id).map(|r| r.clone())
    }

    /// Fetch a room, creating a classic single-stake table on first
    /// reference to an unknown identifier.
    pub fn get_or_create(&self, id: &str) -> Arc<Room> {
        self.rooms
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::info!(room_id = id, "room created on first join");
                Arc::new(Room::new(id, Mode::Classic, 1))
            })
            .clone()
    }

    /// Administrative removal. Rooms are never torn down implicitly; an
    /// emptied room stays registered and open.
    pub fn remove(&self, id: &str) -> Option<Arc<Room>> {
        self.rooms.remove(id).map(|(_, room)| room)
    }

    /// Rooms a new player could take a seat in right now.
    pub fn available_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self
            .rooms
            .iter()
            .filter(|entry| entry.value().is_open())
            .map(|entry| {
                let room = entry.value();
                RoomSummary {
                    id: room.id.clone(),
                    mode: room.mode.as_str().to_string(),
                    multiplier: room.multiplier,
                    min_chips: room.min_chips(),
                }
            })
            .collect();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        rooms
    }

    /// Rooms this player currently holds a seat in.
    pub fn rooms_of(&self, player_id: &str) -> Vec<Arc<Room>> {
        self.rooms
            .iter()
            .filter(|entry| entry.value().is_member(player_id))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Cancel every pending grace removal for a reconnecting player.
    pub fn cancel_grace(&self, player_id: &str) -> usize {
        let mut cancelled = 0;
        for entry in self.rooms.iter() {
            if entry.value().cancel_grace(player_id) {
                cancelled += 1;
            }
        }
        cancelled
    }
}
