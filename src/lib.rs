//! Authoritative server core for a multi-room, turn-based Yaniv card game:
//! rules engine, room registry and the timer-driven session coordinator.

pub mod cards;
pub mod config;
pub mod engine;
pub mod protocol;
pub mod room;
pub mod session;
pub mod telemetry;
pub mod ws;
