//! Configuration: bind address and gameplay tunables.

use std::env;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Socket address to bind the server to.
///
/// Reads the `PORT` env var or defaults to 8080, binds to 0.0.0.0.
pub fn server_addr() -> SocketAddr {
    let port = env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8080);
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

/// Maximum seated players per room; further joins spectate.
pub const ROOM_CAPACITY: usize = 4;

/// Players needed before a round can start.
pub const MIN_PLAYERS: usize = 2;

/// Cards dealt to each player at round start.
pub const HAND_SIZE: usize = 5;

/// Maximum hand value at which Yaniv may be declared.
pub const DECLARE_THRESHOLD: i64 = 5;

/// Starting chip balance assigned when a joining player supplies none.
pub const DEFAULT_CHIPS: i64 = 1000;

/// Chips required per multiplier point to join a fast-mode room.
pub const MIN_CHIPS_PER_MULTIPLIER: i64 = 100;

/// Pre-round countdown once everyone is ready.
pub const COUNTDOWN: Duration = Duration::from_secs(15);

/// Pause between a declaration resolving and the next round starting.
pub const ROUND_PAUSE: Duration = Duration::from_secs(15);

/// Grace period before a disconnected player is removed from their room.
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(60);
