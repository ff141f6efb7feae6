//! Rooms and the hub for Kana Battle.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns one
//! timed match: who is in it, their scores, the clock and the
//! WAITING → PLAYING → FINISHED state machine.
//!
//! # Key types
//!
//! - [`Hub`]: creates rooms, hands sessions to them, tracks sessions
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`RoomSnapshot`]: a copy of a room's state taken inside its loop
//! - [`RoomSettings`]: grace window, timeouts and match bounds

mod config;
mod directory;
mod error;
mod hub;
mod room;

pub use config::RoomSettings;
pub use directory::RoomDirectory;
pub use error::RoomError;
pub use hub::Hub;
pub use room::{MAX_SCORE, RoomHandle, RoomMessage, RoomSnapshot};
