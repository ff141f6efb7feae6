//! # Kana Battle
//!
//! Real-time multiplayer session engine for Kana Battle, a timed
//! kana-recognition race.
//!
//! Players connect over a WebSocket, authenticated by a signed token in
//! the `token` query parameter. A host creates a room with a six-character
//! code, others join it, the host starts a timed match, members submit
//! scores and everyone sees the leaderboard until the clock runs out.
//!
//! Each room is an isolated actor task; the [`Hub`] is only the directory.
//! See the sub-crates for the layers:
//!
//! - `kanabattle-transport`: WebSocket accept, send and receive
//! - `kanabattle-protocol`: JSON wire messages
//! - `kanabattle-session`: identity, token validation and mailboxes
//! - `kanabattle-room`: room actors and the hub
//! - `kanabattle-timer`: cancellable one-shot timers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kanabattle::prelude::*;
//!
//! # async fn run() -> Result<(), BattleError> {
//! let config = ServerConfig::from_env()?;
//! let server = BattleServerBuilder::new()
//!     .config(&config)
//!     .build(config.authenticator())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::{ConfigError, ServerConfig};
pub use error::BattleError;
pub use server::{BattleServer, BattleServerBuilder, TOKEN_PARAM};

/// Everything needed to embed or run the server.
pub mod prelude {
    pub use crate::{BattleError, BattleServer, BattleServerBuilder, ConfigError, ServerConfig};
    pub use kanabattle_protocol::{
        ClientMessage, MatchConfig, MatchState, Player, RoomCode, ServerMessage, UserId,
    };
    pub use kanabattle_room::{Hub, RoomError, RoomSettings, RoomSnapshot};
    pub use kanabattle_session::{
        Authenticator, Identity, JwtAuthenticator, SessionConfig, SessionError,
    };
}
