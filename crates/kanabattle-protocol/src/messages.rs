//! The messages that travel between browser clients and the server.
//!
//! Every message is a JSON object tagged by a `type` field:
//!
//! ```json
//! {"type":"JOIN_ROOM","code":"3FA9C1"}
//! {"type":"SCORE_UPDATE","players":{"<uuid>":{"userId":"<uuid>","username":"kim","score":40}}}
//! ```
//!
//! Serde's internally tagged representation (`#[serde(tag = "type")]`)
//! produces exactly this shape, so there is no hand-written envelope.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MatchState, UserId};

/// Settings chosen by the host when a room is created.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Match length in seconds.
    pub duration: u32,
    /// Which character groups the quiz draws from (e.g. `"hiragana"`).
    #[serde(default)]
    pub groups: Vec<String>,
}

impl MatchConfig {
    pub fn new(duration: u32, groups: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            duration,
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }
}

/// One entry of a room's roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub username: String,
    pub score: u32,
}

impl Player {
    /// A fresh roster entry with a zero score.
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            score: 0,
        }
    }
}

/// A room's players keyed by user id. Serializes as a JSON object.
pub type Roster = BTreeMap<UserId, Player>;

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Commands a client can send.
///
/// Unknown `type` values and missing fields fail to decode; the connection
/// handler drops those frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Create a room with the given config and join it as host.
    CreateRoom(MatchConfig),
    /// Join an existing room by code.
    JoinRoom { code: String },
    /// Host only: start the match.
    StartGame {},
    /// Report the sender's current score.
    ///
    /// Kept signed and wide so out-of-range values reach the room and get
    /// logged instead of vanishing as decode errors.
    SubmitScore { score: i64 },
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Events the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Full lobby view, sent to every member whenever membership changes.
    RoomState {
        state: MatchState,
        players: Roster,
        #[serde(rename = "hostId")]
        host_id: UserId,
        config: MatchConfig,
    },
    /// The host started the match; it ends at `end_time`.
    GameStarted {
        #[serde(rename = "endTime")]
        end_time: DateTime<Utc>,
    },
    /// A score changed.
    ScoreUpdate { players: Roster },
    /// The match clock ran out. Final standings.
    GameOver { players: Roster },
    /// A request could not be honoured.
    Error { message: String },
}

impl ServerMessage {
    /// Shorthand for [`ServerMessage::Error`].
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
