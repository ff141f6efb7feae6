//! Identity and state types shared by every layer.
//!
//! These are "newtype wrappers" around primitives so a room code can't be
//! passed where a user id is expected. All of them serialize as their inner
//! value (`#[serde(transparent)]`), so a `UserId` is a plain UUID string in
//! JSON and a `RoomCode` is a plain string.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Stable identifier of a user, as issued by the identity provider.
///
/// One user may hold several connections (two browser tabs); the per
/// connection identity lives in the session layer. Rooms key their roster
/// by `UserId`, which is what lets a player's score survive a reconnect.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Generates a fresh random id. Mostly useful in tests.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// The short, human-shareable code of a room (e.g. `"3FA9C1"`).
///
/// Codes are case-insensitive for humans: [`RoomCode::new`] trims and
/// upper-cases whatever the player typed.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Normalizes user input into a room code.
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// MatchState: the room state machine
// ---------------------------------------------------------------------------

/// The lifecycle state of a match.
///
/// Transitions are monotonic:
///
/// ```text
/// WAITING → PLAYING → FINISHED
/// ```
///
/// - **Waiting**: lobby. Accepting joins, the host may start.
/// - **Playing**: clock running, scores accepted.
/// - **Finished**: terminal. Final standings have been broadcast.
///
/// A room can also be torn down from any state (grace timeout, explicit
/// stop); that is the end of the room, not a state of the match.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchState {
    #[default]
    Waiting,
    Playing,
    Finished,
}

impl MatchState {
    /// Returns `true` if the room is accepting new players.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Returns `true` if score submissions may change the roster.
    pub fn accepts_scores(self) -> bool {
        matches!(self, Self::Playing)
    }

    /// The state that follows this one, or `None` for the terminal state.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Waiting => Some(Self::Playing),
            Self::Playing => Some(Self::Finished),
            Self::Finished => None,
        }
    }

    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }
}

impl fmt::Display for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "WAITING"),
            Self::Playing => write!(f, "PLAYING"),
            Self::Finished => write!(f, "FINISHED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_serializes_as_plain_uuid_string() {
        let id = UserId(Uuid::nil());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
    }

    #[test]
    fn test_room_code_normalizes_input() {
        assert_eq!(RoomCode::new("  ab12cd ").as_str(), "AB12CD");
        assert_eq!(RoomCode::new("AB12CD"), RoomCode::new("ab12cd"));
    }

    #[test]
    fn test_room_code_serializes_as_plain_string() {
        let json = serde_json::to_string(&RoomCode::new("x1")).unwrap();
        assert_eq!(json, "\"X1\"");
    }

    #[test]
    fn test_match_state_wire_names() {
        assert_eq!(
            serde_json::to_string(&MatchState::Waiting).unwrap(),
            "\"WAITING\""
        );
        assert_eq!(
            serde_json::to_string(&MatchState::Playing).unwrap(),
            "\"PLAYING\""
        );
        assert_eq!(
            serde_json::to_string(&MatchState::Finished).unwrap(),
            "\"FINISHED\""
        );
        assert_eq!(MatchState::Playing.to_string(), "PLAYING");
    }

    #[test]
    fn test_match_state_transitions_are_monotonic() {
        assert_eq!(MatchState::Waiting.next(), Some(MatchState::Playing));
        assert_eq!(MatchState::Playing.next(), Some(MatchState::Finished));
        assert_eq!(MatchState::Finished.next(), None);

        assert!(MatchState::Waiting.can_transition_to(MatchState::Playing));
        assert!(!MatchState::Waiting.can_transition_to(MatchState::Finished));
        assert!(!MatchState::Finished.can_transition_to(MatchState::Waiting));
    }

    #[test]
    fn test_match_state_predicates() {
        assert!(MatchState::Waiting.is_joinable());
        assert!(!MatchState::Playing.is_joinable());
        assert!(!MatchState::Finished.is_joinable());

        assert!(MatchState::Playing.accepts_scores());
        assert!(!MatchState::Waiting.accepts_scores());
        assert!(!MatchState::Finished.accepts_scores());
    }
}
