//! Error types for the room layer.

use kanabattle_protocol::RoomCode;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No live room has this code.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The room's match already started (or finished); it takes no joins.
    #[error("room {0} already in progress")]
    InProgress(RoomCode),

    /// The requested match configuration is out of bounds.
    #[error("invalid match config: {0}")]
    InvalidConfig(String),

    /// The room's command channel is closed: its loop has exited.
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),
}

impl RoomError {
    /// The text shown to a client in an `ERROR` message.
    pub fn client_message(&self) -> String {
        match self {
            Self::NotFound(_) | Self::Unavailable(_) => "Room not found".to_owned(),
            Self::InProgress(_) => "Game already in progress".to_owned(),
            Self::InvalidConfig(reason) => reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_hides_room_code() {
        let code = RoomCode::new("ABC123");
        assert_eq!(RoomError::NotFound(code.clone()).client_message(), "Room not found");
        assert_eq!(
            RoomError::InProgress(code.clone()).client_message(),
            "Game already in progress"
        );
        assert_eq!(RoomError::Unavailable(code).client_message(), "Room not found");
    }
}
