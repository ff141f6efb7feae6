//! Room settings and match-config validation.

use std::time::Duration;

use kanabattle_protocol::MatchConfig;

use crate::RoomError;

/// Server-wide knobs shared by every room.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// How long an empty room waits for someone to (re)join before it
    /// shuts itself down.
    pub grace_period: Duration,

    /// Upper bound on [`RoomHandle::snapshot`](crate::RoomHandle::snapshot).
    pub snapshot_timeout: Duration,

    /// Capacity of each room's command queue. Senders wait when it is full.
    pub command_buffer: usize,

    /// Shortest match a host may configure, in seconds.
    pub min_duration_secs: u32,

    /// Longest match a host may configure, in seconds.
    pub max_duration_secs: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(30),
            snapshot_timeout: Duration::from_millis(100),
            command_buffer: 64,
            min_duration_secs: 30,
            max_duration_secs: 600,
        }
    }
}

impl RoomSettings {
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_snapshot_timeout(mut self, timeout: Duration) -> Self {
        self.snapshot_timeout = timeout;
        self
    }

    /// Checks a host's requested match config against these bounds.
    ///
    /// # Errors
    /// Returns [`RoomError::InvalidConfig`] if the duration is out of range
    /// or no character group was selected.
    pub fn validate(&self, config: &MatchConfig) -> Result<(), RoomError> {
        let range = self.min_duration_secs..=self.max_duration_secs;
        if !range.contains(&config.duration) {
            return Err(RoomError::InvalidConfig(format!(
                "duration must be between {} and {} seconds",
                self.min_duration_secs, self.max_duration_secs
            )));
        }
        if config.groups.iter().all(|g| g.trim().is_empty()) {
            return Err(RoomError::InvalidConfig(
                "at least one group is required".to_owned(),
            ));
        }
        Ok(())
    }
}
