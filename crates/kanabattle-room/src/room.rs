//! Room actor: an isolated Tokio task that owns one match.
//!
//! Each room runs in its own task, communicating with the outside world
//! through a bounded mpsc channel. Membership, roster, scores, the clock
//! and the state machine live inside the task and are only ever touched
//! from its loop. Timers are messages on the same channel, so every input
//! is processed strictly in arrival order.
//!
//! Two things are visible without asking the loop:
//! - the current [`MatchState`], published on a `watch` channel so the hub
//!   can gate joins without waiting on the room
//! - session mailboxes, which the loop pushes into with `try_send`

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use kanabattle_protocol::{
    MatchConfig, MatchState, Player, RoomCode, Roster, ServerMessage, UserId,
};
use kanabattle_session::{Session, SessionId};
use kanabattle_timer::Countdown;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time;

use crate::{RoomError, RoomSettings};

/// Counter for telling apart rooms that reuse a code over time.
static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Highest score a client may report.
pub const MAX_SCORE: i64 = 9999;

/// Called exactly once when a room's loop is gone, with its code and
/// instance number.
pub(crate) type ExitHook = Box<dyn FnOnce(&RoomCode, u64) + Send>;

/// A room-scoped request from a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomMessage {
    /// Host only: start the match.
    StartGame,
    /// Report the sender's current score.
    SubmitScore(i64),
}

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        session: Arc<Session>,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Leave { session_id: SessionId },
    Message { sender: SessionId, msg: RoomMessage },
    MatchExpired { generation: u64 },
    GraceExpired { generation: u64 },
    Snapshot { reply: oneshot::Sender<RoomSnapshot> },
    Stop,
}

/// A copy of a room's state, taken inside its loop.
///
/// The `Default` value is what callers get when the room didn't answer in
/// time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub code: RoomCode,
    pub state: MatchState,
    pub host_id: UserId,
    pub config: MatchConfig,
    pub member_count: usize,
    pub players: Roster,
    pub end_time: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// RoomHandle
// ---------------------------------------------------------------------------

/// Handle to a running room actor.
///
/// Cheap to clone. The hub keeps one per room and every connection that
/// joined the room caches one for direct routing.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    code: RoomCode,
    instance: u64,
    sender: mpsc::Sender<RoomCommand>,
    state: watch::Receiver<MatchState>,
    snapshot_timeout: Duration,
}

impl RoomHandle {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub(crate) fn instance(&self) -> u64 {
        self.instance
    }

    /// The latest published match state. Never waits on the room.
    pub fn state(&self) -> MatchState {
        *self.state.borrow()
    }

    /// `true` once the room's loop has exited.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    /// Adds a session to the room and waits for the room's verdict.
    ///
    /// Once the match has started only users already on the roster get
    /// back in.
    ///
    /// # Errors
    /// - [`RoomError::InProgress`] if a newcomer arrives after the start
    /// - [`RoomError::Unavailable`] if the room's loop is gone
    pub async fn join(&self, session: Arc<Session>) -> Result<(), RoomError> {
        let (reply, admitted) = oneshot::channel();
        self.send(RoomCommand::Join { session, reply }).await?;
        admitted
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?
    }

    /// Removes a session. Ignored by the room if it isn't a member.
    pub async fn leave(&self, session_id: SessionId) -> Result<(), RoomError> {
        self.send(RoomCommand::Leave { session_id }).await
    }

    /// Delivers a member's request (fire-and-forget).
    pub async fn send_message(
        &self,
        sender: SessionId,
        msg: RoomMessage,
    ) -> Result<(), RoomError> {
        self.send(RoomCommand::Message { sender, msg }).await
    }

    pub async fn start(&self, sender: SessionId) -> Result<(), RoomError> {
        self.send_message(sender, RoomMessage::StartGame).await
    }

    pub async fn submit_score(&self, sender: SessionId, score: i64) -> Result<(), RoomError> {
        self.send_message(sender, RoomMessage::SubmitScore(score)).await
    }

    /// Asks the room for a copy of its state.
    ///
    /// Bounded by the configured snapshot timeout. A slow or dead room
    /// yields [`RoomSnapshot::default()`] instead of an error.
    pub async fn snapshot(&self) -> RoomSnapshot {
        let (reply, response) = oneshot::channel();
        let request = async {
            self.sender.send(RoomCommand::Snapshot { reply }).await.ok()?;
            response.await.ok()
        };
        match time::timeout(self.snapshot_timeout, request).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::debug!(room = %self.code, "snapshot requested from stopped room");
                RoomSnapshot::default()
            }
            Err(_) => {
                tracing::warn!(room = %self.code, "snapshot timed out");
                RoomSnapshot::default()
            }
        }
    }

    /// Tells the room to shut down.
    pub async fn stop(&self) -> Result<(), RoomError> {
        self.send(RoomCommand::Stop).await
    }
}

// ---------------------------------------------------------------------------
// RoomActor
// ---------------------------------------------------------------------------

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    code: RoomCode,
    instance: u64,
    host_id: UserId,
    config: MatchConfig,
    state: MatchState,
    end_time: Option<DateTime<Utc>>,
    grace_period: Duration,

    /// Connections currently in the room.
    members: HashMap<SessionId, Arc<Session>>,
    /// Players keyed by user; outlives membership while PLAYING.
    roster: Roster,

    match_clock: Countdown,
    grace: Countdown,

    state_tx: watch::Sender<MatchState>,
    /// Weak so pending timers never keep the queue open.
    self_tx: mpsc::WeakSender<RoomCommand>,
    receiver: mpsc::Receiver<RoomCommand>,
    on_exit: Option<ExitHook>,
}

impl RoomActor {
    /// Runs the actor loop until stopped or reclaimed by the grace timer.
    async fn run(mut self) {
        tracing::info!(room = %self.code, host = %self.host_id, "room actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join { session, reply } => {
                    let _ = reply.send(self.handle_join(session));
                }
                RoomCommand::Leave { session_id } => self.handle_leave(session_id),
                RoomCommand::Message { sender, msg } => match msg {
                    RoomMessage::StartGame => self.handle_start(sender),
                    RoomMessage::SubmitScore(score) => self.handle_score(sender, score),
                },
                RoomCommand::MatchExpired { generation } => {
                    if self.match_clock.fire(generation) {
                        self.finish();
                    }
                }
                RoomCommand::GraceExpired { generation } => {
                    if self.grace.fire(generation) {
                        tracing::info!(room = %self.code, "grace period expired");
                        break;
                    }
                }
                RoomCommand::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                RoomCommand::Stop => {
                    tracing::info!(room = %self.code, "room stopping");
                    break;
                }
            }
        }
        // Directory cleanup runs from `Drop`, so a panic above still
        // releases the code.
    }

    fn handle_join(&mut self, session: Arc<Session>) -> Result<(), RoomError> {
        let user_id = session.user_id();
        // The hub's check reads the published state, which can lag behind
        // a START_GAME queued ahead of this join.
        if self.state != MatchState::Waiting && !self.roster.contains_key(&user_id) {
            tracing::debug!(
                room = %self.code,
                user = %user_id,
                state = %self.state,
                "join refused, match already started"
            );
            return Err(RoomError::InProgress(self.code.clone()));
        }
        if let Some(left) = self.grace.remaining() {
            tracing::debug!(room = %self.code, remaining = ?left, "grace period cancelled");
        }
        self.grace.cancel();

        session.set_current_room(self.code.clone());
        self.roster
            .entry(user_id)
            .or_insert_with(|| Player::new(user_id, session.display_name()));
        self.members.insert(session.id(), session);

        tracing::info!(
            room = %self.code,
            user = %user_id,
            members = self.members.len(),
            "member joined"
        );
        self.broadcast(self.room_state_message());
        Ok(())
    }

    fn handle_leave(&mut self, session_id: SessionId) {
        if !self.remove_member(session_id) {
            tracing::debug!(room = %self.code, session = %session_id, "leave from non-member ignored");
            return;
        }
        self.broadcast(self.room_state_message());
    }

    fn handle_start(&mut self, sender: SessionId) {
        let is_host = self
            .members
            .get(&sender)
            .is_some_and(|s| s.user_id() == self.host_id);
        if !is_host || !self.state.can_transition_to(MatchState::Playing) {
            tracing::debug!(
                room = %self.code,
                session = %sender,
                state = %self.state,
                "start ignored"
            );
            return;
        }

        self.set_state(MatchState::Playing);
        let duration = Duration::from_secs(u64::from(self.config.duration));
        let end_time = Utc::now() + TimeDelta::seconds(i64::from(self.config.duration));
        self.end_time = Some(end_time);
        self.match_clock.start(duration, &self.self_tx, |generation| {
            RoomCommand::MatchExpired { generation }
        });

        tracing::info!(
            room = %self.code,
            duration_secs = self.config.duration,
            players = self.roster.len(),
            "game started"
        );
        self.broadcast(ServerMessage::GameStarted { end_time });
    }

    fn handle_score(&mut self, sender: SessionId, score: i64) {
        if !self.state.accepts_scores() {
            tracing::debug!(room = %self.code, session = %sender, "score outside match ignored");
            return;
        }
        let Some(user_id) = self.members.get(&sender).map(|s| s.user_id()) else {
            tracing::debug!(room = %self.code, session = %sender, "score from non-member ignored");
            return;
        };
        let value = match u32::try_from(score) {
            Ok(value) if score <= MAX_SCORE => value,
            _ => {
                self.reject_score(user_id, score);
                return;
            }
        };
        let Some(player) = self.roster.get_mut(&user_id) else {
            return;
        };

        player.score = value;
        self.broadcast(ServerMessage::ScoreUpdate {
            players: self.roster.clone(),
        });
    }

    fn reject_score(&self, user_id: UserId, score: i64) {
        tracing::warn!(
            room = %self.code,
            user = %user_id,
            score,
            "score out of range, possible tampering"
        );
    }

    fn finish(&mut self) {
        if !self.state.can_transition_to(MatchState::Finished) {
            return;
        }
        self.set_state(MatchState::Finished);
        tracing::info!(room = %self.code, players = self.roster.len(), "game finished");
        self.broadcast(ServerMessage::GameOver {
            players: self.roster.clone(),
        });
    }

    fn set_state(&mut self, next: MatchState) {
        self.state = next;
        self.state_tx.send_replace(next);
    }

    /// Drops a member and its back-reference. Returns `false` for
    /// non-members.
    fn remove_member(&mut self, session_id: SessionId) -> bool {
        let Some(session) = self.members.remove(&session_id) else {
            return false;
        };
        session.clear_current_room_if(&self.code);

        let user_id = session.user_id();
        let still_present = self.members.values().any(|s| s.user_id() == user_id);
        if self.state == MatchState::Waiting && !still_present {
            self.roster.remove(&user_id);
        }

        tracing::info!(
            room = %self.code,
            user = %user_id,
            members = self.members.len(),
            "member left"
        );
        true
    }

    /// Delivers `message` to every member.
    ///
    /// Members whose mailbox is full or closed are evicted like a leave,
    /// and the remaining members get a fresh `ROOM_STATE`.
    fn broadcast(&mut self, message: ServerMessage) {
        let mut pending = message;
        loop {
            let evicted = self.deliver_all(&pending);
            if evicted.is_empty() {
                break;
            }
            for session_id in evicted {
                self.remove_member(session_id);
            }
            pending = self.room_state_message();
        }
        self.arm_grace_if_empty();
    }

    fn deliver_all(&self, message: &ServerMessage) -> Vec<SessionId> {
        let mut evicted = Vec::new();
        for (id, session) in &self.members {
            if let Err(e) = session.try_deliver(message.clone()) {
                tracing::warn!(room = %self.code, session = %id, error = %e, "evicting member");
                session.close_mailbox();
                evicted.push(*id);
            }
        }
        evicted
    }

    fn arm_grace_if_empty(&mut self) {
        if self.members.is_empty() && !self.grace.is_armed() {
            tracing::info!(
                room = %self.code,
                grace_secs = self.grace_period.as_secs(),
                "room empty, grace period started"
            );
            self.grace.start(self.grace_period, &self.self_tx, |generation| {
                RoomCommand::GraceExpired { generation }
            });
        }
    }

    fn room_state_message(&self) -> ServerMessage {
        ServerMessage::RoomState {
            state: self.state,
            players: self.roster.clone(),
            host_id: self.host_id,
            config: self.config.clone(),
        }
    }

    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.clone(),
            state: self.state,
            host_id: self.host_id,
            config: self.config.clone(),
            member_count: self.members.len(),
            players: self.roster.clone(),
            end_time: self.end_time,
        }
    }
}

impl Drop for RoomActor {
    fn drop(&mut self) {
        for session in self.members.values() {
            session.clear_current_room_if(&self.code);
        }
        if let Some(on_exit) = self.on_exit.take() {
            on_exit(&self.code, self.instance);
        }
        tracing::info!(room = %self.code, "room destroyed");
    }
}

/// A room that has been built but whose loop is not running yet.
///
/// Lets the hub publish the handle under its write lock and start the task
/// after releasing it.
pub(crate) struct PendingRoom(RoomActor);

impl PendingRoom {
    pub(crate) fn spawn(self) {
        tokio::spawn(self.0.run());
    }
}

/// Builds a room actor in WAITING and returns a handle to it.
///
/// The grace timer starts right away, so a room nobody joins is reclaimed.
/// Must be called from within a Tokio runtime.
pub(crate) fn build_room(
    code: RoomCode,
    host_id: UserId,
    config: MatchConfig,
    settings: &RoomSettings,
    on_exit: ExitHook,
) -> (RoomHandle, PendingRoom) {
    let (tx, rx) = mpsc::channel(settings.command_buffer.max(1));
    let (state_tx, state_rx) = watch::channel(MatchState::Waiting);
    let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);

    let mut actor = RoomActor {
        code: code.clone(),
        instance,
        host_id,
        config,
        state: MatchState::Waiting,
        end_time: None,
        grace_period: settings.grace_period,
        members: HashMap::new(),
        roster: Roster::new(),
        match_clock: Countdown::new("match"),
        grace: Countdown::new("grace"),
        state_tx,
        self_tx: tx.downgrade(),
        receiver: rx,
        on_exit: Some(on_exit),
    };
    actor.arm_grace_if_empty();

    let handle = RoomHandle {
        code,
        instance,
        sender: tx,
        state: state_rx,
        snapshot_timeout: settings.snapshot_timeout,
    };
    (handle, PendingRoom(actor))
}
