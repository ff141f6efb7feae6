//! Timers for Kana Battle room actors.
//!
//! A room is a single `recv` loop over one command queue, so a timer is
//! just a message that arrives later. This crate provides:
//!
//! - [`defer`]: send a message into an actor's queue after a delay.
//! - [`Countdown`]: a restartable, cancelable [`defer`] with generation
//!   tracking, used for the match clock and the empty-room grace window.
//!
//! # Stale fires
//!
//! Aborting a pending task cannot recall a message it already queued. Every
//! arm therefore gets a new generation number that travels inside the
//! message, and the actor asks [`Countdown::fire`] whether the generation it
//! received is still the live one:
//!
//! ```ignore
//! while let Some(cmd) = rx.recv().await {
//!     match cmd {
//!         Command::Expired { generation } if self.clock.fire(generation) => {
//!             self.finish();
//!         }
//!         Command::Expired { .. } => {} // restarted or cancelled meanwhile
//!         // ...
//!     }
//! }
//! ```
//!
//! Senders are held weakly: a pending timer never keeps an actor's queue
//! open after every real handle is gone.

use std::time::Duration;

use tokio::sync::mpsc::WeakSender;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::trace;

/// Sends `message` to `target` once `delay` has elapsed.
///
/// If the queue is gone by then, the message is dropped. Abort the returned
/// handle to cancel.
pub fn defer<M>(delay: Duration, target: WeakSender<M>, message: M) -> JoinHandle<()>
where
    M: Send + 'static,
{
    tokio::spawn(async move {
        time::sleep(delay).await;
        match target.upgrade() {
            Some(sender) => {
                if sender.send(message).await.is_err() {
                    trace!("deferred message dropped: receiver closed");
                }
            }
            None => trace!("deferred message dropped: no live senders"),
        }
    })
}

/// A restartable one-shot timer.
///
/// At most one fire is pending at a time. Starting it again aborts the
/// pending fire and moves to a new generation.
#[derive(Debug)]
pub struct Countdown {
    label: &'static str,
    generation: u64,
    deadline: Option<Instant>,
    task: Option<JoinHandle<()>>,
}

impl Countdown {
    /// Creates a disarmed countdown. `label` only shows up in logs.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            generation: 0,
            deadline: None,
            task: None,
        }
    }

    /// Arms the countdown, replacing any pending fire.
    ///
    /// `make` builds the message from the new generation. Returns that
    /// generation.
    pub fn start<M>(
        &mut self,
        delay: Duration,
        target: &WeakSender<M>,
        make: impl FnOnce(u64) -> M,
    ) -> u64
    where
        M: Send + 'static,
    {
        self.abort_pending();
        self.generation += 1;
        self.deadline = Some(Instant::now() + delay);
        self.task = Some(defer(delay, target.clone(), make(self.generation)));
        trace!(
            timer = self.label,
            generation = self.generation,
            delay_ms = delay.as_millis() as u64,
            "countdown armed"
        );
        self.generation
    }

    /// Disarms the countdown. Returns `true` if it was armed.
    pub fn cancel(&mut self) -> bool {
        let was_armed = self.is_armed();
        self.abort_pending();
        if was_armed {
            // Invalidates a fire that was already queued.
            self.generation += 1;
            trace!(timer = self.label, "countdown cancelled");
        }
        was_armed
    }

    /// Accepts a fire carrying `generation`.
    ///
    /// Returns `true` exactly once per arm, and only for the current
    /// generation. The countdown is disarmed afterwards.
    pub fn fire(&mut self, generation: u64) -> bool {
        if !self.is_armed() || generation != self.generation {
            trace!(
                timer = self.label,
                generation,
                current = self.generation,
                "stale countdown fire ignored"
            );
            return false;
        }
        self.deadline = None;
        self.task = None;
        true
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Time left until the pending fire, if armed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    fn abort_pending(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.deadline = None;
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.abort_pending();
    }
}
