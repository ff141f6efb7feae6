//! Integration tests for deferred messages and countdowns.
//!
//! Every test runs with paused time: the runtime auto-advances the clock
//! whenever all tasks are idle, so a 30 s timer resolves instantly.

use std::time::Duration;

use kanabattle_timer::{Countdown, defer};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

#[derive(Debug, PartialEq, Eq)]
enum Msg {
    Fired(u64),
    Plain(&'static str),
}

// =========================================================================
// defer
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_defer_delivers_after_delay() {
    let (tx, mut rx) = mpsc::channel(4);
    let start = Instant::now();

    defer(Duration::from_secs(30), tx.downgrade(), Msg::Plain("late"));

    assert_eq!(rx.recv().await, Some(Msg::Plain("late")));
    assert!(start.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_defer_aborted_never_delivers() {
    let (tx, mut rx) = mpsc::channel(4);
    let handle = defer(Duration::from_secs(1), tx.downgrade(), Msg::Plain("x"));
    handle.abort();

    let result = time::timeout(Duration::from_secs(5), rx.recv()).await;
    assert!(result.is_err(), "aborted defer must not deliver");
}

#[tokio::test(start_paused = true)]
async fn test_defer_does_not_keep_queue_alive() {
    let (tx, mut rx) = mpsc::channel::<Msg>(4);
    let handle = defer(Duration::from_secs(1), tx.downgrade(), Msg::Plain("x"));
    drop(tx);

    // Only a weak sender remains, so the queue reports closed right away.
    assert_eq!(rx.recv().await, None);
    handle.await.expect("timer task should finish quietly");
}

// =========================================================================
// Countdown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_countdown_fire_accepted_once() {
    let (tx, mut rx) = mpsc::channel(4);
    let mut countdown = Countdown::new("test");
    assert!(!countdown.is_armed());

    let generation = countdown.start(Duration::from_secs(60), &tx.downgrade(), Msg::Fired);
    assert!(countdown.is_armed());
    assert_eq!(countdown.remaining(), Some(Duration::from_secs(60)));

    assert_eq!(rx.recv().await, Some(Msg::Fired(generation)));
    assert!(countdown.fire(generation));
    assert!(!countdown.fire(generation), "second fire must be ignored");
    assert!(!countdown.is_armed());
}

#[tokio::test(start_paused = true)]
async fn test_countdown_restart_replaces_pending_fire() {
    let (tx, mut rx) = mpsc::channel(4);
    let weak = tx.downgrade();
    let mut countdown = Countdown::new("test");

    let first = countdown.start(Duration::from_secs(10), &weak, Msg::Fired);
    time::advance(Duration::from_secs(5)).await;
    let second = countdown.start(Duration::from_secs(10), &weak, Msg::Fired);
    assert_ne!(first, second);

    let start = Instant::now();
    assert_eq!(rx.recv().await, Some(Msg::Fired(second)));
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert!(!countdown.fire(first));
    assert!(countdown.fire(second));
}

#[tokio::test(start_paused = true)]
async fn test_countdown_stale_queued_fire_rejected() {
    let (tx, mut rx) = mpsc::channel(4);
    let weak = tx.downgrade();
    let mut countdown = Countdown::new("test");

    let first = countdown.start(Duration::from_secs(1), &weak, Msg::Fired);
    // The fire is already sitting in the queue...
    assert_eq!(rx.recv().await, Some(Msg::Fired(first)));
    // ...when the owner re-arms before handling it.
    let second = countdown.start(Duration::from_secs(1), &weak, Msg::Fired);

    assert!(!countdown.fire(first));
    assert!(countdown.is_armed());
    assert_eq!(rx.recv().await, Some(Msg::Fired(second)));
    assert!(countdown.fire(second));
}

#[tokio::test(start_paused = true)]
async fn test_countdown_cancel() {
    let (tx, mut rx) = mpsc::channel(4);
    let mut countdown = Countdown::new("test");

    assert!(!countdown.cancel(), "nothing to cancel yet");
    let generation = countdown.start(Duration::from_secs(1), &tx.downgrade(), Msg::Fired);
    assert!(countdown.cancel());
    assert!(!countdown.is_armed());
    assert!(!countdown.fire(generation));

    let result = time::timeout(Duration::from_secs(5), rx.recv()).await;
    assert!(result.is_err(), "cancelled countdown must not deliver");
}

#[tokio::test(start_paused = true)]
async fn test_countdown_drop_aborts_pending_fire() {
    let (tx, mut rx) = mpsc::channel(4);
    {
        let mut countdown = Countdown::new("test");
        countdown.start(Duration::from_secs(1), &tx.downgrade(), Msg::Fired);
    }

    let result = time::timeout(Duration::from_secs(5), rx.recv()).await;
    assert!(result.is_err(), "dropped countdown must not deliver");
}
