//! Integration tests for the Heartbeat Scheduler.
//!
//! Uses tokio's paused clock so interval boundaries are exact.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::FakeHost;
use taskrunner_agent::heartbeat::{HeartbeatOutcome, HeartbeatScheduler};
use taskrunner_core::types::WorkerIdentity;

const INTERVAL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Test: no I/O within the interval
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn two_calls_within_interval_make_no_network_call() {
    let host = FakeHost::accepting();
    let mut scheduler = HeartbeatScheduler::new(host.clone(), INTERVAL);
    let id = WorkerIdentity::new("w-1");

    assert_eq!(scheduler.send_if_due(Some(&id)).await, HeartbeatOutcome::NotDue);
    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(scheduler.send_if_due(Some(&id)).await, HeartbeatOutcome::NotDue);

    assert_eq!(host.heartbeat_calls(), 0);
}

// ---------------------------------------------------------------------------
// Test: exactly one call once the interval has elapsed
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn one_call_after_interval_elapses() {
    let host = FakeHost::accepting();
    let mut scheduler = HeartbeatScheduler::new(host.clone(), INTERVAL);
    let id = WorkerIdentity::new("w-1");

    tokio::time::advance(INTERVAL).await;
    assert_eq!(scheduler.send_if_due(Some(&id)).await, HeartbeatOutcome::Sent);
    // Immediately polling again is within the new interval.
    assert_eq!(scheduler.send_if_due(Some(&id)).await, HeartbeatOutcome::NotDue);

    assert_eq!(host.heartbeat_calls(), 1);
}

// ---------------------------------------------------------------------------
// Test: a failed send does not advance the schedule
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn failed_send_keeps_heartbeat_due() {
    let host = FakeHost::accepting();
    host.fail_heartbeats.store(true, Ordering::SeqCst);
    let mut scheduler = HeartbeatScheduler::new(host.clone(), INTERVAL);
    let id = WorkerIdentity::new("w-1");
    let initial = scheduler.schedule().last_sent();

    tokio::time::advance(INTERVAL).await;
    assert_eq!(scheduler.send_if_due(Some(&id)).await, HeartbeatOutcome::Failed);
    assert_eq!(scheduler.schedule().last_sent(), initial);

    // The very next poll retries instead of waiting another interval.
    host.fail_heartbeats.store(false, Ordering::SeqCst);
    tokio::time::advance(Duration::from_millis(100)).await;
    assert_eq!(scheduler.send_if_due(Some(&id)).await, HeartbeatOutcome::Sent);
    assert!(scheduler.schedule().last_sent() > initial);

    assert_eq!(host.heartbeat_calls(), 2);
}

// ---------------------------------------------------------------------------
// Test: nothing is sent without an identity
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn no_heartbeat_without_identity() {
    let host = FakeHost::accepting();
    let mut scheduler = HeartbeatScheduler::new(host.clone(), INTERVAL);

    tokio::time::advance(INTERVAL).await;
    assert_eq!(scheduler.send_if_due(None).await, HeartbeatOutcome::NotRegistered);

    assert_eq!(host.heartbeat_calls(), 0);
}
