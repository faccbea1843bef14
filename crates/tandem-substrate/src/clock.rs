//! Timer primitive for replayable orchestration logic
//!
//! State machines must never block a thread or read the wall clock while
//! waiting out a backoff. They ask a [`SagaClock`] instead, so the delay can
//! be served by durable timers in production and by a virtual clock in tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

/// Durable timer seam for saga and agent state machines.
#[async_trait]
pub trait SagaClock: Send + Sync {
    /// Suspend the caller for `duration` without consuming a thread.
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by the tokio timer wheel.
#[derive(Debug, Default)]
pub struct TokioClock;

impl TokioClock {
    /// Create a new tokio-backed clock
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SagaClock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Test clock: records every requested delay and returns immediately.
///
/// Lets tests assert exact backoff sequences (e.g. 1s, 2s, 4s) without
/// actually waiting them out.
#[derive(Debug, Default)]
pub struct VirtualClock {
    slept: Mutex<Vec<Duration>>,
}

impl VirtualClock {
    /// Create a new virtual clock
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in order.
    #[must_use]
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }

    /// Sum of all requested delays.
    #[must_use]
    pub fn total_slept(&self) -> Duration {
        self.slept.lock().iter().sum()
    }
}

#[async_trait]
impl SagaClock for VirtualClock {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
    }
}
