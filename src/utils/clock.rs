//! Clock abstraction for the capture tick
//!
//! The capture controller advances its elapsed-time counter on a
//! one-second tick. The tick source is injected so tests can step time
//! deterministically instead of waiting on wall-clock timers.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Source of one-second ticks.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Wait until the next tick boundary.
    async fn tick(&self);
}

/// Wall-clock ticks, one per second.
#[derive(Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    async fn tick(&self) {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// Manually stepped clock for tests.
///
/// `tick` only resolves once a matching [`advance`](ManualClock::advance)
/// permit is available, so a test controls exactly how many seconds pass.
#[derive(Debug)]
pub struct ManualClock {
    permits: Semaphore,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            permits: Semaphore::new(0),
        }
    }

    /// Let `ticks` further ticks resolve.
    pub fn advance(&self, ticks: u32) {
        self.permits.add_permits(ticks as usize);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    async fn tick(&self) {
        match self.permits.acquire().await {
            Ok(permit) => permit.forget(),
            // The semaphore is never closed; park forever if it somehow is.
            Err(_) => std::future::pending().await,
        }
    }
}
