//! Deadline-bounded polling schedule.
//!
//! Built on the tokio clock, so tests can drive it with a paused runtime.
//! Cancellation and the deadline are checked at the top of every tick; the
//! sleep between checks is never shorter than the poll interval unless the
//! deadline is closer than that.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Outcome of one tick of the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Time to poll again.
    Ready,
    /// The deadline passed.
    Expired { elapsed: Duration },
    /// The caller cancelled the wait.
    Cancelled { elapsed: Duration },
}

#[derive(Debug, Clone)]
pub struct PollSchedule {
    interval: Duration,
    started: Instant,
    deadline: Instant,
    cancel: CancellationToken,
}

impl PollSchedule {
    /// Start a schedule now, expiring after `timeout`.
    pub fn new(interval: Duration, timeout: Duration, cancel: CancellationToken) -> Self {
        let started = Instant::now();
        Self {
            interval,
            started,
            deadline: started + timeout,
            cancel,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Check for cancellation or expiry, otherwise sleep until the next poll.
    pub async fn tick(&mut self) -> Tick {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.started);

        if self.cancel.is_cancelled() {
            return Tick::Cancelled { elapsed };
        }
        if now >= self.deadline {
            return Tick::Expired { elapsed };
        }

        let remaining = self.deadline - now;
        tokio::time::sleep(self.interval.min(remaining)).await;
        Tick::Ready
    }
}
