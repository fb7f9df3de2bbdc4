//! # Clock and Timers
//!
//! The clock/timer service contract, a wall-clock implementation, and the
//! stopwatch behind the session's elapsed time.

use std::fmt;

/// Identifies one repeating timer scheduled on a [`TimerService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Wall-clock time and periodic callbacks.
///
/// A scheduled timer fires by delivering its handle back to the tracker
/// (`RouteTracker::on_timer`). After `cancel` returns, ticks carrying the
/// handle may still be in flight; the tracker ignores them.
pub trait TimerService: Send + Sync {
    /// Current time in epoch milliseconds.
    fn now_ms(&self) -> i64;

    /// Schedule a repeating timer. The first tick fires one period from now.
    fn schedule_repeating(&self, period_ms: u64) -> TimerHandle;

    fn cancel(&self, handle: TimerHandle);
}

/// System wall clock. Has no timers of its own; see `TokioTimer` for a
/// service that can schedule ticks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Elapsed-time clock that can be frozen and unfrozen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stopwatch {
    accumulated_ms: i64,
    running_since: Option<i64>,
}

impl Stopwatch {
    /// A stopped stopwatch already showing `elapsed_ms`.
    pub fn with_elapsed(elapsed_ms: i64) -> Self {
        Self {
            accumulated_ms: elapsed_ms.max(0),
            running_since: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    /// Start (or resume) counting from `now`. No-op when already running.
    pub fn start(&mut self, now: i64) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    /// Freeze the count at `now`. No-op when not running.
    pub fn pause(&mut self, now: i64) {
        if let Some(since) = self.running_since.take() {
            self.accumulated_ms += (now - since).max(0);
        }
    }

    pub fn elapsed_ms(&self, now: i64) -> i64 {
        match self.running_since {
            Some(since) => self.accumulated_ms + (now - since).max(0),
            None => self.accumulated_ms,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopwatch_freezes_while_paused() {
        let mut sw = Stopwatch::default();
        sw.start(1_000);
        assert_eq!(sw.elapsed_ms(4_000), 3_000);

        sw.pause(4_000);
        assert_eq!(sw.elapsed_ms(60_000), 3_000);

        sw.start(60_000);
        assert_eq!(sw.elapsed_ms(62_000), 5_000);
    }

    #[test]
    fn test_stopwatch_double_start_is_noop() {
        let mut sw = Stopwatch::default();
        sw.start(0);
        sw.start(500);
        assert_eq!(sw.elapsed_ms(1_000), 1_000);
    }

    #[test]
    fn test_stopwatch_clock_going_backwards() {
        let mut sw = Stopwatch::with_elapsed(2_000);
        sw.start(10_000);
        assert_eq!(sw.elapsed_ms(9_000), 2_000);
        sw.reset();
        assert!(!sw.is_running());
        assert_eq!(sw.elapsed_ms(0), 0);
    }

    #[test]
    fn test_system_clock_is_epoch_millis() {
        // 2020-01-01
        assert!(SystemClock::now_ms() > 1_577_836_800_000);
    }
}
