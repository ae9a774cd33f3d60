//! Scheduling primitives
//!
//! - [`FrameClock`]: "wait for the next rendering frame"
//! - [`SweepCoalescer`]: at most one pending mutation-triggered sweep

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Source of frame boundaries
#[async_trait]
pub trait FrameClock: Send + Sync {
    /// Resolve when the next frame begins
    async fn next_frame(&self);
}

/// Fixed-rate frames on the tokio timer
#[derive(Debug, Clone, Copy)]
pub struct IntervalFrameClock {
    interval: Duration,
}

impl IntervalFrameClock {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for IntervalFrameClock {
    fn default() -> Self {
        // ~60 Hz
        Self::new(Duration::from_millis(16))
    }
}

#[async_trait]
impl FrameClock for IntervalFrameClock {
    async fn next_frame(&self) {
        tokio::time::sleep(self.interval).await;
    }
}

/// Watcher state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    SweepScheduled,
}

/// Idle → SweepScheduled on request, back to Idle when the sweep starts
#[derive(Debug, Default)]
pub struct SweepCoalescer {
    scheduled: AtomicBool,
}

impl SweepCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a sweep. Returns true if the caller must schedule it,
    /// false if one is already pending and absorbs this request.
    pub fn request(&self) -> bool {
        !self.scheduled.swap(true, Ordering::AcqRel)
    }

    /// The scheduled sweep is starting; later requests schedule a new one
    pub fn begin_sweep(&self) {
        self.scheduled.store(false, Ordering::Release);
    }

    pub fn state(&self) -> WatchState {
        if self.scheduled.load(Ordering::Acquire) {
            WatchState::SweepScheduled
        } else {
            WatchState::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalescer_state_machine() {
        let coalescer = SweepCoalescer::new();
        assert_eq!(coalescer.state(), WatchState::Idle);

        assert!(coalescer.request());
        assert_eq!(coalescer.state(), WatchState::SweepScheduled);

        // Absorbed while pending
        assert!(!coalescer.request());
        assert!(!coalescer.request());

        coalescer.begin_sweep();
        assert_eq!(coalescer.state(), WatchState::Idle);
        assert!(coalescer.request());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_frame_clock() {
        let clock = IntervalFrameClock::default();
        let start = tokio::time::Instant::now();

        clock.next_frame().await;

        assert!(start.elapsed() >= clock.interval());
    }
}
