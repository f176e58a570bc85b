//! # Clock
//!
//! Nothing in Vouch reads the wall clock directly. Every component that
//! cares about time (the judgement window, deadlines, record timestamps)
//! is handed a [`Clock`] at construction and asks it for `now()` once per
//! operation. Time never advances on its own inside a component.
//!
//! - [`SystemClock`]: UTC wall clock via `chrono`.
//! - [`ManualClock`]: a clock the caller sets and advances explicitly.
//!   This is how tests walk a pledge through its deadline and judgement
//!   window without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// A source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        // Pre-epoch system clocks clamp to zero rather than wrap.
        u64::try_from(Utc::now().timestamp()).unwrap_or(0)
    }
}

/// A manually driven clock.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Starts at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(SystemClock.now())
    }

    pub fn set(&self, timestamp: Timestamp) {
        self.now.store(timestamp, Ordering::SeqCst);
    }

    /// Moves the clock forward and returns the new time.
    pub fn advance(&self, secs: u64) -> Timestamp {
        self.now.fetch_add(secs, Ordering::SeqCst) + secs
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
