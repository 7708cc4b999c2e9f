use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

//
// ─── CLOCK ─────────────────────────────────────────────────────────────────────
//

/// A simple clock abstraction for deterministic time in services and tests.
///
/// `Fixed` stands still unless the owning value is advanced; `Shared` clones
/// all observe one advanceable instant, which lets a test drive the session
/// clock and the gateway clock from a single handle.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
    Shared(Arc<Mutex<DateTime<Utc>>>),
}

impl Clock {
    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns an advanceable clock whose clones all see the same instant.
    #[must_use]
    pub fn shared(at: DateTime<Utc>) -> Self {
        Self::Shared(Arc::new(Mutex::new(at)))
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
            Clock::Shared(t) => *t.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Advances a fixed or shared clock by the given duration.
    ///
    /// Has no effect on `Clock::Default`. Advancing a `Shared` clock is
    /// visible through every clone.
    pub fn advance(&mut self, delta: Duration) {
        match self {
            Clock::Default => {}
            Clock::Fixed(t) => *t += delta,
            Clock::Shared(t) => *t.lock().unwrap_or_else(PoisonError::into_inner) += delta,
        }
    }
}

//
// ─── COUNTDOWN ─────────────────────────────────────────────────────────────────
//

/// Outcome of polling a [`Countdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    /// Time left on the budget, in whole seconds.
    Running(u64),
    /// The deadline was reached. Reported exactly once.
    Expired,
    /// The countdown already expired earlier and will not fire again.
    Stopped,
}

/// Countdown bound to one absolute deadline.
///
/// Remaining time is recomputed from the deadline on every poll instead of
/// accumulating decrements, so a backgrounded or paused caller still converges
/// on the true remaining budget. The reported value is clamped to be
/// non-increasing and never negative, and the expiry notification fires
/// exactly once.
#[derive(Debug, Clone)]
pub struct Countdown {
    deadline: DateTime<Utc>,
    last_remaining: Option<u64>,
    fired: bool,
}

impl Countdown {
    #[must_use]
    pub fn new(deadline: DateTime<Utc>) -> Self {
        Self {
            deadline,
            last_remaining: None,
            fired: false,
        }
    }

    #[must_use]
    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// True once the countdown has reached zero and fired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.fired
    }

    /// Remaining whole seconds at `now`, without consuming the expiry.
    #[must_use]
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u64 {
        if self.fired {
            return 0;
        }
        let computed = self.compute(now);
        match self.last_remaining {
            Some(last) => last.min(computed),
            None => computed,
        }
    }

    /// Advances the countdown to `now`.
    ///
    /// Returns `Running` with the clamped remaining seconds, `Expired` the
    /// first time the budget hits zero, and `Stopped` on every poll after
    /// that.
    pub fn poll(&mut self, now: DateTime<Utc>) -> CountdownTick {
        if self.fired {
            return CountdownTick::Stopped;
        }

        let remaining = self.remaining_seconds(now);
        self.last_remaining = Some(remaining);

        if remaining == 0 {
            self.fired = true;
            CountdownTick::Expired
        } else {
            CountdownTick::Running(remaining)
        }
    }

    fn compute(&self, now: DateTime<Utc>) -> u64 {
        let left = (self.deadline - now).num_seconds();
        u64::try_from(left).unwrap_or(0)
    }
}

//
// ─── TEST HELPERS ──────────────────────────────────────────────────────────────
//

/// Deterministic timestamp for tests and examples (2024-07-03T09:46:40Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_720_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}
