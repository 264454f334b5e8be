//! Recorder clock.
//!
//! Checkpoint headers carry two fixed 8-byte fields: the tick count at writer
//! construction and the ticks elapsed at finalize. [`Ticks`] is a nanosecond
//! counter measured from a process-wide origin captured on first use, so tick
//! values from different threads are directly comparable.

use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;

static ORIGIN: OnceLock<Instant> = OnceLock::new();

fn origin() -> Instant {
    *ORIGIN.get_or_init(Instant::now)
}

/// Monotonic recorder timestamp, in nanoseconds since the process origin.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
pub struct Ticks(u64);

impl Ticks {
    /// Tick count zero (the process origin itself).
    pub const ZERO: Self = Self(0);

    /// Current tick count.
    #[must_use]
    pub fn now() -> Self {
        // Truncation after ~584 years of uptime is acceptable.
        #[allow(clippy::cast_possible_truncation)]
        Self(origin().elapsed().as_nanos() as u64)
    }

    /// Construct from a raw tick value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw tick value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Ticks elapsed since `earlier`, saturating at zero.
    #[must_use]
    pub const fn since(self, earlier: Self) -> Self {
        Self(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}
