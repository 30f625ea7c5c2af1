//! Expiry durations expressed in configurable time units.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which access pattern an expiry duration is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpiryType {
    /// Time since the entry was last read or written.
    Accessed,
    /// Time since the entry was last written.
    Modified,
}

impl fmt::Display for ExpiryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accessed => write!(f, "ACCESSED"),
            Self::Modified => write!(f, "MODIFIED"),
        }
    }
}

/// Unit an [`ExpiryDuration`] amount is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Convert an amount of this unit into a std duration, saturating.
    fn to_std(self, amount: u64) -> Duration {
        match self {
            Self::Nanoseconds => Duration::from_nanos(amount),
            Self::Microseconds => Duration::from_micros(amount),
            Self::Milliseconds => Duration::from_millis(amount),
            Self::Seconds => Duration::from_secs(amount),
            Self::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            Self::Hours => Duration::from_secs(amount.saturating_mul(3_600)),
            Self::Days => Duration::from_secs(amount.saturating_mul(86_400)),
        }
    }
}

/// A `(unit, amount)` pair.
///
/// The unit and amount are kept exactly as configured so callers can report
/// them back, but equality and hashing use whole seconds. Two sources that
/// say `(MINUTES, 6)` and `(SECONDS, 360)` therefore describe the same expiry.
///
/// An amount of zero means the entry never expires on this axis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExpiryDuration {
    pub unit: TimeUnit,
    pub amount: u64,
}

impl ExpiryDuration {
    /// Never expire.
    pub const ETERNAL: Self = Self {
        unit: TimeUnit::Seconds,
        amount: 0,
    };

    pub const fn new(unit: TimeUnit, amount: u64) -> Self {
        Self { unit, amount }
    }

    pub const fn seconds(amount: u64) -> Self {
        Self::new(TimeUnit::Seconds, amount)
    }

    /// Whole seconds, truncating sub-second remainders.
    pub fn as_secs(&self) -> u64 {
        self.unit.to_std(self.amount).as_secs()
    }

    pub fn is_eternal(&self) -> bool {
        self.amount == 0
    }

    /// The std duration to hand to a storage engine, `None` when eternal.
    pub fn to_std(&self) -> Option<Duration> {
        if self.is_eternal() {
            None
        } else {
            Some(self.unit.to_std(self.amount))
        }
    }
}

impl PartialEq for ExpiryDuration {
    fn eq(&self, other: &Self) -> bool {
        self.as_secs() == other.as_secs()
    }
}

impl Eq for ExpiryDuration {}

impl Hash for ExpiryDuration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_secs().hash(state);
    }
}

impl fmt::Display for ExpiryDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.amount, self.unit)
    }
}
