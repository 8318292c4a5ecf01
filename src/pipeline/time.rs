//! Animation time and validity intervals.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Animation time in integer ticks.
pub type TimePoint = i32;

pub const TIME_NEGATIVE_INFINITY: TimePoint = TimePoint::MIN;
pub const TIME_POSITIVE_INFINITY: TimePoint = TimePoint::MAX;

/// Half-open interval `[start, end)` of animation times.
///
/// An end of [`TIME_POSITIVE_INFINITY`] is unbounded and contains every time
/// from `start` on, including the infinity itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeInterval {
    start: TimePoint,
    end: TimePoint,
}

impl TimeInterval {
    pub const fn new(start: TimePoint, end: TimePoint) -> Self {
        Self { start, end }
    }

    /// Valid at every time.
    pub const fn infinite() -> Self {
        Self::new(TIME_NEGATIVE_INFINITY, TIME_POSITIVE_INFINITY)
    }

    /// Valid at no time.
    pub const fn empty() -> Self {
        Self::new(0, 0)
    }

    /// Valid only at `time`.
    pub fn instant(time: TimePoint) -> Self {
        Self::new(time, time.saturating_add(1))
    }

    pub fn start(&self) -> TimePoint {
        self.start
    }

    pub fn end(&self) -> TimePoint {
        self.end
    }

    pub fn is_infinite(&self) -> bool {
        self.start == TIME_NEGATIVE_INFINITY && self.end == TIME_POSITIVE_INFINITY
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start && self.end != TIME_POSITIVE_INFINITY
    }

    pub fn contains(&self, time: TimePoint) -> bool {
        time >= self.start && (time < self.end || self.end == TIME_POSITIVE_INFINITY)
    }

    /// The times contained in both intervals.
    pub fn intersect(&self, other: &TimeInterval) -> TimeInterval {
        let result = Self::new(self.start.max(other.start), self.end.min(other.end));
        if result.is_empty() {
            Self::empty()
        } else {
            result
        }
    }

    /// Intersection of any number of intervals; infinite for none.
    pub fn intersect_all<'a>(intervals: impl IntoIterator<Item = &'a TimeInterval>) -> TimeInterval {
        intervals
            .into_iter()
            .fold(Self::infinite(), |acc, iv| acc.intersect(iv))
    }
}

impl Default for TimeInterval {
    fn default() -> Self {
        Self::infinite()
    }
}

fn fmt_time(time: TimePoint, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match time {
        TIME_NEGATIVE_INFINITY => write!(f, "-inf"),
        TIME_POSITIVE_INFINITY => write!(f, "+inf"),
        t => write!(f, "{t}"),
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "[empty]");
        }
        write!(f, "[")?;
        fmt_time(self.start, f)?;
        write!(f, ", ")?;
        fmt_time(self.end, f)?;
        write!(f, ")")
    }
}
