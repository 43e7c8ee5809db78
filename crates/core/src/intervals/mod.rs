//! Half-open time intervals and the ordered, coalesced interval set.
//!
//! Everything in the engine that talks about time does so through
//! [`Interval`]: a `[start, end)` range over UTC timestamps with
//! `start < end` enforced at construction. [`IntervalSet`] keeps a sorted,
//! disjoint, non-adjacent collection of intervals and is the backing
//! representation for per-entity coverage.
//!
//! Half-open ranges compose without off-by-one bookkeeping: `[a, b)` and
//! `[b, c)` are adjacent and coalesce into `[a, c)`, never overlapping and
//! never leaving an uncovered instant at `b`.

mod set;

pub use set::IntervalSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ValidationError;

/// Half-open time range `[start, end)`.
///
/// Construction through [`new`](Self::new) guarantees `start < end`, so a
/// value of this type is never empty and never inverted. Serialized form is
/// `{"start": ..., "end": ...}`; deserialization re-validates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "IntervalParts")]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Raw mirror of [`Interval`] used to validate deserialized data.
#[derive(Deserialize)]
struct IntervalParts {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<IntervalParts> for Interval {
    type Error = ValidationError;

    fn try_from(parts: IntervalParts) -> Result<Self, Self::Error> {
        Interval::new(parts.start, parts.end)
    }
}

impl Interval {
    /// Creates a validated interval; `start` must be strictly before `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(ValidationError::InvalidInterval {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            })
        }
    }

    /// Caller guarantees `start < end`.
    pub(crate) fn new_unchecked(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(start < end);
        Self { start, end }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Length of the interval. Always positive.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// True when the two intervals share at least one instant.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True when one interval ends exactly where the other starts.
    pub fn is_adjacent_to(&self, other: &Interval) -> bool {
        self.end == other.start || other.end == self.start
    }

    /// Overlapping or adjacent; such intervals always coalesce into one.
    pub fn touches(&self, other: &Interval) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// True when `instant` falls inside `[start, end)`.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// True when `other` lies entirely inside this interval.
    pub fn encloses(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// The shared sub-interval, if the two overlap.
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then(|| Interval { start, end })
    }

    /// Smallest interval containing both inputs.
    ///
    /// For non-touching inputs this also spans the hole between them.
    pub fn merge(&self, other: &Interval) -> Interval {
        Interval {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    fn iv(start_day: u32, end_day: u32) -> Interval {
        Interval::new(ts(start_day, 0), ts(end_day, 0)).unwrap()
    }

    #[test]
    fn test_new_rejects_empty_and_inverted() {
        assert!(Interval::new(ts(1, 0), ts(1, 0)).is_err());
        assert!(Interval::new(ts(2, 0), ts(1, 0)).is_err());
        assert!(Interval::new(ts(1, 0), ts(2, 0)).is_ok());
    }

    #[test]
    fn test_overlaps() {
        assert!(iv(1, 5).overlaps(&iv(4, 8)));
        assert!(iv(1, 5).overlaps(&iv(2, 3)));
        // Half-open: [1,5) and [5,8) share no instant.
        assert!(!iv(1, 5).overlaps(&iv(5, 8)));
        assert!(!iv(1, 2).overlaps(&iv(3, 4)));
    }

    #[test]
    fn test_adjacency_and_touches() {
        assert!(iv(1, 5).is_adjacent_to(&iv(5, 8)));
        assert!(iv(5, 8).is_adjacent_to(&iv(1, 5)));
        assert!(!iv(1, 5).is_adjacent_to(&iv(6, 8)));

        assert!(iv(1, 5).touches(&iv(5, 8)));
        assert!(iv(1, 5).touches(&iv(4, 8)));
        assert!(!iv(1, 5).touches(&iv(6, 8)));
    }

    #[test]
    fn test_contains_is_half_open() {
        let interval = iv(1, 5);
        assert!(interval.contains(ts(1, 0)));
        assert!(interval.contains(ts(4, 23)));
        assert!(!interval.contains(ts(5, 0)));
    }

    #[test]
    fn test_encloses() {
        assert!(iv(1, 10).encloses(&iv(3, 7)));
        assert!(iv(1, 10).encloses(&iv(1, 10)));
        assert!(!iv(1, 10).encloses(&iv(5, 11)));
    }

    #[test]
    fn test_intersect() {
        assert_eq!(iv(1, 5).intersect(&iv(3, 8)), Some(iv(3, 5)));
        assert_eq!(iv(1, 5).intersect(&iv(5, 8)), None);
        assert_eq!(iv(1, 10).intersect(&iv(3, 7)), Some(iv(3, 7)));
    }

    #[test]
    fn test_merge_spans_holes() {
        assert_eq!(iv(1, 3).merge(&iv(7, 9)), iv(1, 9));
        assert_eq!(iv(1, 5).merge(&iv(3, 8)), iv(1, 8));
    }

    #[test]
    fn test_duration() {
        assert_eq!(iv(1, 3).duration(), Duration::days(2));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            iv(1, 2).to_string(),
            "[2025-03-01T00:00:00Z, 2025-03-02T00:00:00Z)"
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let interval = iv(1, 5);
        let json = serde_json::to_string(&interval).unwrap();
        let back: Interval = serde_json::from_str(&json).unwrap();
        assert_eq!(interval, back);
    }

    #[test]
    fn test_serde_rejects_inverted() {
        let json = r#"{"start":"2025-03-05T00:00:00Z","end":"2025-03-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<Interval>(json).is_err());
    }
}
