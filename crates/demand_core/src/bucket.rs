//! Time-of-day demand buckets.
//!
//! Demand signals are grouped into three coarse day segments. The boundaries
//! are fixed: [6, 12) is morning, [16, 22) is evening, everything else
//! (including the midday gap) counts as night.

use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;

/// Coarse time-of-day segment used to group demand signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DemandBucket {
    Morning,
    Evening,
    Night,
}

impl DemandBucket {
    /// All buckets, in cyclic order.
    pub const ALL: [DemandBucket; 3] = [
        DemandBucket::Morning,
        DemandBucket::Evening,
        DemandBucket::Night,
    ];

    /// Bucket for an hour of day (0-23).
    pub fn from_hour(hour: u32) -> Self {
        if (6..12).contains(&hour) {
            DemandBucket::Morning
        } else if (16..22).contains(&hour) {
            DemandBucket::Evening
        } else {
            DemandBucket::Night
        }
    }

    /// Bucket for a timestamp's local hour.
    pub fn from_datetime(at: NaiveDateTime) -> Self {
        Self::from_hour(at.hour())
    }

    /// Cyclic successor: morning -> evening -> night -> morning.
    pub fn next(self) -> Self {
        match self {
            DemandBucket::Morning => DemandBucket::Evening,
            DemandBucket::Evening => DemandBucket::Night,
            DemandBucket::Night => DemandBucket::Morning,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DemandBucket::Morning => "morning",
            DemandBucket::Evening => "evening",
            DemandBucket::Night => "night",
        }
    }

    /// Midpoint hour used when a query names a bucket without a concrete time.
    pub fn representative_hour(self) -> u32 {
        match self {
            DemandBucket::Morning => 9,
            DemandBucket::Evening => 18,
            DemandBucket::Night => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_boundaries() {
        assert_eq!(DemandBucket::from_hour(5), DemandBucket::Night);
        assert_eq!(DemandBucket::from_hour(6), DemandBucket::Morning);
        assert_eq!(DemandBucket::from_hour(11), DemandBucket::Morning);
        // The midday gap falls through to night.
        assert_eq!(DemandBucket::from_hour(12), DemandBucket::Night);
        assert_eq!(DemandBucket::from_hour(15), DemandBucket::Night);
        assert_eq!(DemandBucket::from_hour(16), DemandBucket::Evening);
        assert_eq!(DemandBucket::from_hour(21), DemandBucket::Evening);
        assert_eq!(DemandBucket::from_hour(22), DemandBucket::Night);
        assert_eq!(DemandBucket::from_hour(0), DemandBucket::Night);
    }

    #[test]
    fn next_is_cyclic() {
        assert_eq!(DemandBucket::Morning.next(), DemandBucket::Evening);
        assert_eq!(DemandBucket::Evening.next(), DemandBucket::Night);
        assert_eq!(DemandBucket::Night.next(), DemandBucket::Morning);
    }

    #[test]
    fn representative_hours_land_in_their_bucket() {
        for bucket in DemandBucket::ALL {
            assert_eq!(DemandBucket::from_hour(bucket.representative_hour()), bucket);
        }
    }
}
