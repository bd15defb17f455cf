//! Normalized demand signals derived from the trip logs.
//!
//! The loader aggregates parsed trip records into three views, all built once
//! at load time:
//!
//! - whole-dataset zone signals per (category, bucket)
//! - per-city zone counts for city-filtered signals
//! - per-(city, weekday) hourly counts for single-scalar lookups
//!
//! Every signal is min-max normalized within its own group: the busiest key
//! of a group reads exactly 1.0, an empty group reads 0.0 throughout. Values
//! for different cities are therefore not comparable to each other.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use tracing::warn;

use crate::bucket::DemandBucket;
use crate::records::TripRecord;
use crate::spatial::{self, ZONES};

/// The two demand categories carried by the signal pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalCategory {
    Rides,
    Eats,
}

/// Zone -> normalized signal. Every canonical zone is always present.
pub type ZoneSignal = BTreeMap<String, f64>;

/// Aggregated signals for both categories.
#[derive(Debug, Default)]
pub struct SignalLoader {
    rides: CategorySignals,
    eats: CategorySignals,
}

impl SignalLoader {
    /// Aggregate both trip logs. An absent eats log is represented by an
    /// empty slice and yields all-zero eats signals.
    pub fn from_records(rides: &[TripRecord], eats: &[TripRecord]) -> Self {
        Self {
            rides: CategorySignals::from_records(rides, "rides"),
            eats: CategorySignals::from_records(eats, "eats"),
        }
    }

    /// The canonical zone set, in reporting order.
    pub fn zones(&self) -> &'static [&'static str] {
        &ZONES
    }

    /// Whole-dataset signal for one category and bucket.
    pub fn zone_signal(&self, category: SignalCategory, bucket: DemandBucket) -> ZoneSignal {
        self.category(category).bucket_signal(bucket)
    }

    /// City-filtered signal, normalized within that city's own bucket counts.
    pub fn zone_signal_for_city(
        &self,
        category: SignalCategory,
        bucket: DemandBucket,
        city_id: u32,
    ) -> ZoneSignal {
        self.category(category).city_signal(bucket, city_id)
    }

    pub fn rides_for(&self, bucket: DemandBucket) -> ZoneSignal {
        self.zone_signal(SignalCategory::Rides, bucket)
    }

    pub fn eats_for(&self, bucket: DemandBucket) -> ZoneSignal {
        self.zone_signal(SignalCategory::Eats, bucket)
    }

    pub fn rides_for_city(&self, bucket: DemandBucket, city_id: u32) -> ZoneSignal {
        self.zone_signal_for_city(SignalCategory::Rides, bucket, city_id)
    }

    pub fn eats_for_city(&self, bucket: DemandBucket, city_id: u32) -> ZoneSignal {
        self.zone_signal_for_city(SignalCategory::Eats, bucket, city_id)
    }

    /// Scalar activity signal for one city at one hour-of-week, normalized
    /// against the busiest of the 24 hours of the same weekday for that city.
    pub fn signal_for_city_at(
        &self,
        category: SignalCategory,
        at: NaiveDateTime,
        city_id: u32,
    ) -> f64 {
        self.category(category).scalar_at(at, city_id)
    }

    pub fn rides_signal_for_city_at(&self, at: NaiveDateTime, city_id: u32) -> f64 {
        self.signal_for_city_at(SignalCategory::Rides, at, city_id)
    }

    pub fn eats_signal_for_city_at(&self, at: NaiveDateTime, city_id: u32) -> f64 {
        self.signal_for_city_at(SignalCategory::Eats, at, city_id)
    }

    /// Sorted positive city ids seen in either log.
    pub fn available_city_ids(&self) -> Vec<u32> {
        self.rides
            .city_ids
            .union(&self.eats.city_ids)
            .copied()
            .collect()
    }

    /// Zone for a hex grid key; pure and idempotent.
    pub fn zone_for_hex(&self, key: &str) -> Option<&'static str> {
        spatial::zone_for_hex(key)
    }

    fn category(&self, category: SignalCategory) -> &CategorySignals {
        match category {
            SignalCategory::Rides => &self.rides,
            SignalCategory::Eats => &self.eats,
        }
    }
}

/// Pre-aggregated counts and signals for one category.
#[derive(Debug, Default)]
struct CategorySignals {
    by_bucket: HashMap<DemandBucket, ZoneSignal>,
    city_bucket_counts: HashMap<(u32, DemandBucket), HashMap<&'static str, u32>>,
    city_weekday_hours: HashMap<(u32, Weekday), [u32; 24]>,
    city_ids: BTreeSet<u32>,
}

impl CategorySignals {
    fn from_records(records: &[TripRecord], label: &str) -> Self {
        let mut bucket_counts: HashMap<DemandBucket, HashMap<&'static str, u32>> = HashMap::new();
        let mut out = CategorySignals::default();
        let mut usable = 0usize;

        for trip in records {
            let start = trip.start_time;
            let bucket = DemandBucket::from_datetime(start);

            if trip.city_id > 0 {
                out.city_ids.insert(trip.city_id);
                let hours = out
                    .city_weekday_hours
                    .entry((trip.city_id, start.weekday()))
                    .or_insert([0u32; 24]);
                hours[start.hour() as usize] += 1;
            }

            // Prefer the fine-grained hex key; fall back to the city cycle.
            let zone = spatial::zone_for_hex(&trip.pickup_hex)
                .or_else(|| spatial::zone_for_city(trip.city_id));
            let Some(zone) = zone else { continue };
            usable += 1;

            *bucket_counts.entry(bucket).or_default().entry(zone).or_insert(0) += 1;
            if trip.city_id > 0 {
                *out.city_bucket_counts
                    .entry((trip.city_id, bucket))
                    .or_default()
                    .entry(zone)
                    .or_insert(0) += 1;
            }
        }

        if usable == 0 && !records.is_empty() {
            warn!(category = label, "no trip rows produced a usable zone signal");
        }

        for bucket in DemandBucket::ALL {
            let counts = bucket_counts.remove(&bucket).unwrap_or_default();
            out.by_bucket.insert(bucket, normalize_counts(&counts));
        }
        out
    }

    fn bucket_signal(&self, bucket: DemandBucket) -> ZoneSignal {
        self.by_bucket
            .get(&bucket)
            .cloned()
            .unwrap_or_else(|| normalize_counts(&HashMap::new()))
    }

    fn city_signal(&self, bucket: DemandBucket, city_id: u32) -> ZoneSignal {
        let counts = self
            .city_bucket_counts
            .get(&(city_id, bucket))
            .cloned()
            .unwrap_or_default();
        normalize_counts(&counts)
    }

    fn scalar_at(&self, at: NaiveDateTime, city_id: u32) -> f64 {
        let Some(hours) = self.city_weekday_hours.get(&(city_id, at.weekday())) else {
            return 0.0;
        };
        let max = hours.iter().copied().max().unwrap_or(0);
        if max == 0 {
            return 0.0;
        }
        round2(hours[at.hour() as usize] as f64 / max as f64)
    }
}

/// Min-max normalize zone counts. The busiest zone maps to exactly 1.0; an
/// empty group maps every zone to 0.0.
fn normalize_counts(counts: &HashMap<&'static str, u32>) -> ZoneSignal {
    let max = counts.values().copied().max().unwrap_or(0);
    ZONES
        .iter()
        .map(|zone| {
            let count = counts.get(zone).copied().unwrap_or(0);
            let signal = if max == 0 {
                0.0
            } else {
                round2(count as f64 / max as f64)
            };
            (zone.to_string(), signal)
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
