//! Hex-level aggregation: fold fine-grained hex activity into zone signals.
//!
//! This is the alternative path to the loader's direct zone mapping. Each hex
//! key's activity is normalized against the busiest key in the slice, then
//! keys are folded into zones as an activity-weighted average, so a zone
//! dominated by one busy hex reads close to that hex's signal instead of
//! being diluted by quiet neighbors.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::bucket::DemandBucket;
use crate::records::TripRecord;
use crate::signals::{SignalCategory, SignalLoader, ZoneSignal};
use crate::spatial::{zone_for_hex, ZONES};

/// One hex-keyed activity row, projected from a trip record at load time.
#[derive(Debug, Clone)]
struct HexActivity {
    bucket: DemandBucket,
    city_id: u32,
    hex: String,
}

type SliceKey = (SignalCategory, DemandBucket, Option<u32>);

/// Aggregates hex activity into zone signals, memoizing per slice.
pub struct HexAggregator {
    rides: Vec<HexActivity>,
    eats: Vec<HexActivity>,
    cache: Mutex<LruCache<SliceKey, ZoneSignal>>,
}

impl std::fmt::Debug for HexAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HexAggregator")
            .field("rides_rows", &self.rides.len())
            .field("eats_rows", &self.eats.len())
            .finish_non_exhaustive()
    }
}

impl HexAggregator {
    /// Project the hex-keyed rows out of both trip logs.
    pub fn from_records(rides: &[TripRecord], eats: &[TripRecord]) -> Self {
        Self {
            rides: project(rides),
            eats: project(eats),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(64).expect("cache size must be non-zero"),
            )),
        }
    }

    /// Zone signal for a (category, bucket) slice, optionally filtered to one
    /// city. Falls back to the loader's direct per-zone output when the slice
    /// has no hex-keyed activity.
    pub fn zone_signal(
        &self,
        category: SignalCategory,
        bucket: DemandBucket,
        city_id: Option<u32>,
        loader: &SignalLoader,
    ) -> ZoneSignal {
        let key = (category, bucket, city_id);
        let mut cache = match self.cache.lock() {
            Ok(guard) => guard,
            // Fallback: compute without cache if mutex poisoned
            Err(_) => return self.compute_or_fallback(category, bucket, city_id, loader),
        };
        if let Some(cached) = cache.get(&key) {
            return cached.clone();
        }
        let signal = self.compute_or_fallback(category, bucket, city_id, loader);
        cache.put(key, signal.clone());
        signal
    }

    fn compute_or_fallback(
        &self,
        category: SignalCategory,
        bucket: DemandBucket,
        city_id: Option<u32>,
        loader: &SignalLoader,
    ) -> ZoneSignal {
        match self.compute(category, bucket, city_id) {
            Some(signal) => signal,
            None => match city_id {
                Some(city) => loader.zone_signal_for_city(category, bucket, city),
                None => loader.zone_signal(category, bucket),
            },
        }
    }

    /// Weighted aggregation over the slice's hex counts. `None` when the
    /// slice has no hex activity at all.
    fn compute(
        &self,
        category: SignalCategory,
        bucket: DemandBucket,
        city_id: Option<u32>,
    ) -> Option<ZoneSignal> {
        let rows = match category {
            SignalCategory::Rides => &self.rides,
            SignalCategory::Eats => &self.eats,
        };

        let mut counts: HashMap<&str, u32> = HashMap::new();
        for row in rows {
            if row.bucket != bucket {
                continue;
            }
            if let Some(city) = city_id {
                if row.city_id != city {
                    continue;
                }
            }
            *counts.entry(row.hex.as_str()).or_insert(0) += 1;
        }
        if counts.is_empty() {
            return None;
        }

        let max = counts.values().copied().max().unwrap_or(0) as f64;
        let mut zone_sum: HashMap<&'static str, f64> = HashMap::new();
        let mut zone_weight: HashMap<&'static str, u32> = HashMap::new();
        for (hex, &count) in &counts {
            let Some(zone) = zone_for_hex(hex) else { continue };
            let norm = round2(count as f64 / max);
            *zone_sum.entry(zone).or_insert(0.0) += norm * count as f64;
            *zone_weight.entry(zone).or_insert(0) += count;
        }

        let signal = ZONES
            .iter()
            .map(|zone| {
                let weight = zone_weight.get(zone).copied().unwrap_or(0);
                let value = if weight == 0 {
                    0.0
                } else {
                    round2(zone_sum.get(zone).copied().unwrap_or(0.0) / weight as f64)
                };
                (zone.to_string(), value)
            })
            .collect();
        Some(signal)
    }
}

fn project(records: &[TripRecord]) -> Vec<HexActivity> {
    records
        .iter()
        .filter(|trip| !trip.pickup_hex.trim().is_empty())
        .map(|trip| HexActivity {
            bucket: DemandBucket::from_datetime(trip.start_time),
            city_id: trip.city_id,
            hex: trip.pickup_hex.trim().to_string(),
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{sample_trip, trip_with_hex};

    #[test]
    fn weighted_average_folds_hexes_into_zones() {
        // Two hexes both in zone A ('0' and 'f' both mod to 0), one in zone B.
        let trips = vec![
            trip_with_hex(1, "2024-03-04 09:00:00", "8a1fb4660"),
            trip_with_hex(1, "2024-03-04 09:05:00", "8a1fb4660"),
            trip_with_hex(1, "2024-03-04 09:10:00", "8a1fb4660"),
            trip_with_hex(1, "2024-03-04 09:15:00", "8a1fb466f"),
            trip_with_hex(1, "2024-03-04 09:20:00", "8a1fb4661"),
        ];
        let loader = SignalLoader::from_records(&trips, &[]);
        let agg = HexAggregator::from_records(&trips, &[]);
        let morning = agg.zone_signal(SignalCategory::Rides, DemandBucket::Morning, None, &loader);

        // Hex counts: "…0" = 3 (norm 1.0), "…f" = 1 (norm 0.33), "…1" = 1 (norm 0.33).
        // Zone A = (1.0*3 + 0.33*1) / 4 = 0.8325 -> 0.83; zone B = 0.33.
        assert_eq!(morning["A"], 0.83);
        assert_eq!(morning["B"], 0.33);
        assert_eq!(morning["C"], 0.0);
    }

    #[test]
    fn falls_back_to_loader_without_hex_data() {
        // Records carry no hex keys; the aggregator must hand back the
        // loader's direct city-mapped signal.
        let trips = vec![sample_trip(1, "2024-03-04 09:00:00")];
        let loader = SignalLoader::from_records(&trips, &[]);
        let agg = HexAggregator::from_records(&trips, &[]);
        let morning = agg.zone_signal(SignalCategory::Rides, DemandBucket::Morning, None, &loader);
        assert_eq!(morning, loader.rides_for(DemandBucket::Morning));
    }

    #[test]
    fn city_filter_restricts_the_slice() {
        let trips = vec![
            trip_with_hex(1, "2024-03-04 09:00:00", "8a1fb4660"),
            trip_with_hex(2, "2024-03-04 09:00:00", "8a1fb4661"),
        ];
        let loader = SignalLoader::from_records(&trips, &[]);
        let agg = HexAggregator::from_records(&trips, &[]);
        let city1 =
            agg.zone_signal(SignalCategory::Rides, DemandBucket::Morning, Some(1), &loader);
        assert_eq!(city1["A"], 1.0);
        assert_eq!(city1["B"], 0.0);
    }

    #[test]
    fn repeated_calls_hit_the_cache() {
        let trips = vec![trip_with_hex(1, "2024-03-04 09:00:00", "8a1fb4660")];
        let loader = SignalLoader::from_records(&trips, &[]);
        let agg = HexAggregator::from_records(&trips, &[]);
        let first = agg.zone_signal(SignalCategory::Rides, DemandBucket::Morning, None, &loader);
        let second = agg.zone_signal(SignalCategory::Rides, DemandBucket::Morning, None, &loader);
        assert_eq!(first, second);
    }
}
