//! Demand orchestration: window selection, aggregation mode, response assembly.
//!
//! The service decides which time bucket applies ("now", two hours ahead, or
//! an explicit datetime) and which aggregation mode to use: a single
//! self-normalized scalar when the caller asks about one city, or the full
//! per-zone maps otherwise. Zone mode prefers the hex-weighted aggregation
//! and degrades to the loader's direct signals when no hex data exists.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Local, NaiveDateTime, Timelike, Utc};
use serde::Serialize;

use crate::bucket::DemandBucket;
use crate::calculator::{calculate_demand, DemandInputs, DemandLevel, UserCategory, ZoneDemand};
use crate::hex::HexAggregator;
use crate::signals::{SignalCategory, SignalLoader};

/// Driver-facing action for a demand level.
fn action_for(level: DemandLevel) -> &'static str {
    match level {
        DemandLevel::High => "go now",
        DemandLevel::Med => "stay ready",
        DemandLevel::Low => "rest",
    }
}

/// One zone (or city) entry of a demand response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverDemand {
    pub score: f64,
    pub level: DemandLevel,
    pub action: &'static str,
}

impl DriverDemand {
    fn from_zone(category: UserCategory, demand: &ZoneDemand) -> Self {
        let (score, level) = if category.prefers_eats() {
            (demand.eats_score, demand.eats_level)
        } else {
            (demand.rides_score, demand.rides_level)
        };
        Self {
            score,
            level,
            action: action_for(level),
        }
    }

    fn resting() -> Self {
        Self {
            score: 0.0,
            level: DemandLevel::Low,
            action: action_for(DemandLevel::Low),
        }
    }
}

/// Assembled demand report for one window.
#[derive(Debug, Clone, Serialize)]
pub struct DemandResponse {
    pub generated_at: DateTime<Utc>,
    pub window: String,
    pub category: UserCategory,
    pub zones: BTreeMap<String, DriverDemand>,
}

/// Stateless demand query service over the loaded dataset.
#[derive(Debug)]
pub struct DemandService {
    signals: SignalLoader,
    hex: HexAggregator,
}

impl DemandService {
    pub fn new(signals: SignalLoader, hex: HexAggregator) -> Self {
        Self { signals, hex }
    }

    pub fn signals(&self) -> &SignalLoader {
        &self.signals
    }

    /// Demand for the present moment.
    pub fn current_demand(&self, category: UserCategory, city_id: Option<u32>) -> DemandResponse {
        let now = Local::now().naive_local();
        self.build(DemandBucket::from_datetime(now), "now", category, city_id, now, false)
    }

    /// Demand two hours from now (the bucket two hours ahead).
    pub fn next_2_hours_demand(
        &self,
        category: UserCategory,
        city_id: Option<u32>,
    ) -> DemandResponse {
        let future = Local::now().naive_local() + Duration::hours(2);
        self.build(
            DemandBucket::from_datetime(future),
            "next2h",
            category,
            city_id,
            future,
            false,
        )
    }

    /// Demand at an explicit datetime.
    pub fn demand_at(
        &self,
        category: UserCategory,
        city_id: Option<u32>,
        at: NaiveDateTime,
    ) -> DemandResponse {
        self.build(DemandBucket::from_datetime(at), "at", category, city_id, at, true)
    }

    /// Demand for a named bucket, whole-city zones only.
    pub fn demand_for_bucket(&self, bucket: DemandBucket, category: UserCategory) -> DemandResponse {
        let now = Local::now().naive_local();
        self.build(bucket, bucket.label(), category, None, now, false)
    }

    pub fn available_city_ids(&self) -> Vec<u32> {
        self.signals.available_city_ids()
    }

    fn build(
        &self,
        bucket: DemandBucket,
        window: &str,
        category: UserCategory,
        city_id: Option<u32>,
        at: NaiveDateTime,
        exact_hour: bool,
    ) -> DemandResponse {
        let zones = match city_id.filter(|&c| c > 0) {
            Some(city) => self.city_demand(bucket, category, city, at, exact_hour),
            None => self.zone_demand(bucket, category),
        };
        DemandResponse {
            generated_at: Utc::now(),
            window: window.to_string(),
            category,
            zones,
        }
    }

    /// Single-city mode: one self-normalized scalar per category, keyed by
    /// the city id string.
    fn city_demand(
        &self,
        bucket: DemandBucket,
        category: UserCategory,
        city_id: u32,
        at: NaiveDateTime,
        exact_hour: bool,
    ) -> BTreeMap<String, DriverDemand> {
        // Bucket-only windows probe at the bucket's midpoint hour; explicit
        // datetimes probe at their own hour.
        let probe = if exact_hour {
            at
        } else {
            at.with_hour(bucket.representative_hour()).unwrap_or(at)
        };
        let rides = self.signals.rides_signal_for_city_at(probe, city_id);
        let eats = self.signals.eats_signal_for_city_at(probe, city_id);

        let key = city_id.to_string();
        let inputs = DemandInputs {
            rides: Some(HashMap::from([(key.clone(), rides)])),
            eats: Some(HashMap::from([(key.clone(), eats)])),
            ..DemandInputs::default()
        };
        let calculations = calculate_demand(&inputs, category);

        let mut out = BTreeMap::new();
        match calculations.get(&key) {
            Some(demand) => out.insert(key, DriverDemand::from_zone(category, demand)),
            None => out.insert(key, DriverDemand::resting()),
        };
        out
    }

    /// Whole-city mode: per-zone signals, hex-weighted when available.
    fn zone_demand(
        &self,
        bucket: DemandBucket,
        category: UserCategory,
    ) -> BTreeMap<String, DriverDemand> {
        let rides = self
            .hex
            .zone_signal(SignalCategory::Rides, bucket, None, &self.signals);
        let eats = self
            .hex
            .zone_signal(SignalCategory::Eats, bucket, None, &self.signals);

        let inputs = DemandInputs {
            rides: Some(rides.into_iter().collect()),
            eats: Some(eats.into_iter().collect()),
            ..DemandInputs::default()
        };
        let calculations = calculate_demand(&inputs, category);

        self.signals
            .zones()
            .iter()
            .map(|zone| {
                let entry = calculations
                    .get(*zone)
                    .map(|demand| DriverDemand::from_zone(category, demand))
                    .unwrap_or_else(DriverDemand::resting);
                (zone.to_string(), entry)
            })
            .collect()
    }
}
