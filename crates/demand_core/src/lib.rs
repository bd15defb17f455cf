//! Historical trip analytics for drivers: where demand is right now, and
//! whether a specific incoming offer is worth taking.
//!
//! The crate ingests batch trip logs (rides and optionally food deliveries)
//! plus a surge table, builds immutable in-memory indices once, and exposes
//! two query surfaces:
//!
//! - [`DemandService`]: per-zone (or per-city) demand heat for a time window
//! - [`TripAnalyzer`]: a 0-10 profitability score for a candidate offer
//!
//! Everything after a successful load is infallible and safe for concurrent
//! readers; degraded inputs produce degraded-but-valid results.
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::Path;
//! use demand_core::{Dataset, TripOffer, UserCategory};
//!
//! let dataset = Dataset::load(
//!     Path::new("data/rides_trips.csv"),
//!     Some(Path::new("data/eats_orders.csv")),
//!     Path::new("data/surge_by_hour.csv"),
//! )?;
//!
//! let heat = dataset.demand_service().current_demand(UserCategory::Rider, None);
//! println!("{} zones reported for '{}'", heat.zones.len(), heat.window);
//!
//! let offer = TripOffer {
//!     total_earnings: 21.50,
//!     estimated_duration_mins: 18,
//!     distance_miles: 7.2,
//!     ..TripOffer::default()
//! };
//! let advice = dataset.trip_analyzer().analyze(&offer);
//! println!("{advice}");
//! # Ok::<(), demand_core::LoadError>(())
//! ```

pub mod bucket;
pub mod calculator;
pub mod demand;
pub mod hex;
pub mod profitability;
pub mod records;
pub mod signals;
pub mod spatial;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

use std::path::Path;

pub use bucket::DemandBucket;
pub use calculator::{calculate_demand, DemandInputs, DemandLevel, UserCategory, ZoneDemand};
pub use demand::{DemandResponse, DemandService, DriverDemand};
pub use hex::HexAggregator;
pub use profitability::{
    HistoricalAnalysis, SurgeOutlookConfig, TripAdvice, TripAnalyzer, TripOffer,
};
pub use records::{CityHourKey, LoadError, TripRecord, TripStore};
pub use signals::{SignalCategory, SignalLoader, ZoneSignal};

/// The fully-loaded dataset: every CSV parsed exactly once, all indices
/// built, both query services ready.
#[derive(Debug)]
pub struct Dataset {
    demand: DemandService,
    analyzer: TripAnalyzer,
}

impl Dataset {
    /// Load the trip logs and surge table from disk.
    ///
    /// A missing rides log, surge table, or header row is fatal. The eats log
    /// is optional; `None` yields all-zero eats signals.
    pub fn load(
        rides_path: &Path,
        eats_path: Option<&Path>,
        surge_path: &Path,
    ) -> Result<Self, LoadError> {
        let rides = records::parse_trip_log(rides_path)?;
        let eats = match eats_path {
            Some(path) => records::parse_trip_log(path)?,
            None => Vec::new(),
        };
        let surge = records::parse_surge_table(surge_path)?;

        let signals = SignalLoader::from_records(&rides, &eats);
        let hex = HexAggregator::from_records(&rides, &eats);
        let store = TripStore::new(rides, surge);

        Ok(Self {
            demand: DemandService::new(signals, hex),
            analyzer: TripAnalyzer::new(store),
        })
    }

    pub fn demand_service(&self) -> &DemandService {
        &self.demand
    }

    pub fn trip_analyzer(&self) -> &TripAnalyzer {
        &self.analyzer
    }
}
