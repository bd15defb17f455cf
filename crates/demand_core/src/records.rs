//! Trip log ingestion and indexed access.
//!
//! This module provides:
//!
//! - **TripRecord**: one typed, immutable row of the historical trip log
//! - **TripStore**: all loaded records plus eager by-hour and by-(city, hour)
//!   indices and the surge-by-hour lookup table
//! - **Load functions**: CSV parsing with row-level skip semantics
//!
//! A missing or headerless file is fatal; a malformed row never is. Rows that
//! cannot be typed are dropped with a debug log and the load continues.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use chrono::{NaiveDateTime, Timelike};
use thiserror::Error;
use tracing::{debug, info};

use crate::spatial;

/// Timestamp layout used by both trip logs.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A trip row must carry every column through payment type.
const MIN_TRIP_FIELDS: usize = 23;

/// Fatal ingestion failures. Everything after a successful load degrades
/// instead of erroring.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("{path} has no header row")]
    EmptyCsv { path: String },
}

/// One historical trip. Created once at load time, never mutated.
#[derive(Debug, Clone)]
pub struct TripRecord {
    pub ride_id: String,
    pub driver_id: String,
    pub rider_id: String,
    pub city_id: u32,
    pub product: String,
    pub vehicle_type: String,
    pub is_ev: bool,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub pickup_lat: f64,
    pub pickup_lon: f64,
    pub pickup_hex: String,
    pub drop_lat: f64,
    pub drop_lon: f64,
    pub drop_hex: String,
    pub distance_km: f64,
    pub duration_mins: u32,
    pub surge_multiplier: f64,
    pub fare_amount: f64,
    pub platform_fee: f64,
    pub net_earnings: f64,
    pub tips: f64,
    pub payment_type: String,
}

impl TripRecord {
    /// Net earnings per minute; `None` when the recorded duration is unusable.
    pub fn earnings_per_min(&self) -> Option<f64> {
        if self.duration_mins == 0 {
            None
        } else {
            Some(self.net_earnings / self.duration_mins as f64)
        }
    }

    /// Pickup coordinates, falling back to the hex cell center when the
    /// lat/lon columns parsed to the (0, 0) default.
    pub fn pickup_point(&self) -> Option<(f64, f64)> {
        point_or_hex(self.pickup_lat, self.pickup_lon, &self.pickup_hex)
    }

    /// Dropoff coordinates, with the same hex fallback as [`Self::pickup_point`].
    pub fn drop_point(&self) -> Option<(f64, f64)> {
        point_or_hex(self.drop_lat, self.drop_lon, &self.drop_hex)
    }
}

fn point_or_hex(lat: f64, lon: f64, hex: &str) -> Option<(f64, f64)> {
    if lat != 0.0 || lon != 0.0 {
        Some((lat, lon))
    } else {
        spatial::hex_center(hex)
    }
}

/// Composite key for surge and trip lookups: which city, which hour of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CityHourKey {
    pub city_id: u32,
    pub hour: u32,
}

impl CityHourKey {
    pub fn new(city_id: u32, hour: u32) -> Self {
        Self { city_id, hour }
    }
}

/// All loaded trips plus lookup indices, built once at load time.
///
/// The indices store positions into the record vector, so lookups are O(1)
/// average with no record duplication. The store is immutable after
/// construction and safe to share across threads.
#[derive(Debug, Default)]
pub struct TripStore {
    trips: Vec<TripRecord>,
    by_hour: HashMap<u32, Vec<usize>>,
    by_city_hour: HashMap<CityHourKey, Vec<usize>>,
    surge_by_city_hour: HashMap<CityHourKey, f64>,
}

impl TripStore {
    /// Build the store and its indices from already-parsed records.
    pub fn new(trips: Vec<TripRecord>, surge_by_city_hour: HashMap<CityHourKey, f64>) -> Self {
        let mut by_hour: HashMap<u32, Vec<usize>> = HashMap::new();
        let mut by_city_hour: HashMap<CityHourKey, Vec<usize>> = HashMap::new();
        for (idx, trip) in trips.iter().enumerate() {
            let hour = trip.start_time.hour();
            by_hour.entry(hour).or_default().push(idx);
            by_city_hour
                .entry(CityHourKey::new(trip.city_id, hour))
                .or_default()
                .push(idx);
        }
        Self {
            trips,
            by_hour,
            by_city_hour,
            surge_by_city_hour,
        }
    }

    /// Load the trip log and surge table from disk.
    pub fn load(trips_path: &Path, surge_path: &Path) -> Result<Self, LoadError> {
        let trips = parse_trip_log(trips_path)?;
        let surge = parse_surge_table(surge_path)?;
        Ok(Self::new(trips, surge))
    }

    pub fn all_trips(&self) -> &[TripRecord] {
        &self.trips
    }

    pub fn len(&self) -> usize {
        self.trips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }

    /// Every trip that started in the given hour of day, any city.
    pub fn trips_for_hour(&self, hour: u32) -> Vec<&TripRecord> {
        self.by_hour
            .get(&hour)
            .map(|idxs| idxs.iter().map(|&i| &self.trips[i]).collect())
            .unwrap_or_default()
    }

    /// Every trip that started in the given city and hour of day.
    pub fn trips_for_city_hour(&self, city_id: u32, hour: u32) -> Vec<&TripRecord> {
        self.by_city_hour
            .get(&CityHourKey::new(city_id, hour))
            .map(|idxs| idxs.iter().map(|&i| &self.trips[i]).collect())
            .unwrap_or_default()
    }

    /// Surge multiplier for a (city, hour) pair; 1.0 when the table has no entry.
    pub fn surge_for_city_hour(&self, city_id: u32, hour: u32) -> f64 {
        self.surge_by_city_hour
            .get(&CityHourKey::new(city_id, hour))
            .copied()
            .unwrap_or(1.0)
    }

    /// Mean surge across all cities for an hour of day; 1.0 when no city has
    /// an entry for that hour.
    pub fn average_surge_for_hour(&self, hour: u32) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;
        for (key, surge) in &self.surge_by_city_hour {
            if key.hour == hour {
                sum += surge;
                count += 1;
            }
        }
        if count == 0 {
            1.0
        } else {
            sum / count as f64
        }
    }
}

/// Parse a full trip log. The file must exist and carry a header row; beyond
/// that, malformed rows are skipped rather than failing the load.
pub fn parse_trip_log(path: &Path) -> Result<Vec<TripRecord>, LoadError> {
    let mut reader = open_csv(path)?;
    let mut trips = Vec::new();
    let mut skipped = 0usize;
    for row in reader.records() {
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                debug!(path = %path.display(), %err, "skipping unreadable trip row");
                skipped += 1;
                continue;
            }
        };
        match parse_trip_row(&row) {
            Some(trip) => trips.push(trip),
            None => {
                debug!(
                    path = %path.display(),
                    line = row.position().map(|p| p.line()).unwrap_or(0),
                    "skipping malformed trip row"
                );
                skipped += 1;
            }
        }
    }
    info!(
        path = %path.display(),
        records = trips.len(),
        skipped,
        "loaded trip log"
    );
    Ok(trips)
}

/// Parse the surge table: `(city_id, hour, surge)` rows.
pub fn parse_surge_table(path: &Path) -> Result<HashMap<CityHourKey, f64>, LoadError> {
    let mut reader = open_csv(path)?;
    let mut surge = HashMap::new();
    for row in reader.records() {
        let Ok(row) = row else { continue };
        let Some(entry) = parse_surge_row(&row) else {
            debug!(path = %path.display(), "skipping malformed surge row");
            continue;
        };
        surge.insert(entry.0, entry.1);
    }
    info!(path = %path.display(), entries = surge.len(), "loaded surge table");
    Ok(surge)
}

fn open_csv(path: &Path) -> Result<csv::Reader<File>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
    let headers = reader.headers().map_err(|source| LoadError::Csv {
        path: path.display().to_string(),
        source,
    })?;
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(LoadError::EmptyCsv {
            path: path.display().to_string(),
        });
    }
    Ok(reader)
}

fn parse_trip_row(row: &csv::StringRecord) -> Option<TripRecord> {
    if row.len() < MIN_TRIP_FIELDS {
        return None;
    }
    let field = |idx: usize| row.get(idx).unwrap_or("").trim();

    Some(TripRecord {
        ride_id: field(0).to_string(),
        driver_id: field(1).to_string(),
        rider_id: field(2).to_string(),
        city_id: field(3).parse().ok()?,
        product: field(4).to_string(),
        vehicle_type: field(5).to_string(),
        is_ev: field(6).eq_ignore_ascii_case("true"),
        start_time: NaiveDateTime::parse_from_str(field(7), DATE_TIME_FORMAT).ok()?,
        end_time: NaiveDateTime::parse_from_str(field(8), DATE_TIME_FORMAT).ok()?,
        pickup_lat: parse_f64_or_zero(field(9)),
        pickup_lon: parse_f64_or_zero(field(10)),
        pickup_hex: field(11).to_string(),
        drop_lat: parse_f64_or_zero(field(12)),
        drop_lon: parse_f64_or_zero(field(13)),
        drop_hex: field(14).to_string(),
        distance_km: parse_f64_or_zero(field(15)),
        duration_mins: field(16).parse().ok()?,
        surge_multiplier: parse_f64_or_zero(field(17)),
        fare_amount: parse_f64_or_zero(field(18)),
        platform_fee: parse_f64_or_zero(field(19)),
        net_earnings: parse_f64_or_zero(field(20)),
        tips: parse_f64_or_zero(field(21)),
        payment_type: field(22).to_string(),
    })
}

fn parse_surge_row(row: &csv::StringRecord) -> Option<(CityHourKey, f64)> {
    if row.len() < 3 {
        return None;
    }
    let city_id: u32 = row.get(0)?.trim().parse().ok()?;
    let hour: u32 = row.get(1)?.trim().parse().ok()?;
    if hour >= 24 {
        return None;
    }
    let surge = parse_f64_or_zero(row.get(2)?.trim());
    Some((CityHourKey::new(city_id, hour), surge))
}

/// Blank or unparseable numeric fields default to 0.0 rather than rejecting
/// the row.
fn parse_f64_or_zero(value: &str) -> f64 {
    if value.is_empty() {
        return 0.0;
    }
    value.parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{csv_row, sample_trip};

    fn record_from_line(line: &str) -> Option<TripRecord> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_reader(line.as_bytes());
        let row = reader.records().next().expect("one row").expect("readable");
        parse_trip_row(&row)
    }

    #[test]
    fn parses_a_complete_row() {
        let trip = sample_trip(3, "2024-03-04 09:15:00");
        let parsed = record_from_line(&csv_row(&trip)).expect("row should parse");
        assert_eq!(parsed.city_id, 3);
        assert_eq!(parsed.start_time.hour(), 9);
        assert_eq!(parsed.duration_mins, trip.duration_mins);
        assert!((parsed.net_earnings - trip.net_earnings).abs() < 1e-9);
    }

    #[test]
    fn rejects_short_rows() {
        assert!(record_from_line("r1,d1,u1,3").is_none());
    }

    fn fields_of(trip: &TripRecord) -> Vec<String> {
        csv_row(trip).split(',').map(str::to_string).collect()
    }

    #[test]
    fn rejects_bad_city_and_timestamp() {
        let trip = sample_trip(3, "2024-03-04 09:15:00");

        let mut fields = fields_of(&trip);
        fields[3] = "not-a-city".to_string();
        assert!(record_from_line(&fields.join(",")).is_none());

        let mut fields = fields_of(&trip);
        fields[7] = "yesterday-ish".to_string();
        assert!(record_from_line(&fields.join(",")).is_none());
    }

    #[test]
    fn blank_floats_default_to_zero() {
        let trip = sample_trip(3, "2024-03-04 09:15:00");
        let mut fields = fields_of(&trip);
        fields[21].clear(); // tips
        let parsed = record_from_line(&fields.join(",")).expect("row should parse");
        assert_eq!(parsed.tips, 0.0);
    }

    #[test]
    fn store_indexes_by_hour_and_city() {
        let trips = vec![
            sample_trip(1, "2024-03-04 09:00:00"),
            sample_trip(1, "2024-03-04 09:30:00"),
            sample_trip(2, "2024-03-04 18:00:00"),
        ];
        let store = TripStore::new(trips, HashMap::new());

        assert_eq!(store.trips_for_hour(9).len(), 2);
        assert_eq!(store.trips_for_hour(18).len(), 1);
        assert_eq!(store.trips_for_hour(3).len(), 0);
        assert_eq!(store.trips_for_city_hour(1, 9).len(), 2);
        assert_eq!(store.trips_for_city_hour(2, 9).len(), 0);
        assert_eq!(store.trips_for_city_hour(2, 18).len(), 1);
    }

    #[test]
    fn surge_defaults_to_one() {
        let mut surge = HashMap::new();
        surge.insert(CityHourKey::new(1, 9), 1.8);
        surge.insert(CityHourKey::new(2, 9), 1.2);
        let store = TripStore::new(Vec::new(), surge);

        assert!((store.surge_for_city_hour(1, 9) - 1.8).abs() < 1e-9);
        assert!((store.surge_for_city_hour(5, 9) - 1.0).abs() < 1e-9);
        assert!((store.average_surge_for_hour(9) - 1.5).abs() < 1e-9);
        assert!((store.average_surge_for_hour(3) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn earnings_per_min_guards_zero_duration() {
        let mut trip = sample_trip(1, "2024-03-04 09:00:00");
        trip.duration_mins = 0;
        assert!(trip.earnings_per_min().is_none());
        trip.duration_mins = 20;
        trip.net_earnings = 30.0;
        assert!((trip.earnings_per_min().unwrap() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn point_falls_back_to_hex_center() {
        let mut trip = sample_trip(1, "2024-03-04 09:00:00");
        trip.pickup_lat = 0.0;
        trip.pickup_lon = 0.0;
        trip.pickup_hex = "8a1fb46622dffff".to_string();
        let (lat, _lon) = trip.pickup_point().expect("hex center");
        assert!(lat.is_finite());

        trip.pickup_hex.clear();
        assert!(trip.pickup_point().is_none());
    }
}
