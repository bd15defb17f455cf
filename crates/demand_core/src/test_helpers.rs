//! Shared fixture builders for tests.
//!
//! Builders produce fully-populated [`TripRecord`]s with sensible defaults so
//! individual tests only set the fields they care about, plus helpers to
//! render records back into trip-log CSV for integration tests.

use chrono::NaiveDateTime;

use crate::records::{TripRecord, DATE_TIME_FORMAT};

/// Header row matching the trip-log column order.
pub const TRIP_CSV_HEADER: &str = "ride_id,driver_id,rider_id,city_id,product,vehicle_type,is_ev,\
start_time,end_time,pickup_lat,pickup_lon,pickup_hex_id9,drop_lat,drop_lon,drop_hex_id9,\
distance_km,duration_mins,surge_multiplier,fare_amount,platform_fee,net_earnings,tips,payment_type";

/// Header row for the surge table.
pub const SURGE_CSV_HEADER: &str = "city_id,hour,surge_multiplier";

/// Parse a `yyyy-MM-dd HH:mm:ss` timestamp, panicking on bad test input.
pub fn parse_dt(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, DATE_TIME_FORMAT).expect("valid test timestamp")
}

/// A complete trip record with plain defaults: no hex keys, Berlin-ish
/// coordinates, 20 minutes, $15 net.
pub fn sample_trip(city_id: u32, start: &str) -> TripRecord {
    let start_time = parse_dt(start);
    TripRecord {
        ride_id: format!("r-{city_id}-{}", start_time.and_utc().timestamp()),
        driver_id: "d-1".to_string(),
        rider_id: "u-1".to_string(),
        city_id,
        product: "standard".to_string(),
        vehicle_type: "sedan".to_string(),
        is_ev: false,
        start_time,
        end_time: start_time + chrono::Duration::minutes(20),
        pickup_lat: 52.52,
        pickup_lon: 13.40,
        pickup_hex: String::new(),
        drop_lat: 52.53,
        drop_lon: 13.41,
        drop_hex: String::new(),
        distance_km: 6.0,
        duration_mins: 20,
        surge_multiplier: 1.0,
        fare_amount: 18.5,
        platform_fee: 3.5,
        net_earnings: 15.0,
        tips: 0.0,
        payment_type: "card".to_string(),
    }
}

/// A trip whose zone comes from its pickup hex key.
pub fn trip_with_hex(city_id: u32, start: &str, hex: &str) -> TripRecord {
    let mut trip = sample_trip(city_id, start);
    trip.pickup_hex = hex.to_string();
    trip
}

/// A trip with explicit net earnings and duration, for rate-sensitive tests.
pub fn earning_trip(city_id: u32, start: &str, net_earnings: f64, duration_mins: u32) -> TripRecord {
    let mut trip = sample_trip(city_id, start);
    trip.net_earnings = net_earnings;
    trip.duration_mins = duration_mins;
    trip.end_time = trip.start_time + chrono::Duration::minutes(duration_mins as i64);
    trip
}

/// Render a record as one trip-log CSV line (no trailing newline).
pub fn csv_row(trip: &TripRecord) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
        trip.ride_id,
        trip.driver_id,
        trip.rider_id,
        trip.city_id,
        trip.product,
        trip.vehicle_type,
        trip.is_ev,
        trip.start_time.format(DATE_TIME_FORMAT),
        trip.end_time.format(DATE_TIME_FORMAT),
        trip.pickup_lat,
        trip.pickup_lon,
        trip.pickup_hex,
        trip.drop_lat,
        trip.drop_lon,
        trip.drop_hex,
        trip.distance_km,
        trip.duration_mins,
        trip.surge_multiplier,
        trip.fare_amount,
        trip.platform_fee,
        trip.net_earnings,
        trip.tips,
        trip.payment_type,
    )
}

/// Render a full trip log: header plus one line per record.
pub fn trip_log_csv(trips: &[TripRecord]) -> String {
    let mut out = String::from(TRIP_CSV_HEADER);
    for trip in trips {
        out.push('\n');
        out.push_str(&csv_row(trip));
    }
    out.push('\n');
    out
}

/// Render a surge table: header plus `(city, hour, surge)` lines.
pub fn surge_csv(entries: &[(u32, u32, f64)]) -> String {
    let mut out = String::from(SURGE_CSV_HEADER);
    for (city, hour, surge) in entries {
        out.push('\n');
        out.push_str(&format!("{city},{hour},{surge}"));
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_row_round_trips_field_count() {
        let row = csv_row(&sample_trip(1, "2024-03-04 09:00:00"));
        assert_eq!(row.split(',').count(), 23);
    }

    #[test]
    fn trip_log_has_header_and_rows() {
        let log = trip_log_csv(&[sample_trip(1, "2024-03-04 09:00:00")]);
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ride_id,"));
    }
}
