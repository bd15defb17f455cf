//! End-to-end demand pipeline tests: CSV files in, demand responses out.

use std::fs;
use std::path::PathBuf;

use chrono::Local;
use tempfile::TempDir;

use demand_core::test_helpers::{
    sample_trip, surge_csv, trip_log_csv, trip_with_hex, SURGE_CSV_HEADER,
};
use demand_core::{Dataset, DemandBucket, LoadError, UserCategory};

fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write fixture");
    path
}

fn fixture_dataset(dir: &TempDir) -> Dataset {
    let rides = trip_log_csv(&[
        sample_trip(1, "2024-03-04 09:00:00"),
        sample_trip(1, "2024-03-04 10:30:00"),
        sample_trip(2, "2024-03-04 11:00:00"),
        sample_trip(3, "2024-03-04 18:00:00"),
        trip_with_hex(2, "2024-03-04 02:00:00", "8a1fb4660"),
    ]);
    let eats = trip_log_csv(&[
        sample_trip(2, "2024-03-04 19:00:00"),
        sample_trip(2, "2024-03-04 20:00:00"),
    ]);
    let surge = surge_csv(&[(1, 9, 1.5), (2, 9, 1.1), (1, 18, 2.0)]);

    let rides_path = write_file(dir, "rides_trips.csv", &rides);
    let eats_path = write_file(dir, "eats_orders.csv", &eats);
    let surge_path = write_file(dir, "surge_by_hour.csv", &surge);
    Dataset::load(&rides_path, Some(&eats_path), &surge_path).expect("dataset loads")
}

#[test]
fn every_bucket_reports_all_zones() {
    let dir = TempDir::new().expect("tempdir");
    let dataset = fixture_dataset(&dir);
    for bucket in DemandBucket::ALL {
        let response = dataset
            .demand_service()
            .demand_for_bucket(bucket, UserCategory::Rider);
        assert_eq!(response.zones.len(), 3, "bucket {:?}", bucket);
        for zone in ["A", "B", "C"] {
            assert!(response.zones.contains_key(zone));
        }
    }
}

#[test]
fn busiest_zone_normalizes_to_one() {
    let dir = TempDir::new().expect("tempdir");
    let dataset = fixture_dataset(&dir);
    let morning = dataset
        .demand_service()
        .signals()
        .rides_for(DemandBucket::Morning);
    assert!(
        morning.values().any(|v| *v == 1.0),
        "some zone must carry the max signal: {morning:?}"
    );
    assert!(morning.values().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn current_demand_matches_demand_at_now() {
    let dir = TempDir::new().expect("tempdir");
    let dataset = fixture_dataset(&dir);
    let svc = dataset.demand_service();
    let now = Local::now().naive_local();

    let current = svc.current_demand(UserCategory::Rider, None);
    let at = svc.demand_at(UserCategory::Rider, None, now);
    assert_eq!(current.zones, at.zones);
    assert_eq!(current.window, "now");
    assert_eq!(at.window, "at");
}

#[test]
fn malformed_rows_are_skipped_not_fatal() {
    let dir = TempDir::new().expect("tempdir");
    let mut rides = trip_log_csv(&[sample_trip(1, "2024-03-04 09:00:00")]);
    rides.push_str("this,row,is,short\n");
    rides.push_str("r9,d9,u9,not-a-city,standard,sedan,false,2024-03-04 09:00:00,2024-03-04 09:20:00,52.5,13.4,,52.5,13.4,,5,20,1,10,2,8,0,card\n");
    let rides_path = write_file(&dir, "rides_trips.csv", &rides);
    let surge_path = write_file(&dir, "surge_by_hour.csv", &surge_csv(&[]));

    let dataset = Dataset::load(&rides_path, None, &surge_path).expect("load survives bad rows");
    assert_eq!(dataset.trip_analyzer().store().len(), 1);
}

#[test]
fn missing_or_headerless_files_are_fatal() {
    let dir = TempDir::new().expect("tempdir");
    let surge_path = write_file(&dir, "surge_by_hour.csv", &surge_csv(&[]));
    let missing = dir.path().join("nope.csv");
    assert!(matches!(
        Dataset::load(&missing, None, &surge_path),
        Err(LoadError::Io { .. })
    ));

    let empty_path = write_file(&dir, "empty.csv", "");
    assert!(matches!(
        Dataset::load(&empty_path, None, &surge_path),
        Err(LoadError::EmptyCsv { .. })
    ));
}

#[test]
fn absent_eats_log_yields_zero_eats_signals() {
    let dir = TempDir::new().expect("tempdir");
    let rides_path = write_file(
        &dir,
        "rides_trips.csv",
        &trip_log_csv(&[sample_trip(1, "2024-03-04 09:00:00")]),
    );
    let surge_path = write_file(&dir, "surge.csv", SURGE_CSV_HEADER);

    let dataset = Dataset::load(&rides_path, None, &surge_path).expect("loads without eats");
    let eats = dataset
        .demand_service()
        .signals()
        .eats_for(DemandBucket::Morning);
    assert!(eats.values().all(|v| *v == 0.0));

    let response = dataset
        .demand_service()
        .demand_for_bucket(DemandBucket::Morning, UserCategory::Food);
    assert!(response.zones.values().all(|z| z.score == 0.0 && z.action == "rest"));
}

#[test]
fn available_cities_come_from_both_logs() {
    let dir = TempDir::new().expect("tempdir");
    let dataset = fixture_dataset(&dir);
    assert_eq!(dataset.demand_service().available_city_ids(), vec![1, 2, 3]);
}

#[test]
fn city_mode_keys_response_by_city_id() {
    let dir = TempDir::new().expect("tempdir");
    let dataset = fixture_dataset(&dir);
    let at = chrono::NaiveDateTime::parse_from_str("2024-03-11 09:00:00", "%Y-%m-%d %H:%M:%S")
        .expect("valid datetime");
    let response = dataset
        .demand_service()
        .demand_at(UserCategory::Rider, Some(1), at);
    assert_eq!(response.zones.len(), 1);
    assert!(response.zones.contains_key("1"));
}
