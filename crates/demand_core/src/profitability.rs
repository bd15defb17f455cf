//! Trip offer scoring against historical earnings.
//!
//! Given an incoming offer, the analyzer pulls every historical trip for the
//! current hour as a baseline, narrows it down to trips near the offer's
//! pickup and dropoff when coordinates are supplied, and folds the comparison
//! into a 0-10 score with a short list of human-readable reasons. The scorer
//! never fails: missing or unparseable inputs degrade to baseline-only
//! scoring, and every division is guarded.

use std::fmt;

use chrono::{Local, Timelike};
use rand::Rng;
use serde::Serialize;

use crate::records::{TripRecord, TripStore};
use crate::spatial::{haversine_km, NEARBY_RADIUS_KM};

/// Floor for ratio denominators.
const MIN_BASELINE_RATE: f64 = 0.01;

/// An incoming trip offer to evaluate.
#[derive(Debug, Clone, Default)]
pub struct TripOffer {
    /// Upstream score carried for display only; not used by the scorer.
    pub profitability_score: f64,
    pub total_earnings: f64,
    pub estimated_duration_mins: u32,
    pub distance_miles: f64,
    /// Absent means no surge (1.0).
    pub surge_multiplier: Option<f64>,
    pub pickup_lat: Option<String>,
    pub pickup_lon: Option<String>,
    pub dropoff_lat: Option<String>,
    pub dropoff_lon: Option<String>,
}

impl TripOffer {
    fn pickup_point(&self) -> Option<(f64, f64)> {
        parse_point(&self.pickup_lat, &self.pickup_lon)
    }

    fn dropoff_point(&self) -> Option<(f64, f64)> {
        parse_point(&self.dropoff_lat, &self.dropoff_lon)
    }

    /// Offered earnings per minute; duration is floored at one minute.
    fn earnings_per_min(&self) -> f64 {
        self.total_earnings / self.estimated_duration_mins.max(1) as f64
    }

    fn surge(&self) -> f64 {
        self.surge_multiplier.unwrap_or(1.0)
    }
}

fn parse_point(lat: &Option<String>, lon: &Option<String>) -> Option<(f64, f64)> {
    let lat: f64 = lat.as_deref()?.trim().parse().ok()?;
    let lon: f64 = lon.as_deref()?.trim().parse().ok()?;
    Some((lat, lon))
}

/// Earnings statistics for historical trips near one point.
#[derive(Debug, Clone, Serialize)]
pub struct LocalityStats {
    pub trip_count: usize,
    pub avg_earnings_per_min: f64,
    pub avg_surge: f64,
    pub avg_distance_km: f64,
    /// Locality mean rate over the baseline mean rate.
    pub profitability_index: f64,
    /// 1.0 / 0.7 / 0.4 depending on the rate variance.
    pub consistency_index: f64,
    /// More than 30% of nearby trips beat 1.2x the baseline rate.
    pub has_hotspot_destinations: bool,
}

/// Statistics for trips that *start* near the offer's dropoff: the driver's
/// likely next fare after completing this one.
#[derive(Debug, Clone, Serialize)]
pub struct ReturnTripStats {
    pub trip_count: usize,
    pub avg_earnings_per_min: f64,
    pub avg_surge: f64,
    /// Return-population mean rate over the baseline mean rate.
    pub quality_index: f64,
    pub consistency_index: f64,
}

/// Everything the scorer learned from history for one offer.
#[derive(Debug, Clone, Serialize)]
pub struct HistoricalAnalysis {
    pub hour: u32,
    pub baseline_trip_count: usize,
    pub avg_earnings_per_min: f64,
    pub avg_surge: f64,
    /// 75th-percentile earnings per minute for the hour.
    pub top_performer_rate: f64,
    pub avg_distance_km: f64,
    pub avg_duration_mins: f64,
    pub next_hour_surge: f64,
    pub two_hour_surge: f64,
    pub pickup: Option<LocalityStats>,
    pub dropoff: Option<LocalityStats>,
    pub return_trips: Option<ReturnTripStats>,
}

/// Thresholds for forward surge guidance.
#[derive(Debug, Clone, Copy)]
pub struct SurgeOutlookConfig {
    /// Next-hour surge above current by this factor reads as rising.
    pub rise_next: f64,
    /// Two-hour surge above current by this factor reads as a longer climb.
    pub rise_two_hour: f64,
    /// Current surge above next-hour by this factor reads as a peak.
    pub peak_over_next: f64,
}

impl Default for SurgeOutlookConfig {
    fn default() -> Self {
        Self {
            rise_next: 1.20,
            rise_two_hour: 1.30,
            peak_over_next: 1.15,
        }
    }
}

/// The scorer's answer for one offer.
#[derive(Debug, Clone, Serialize)]
pub struct TripAdvice {
    /// Final score in [0, 10], rounded to 2 decimals.
    pub score: f64,
    pub verdict: &'static str,
    pub reasons: Vec<String>,
    pub surge_outlook: String,
}

impl fmt::Display for TripAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({:.2}/10)", self.verdict, self.score)?;
        for reason in &self.reasons {
            writeln!(f, "- {reason}")?;
        }
        write!(f, "- {}", self.surge_outlook)
    }
}

/// Scores trip offers against the historical record.
#[derive(Debug)]
pub struct TripAnalyzer {
    store: TripStore,
    outlook: SurgeOutlookConfig,
}

impl TripAnalyzer {
    pub fn new(store: TripStore) -> Self {
        Self {
            store,
            outlook: SurgeOutlookConfig::default(),
        }
    }

    pub fn with_outlook_config(mut self, outlook: SurgeOutlookConfig) -> Self {
        self.outlook = outlook;
        self
    }

    pub fn store(&self) -> &TripStore {
        &self.store
    }

    /// Score an offer against the current hour's history.
    pub fn analyze(&self, offer: &TripOffer) -> TripAdvice {
        self.analyze_at(offer, Local::now().hour())
    }

    /// Score an offer against a specific hour of day.
    pub fn analyze_at(&self, offer: &TripOffer, hour: u32) -> TripAdvice {
        let analysis = self.analysis_for(offer, hour);
        let raw = score_offer(offer, &analysis);
        // A small uniform perturbation keeps repeated borderline offers from
        // reading identically.
        let jitter = rand::thread_rng().gen_range(-0.2..=0.2);
        let score = round2((raw + jitter).clamp(0.0, 10.0));

        TripAdvice {
            score,
            verdict: verdict_for(score),
            reasons: explain(offer, &analysis),
            surge_outlook: surge_outlook(
                offer.surge(),
                analysis.next_hour_surge,
                analysis.two_hour_surge,
                &self.outlook,
            ),
        }
    }

    /// Gather the historical aggregate the scoring runs on.
    pub fn analysis_for(&self, offer: &TripOffer, hour: u32) -> HistoricalAnalysis {
        let baseline = self.store.trips_for_hour(hour);
        let rates = rates_of(&baseline);
        let avg_rate = mean(&rates);
        let mut sorted = rates;
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let pickup = offer.pickup_point().and_then(|point| {
            let nearby: Vec<&TripRecord> = baseline
                .iter()
                .copied()
                .filter(|trip| within_radius(trip.pickup_point(), point))
                .collect();
            locality_stats(&nearby, avg_rate)
        });

        let (dropoff, return_trips) = match offer.dropoff_point() {
            Some(point) => {
                let nearby_drops: Vec<&TripRecord> = baseline
                    .iter()
                    .copied()
                    .filter(|trip| within_radius(trip.drop_point(), point))
                    .collect();
                let returns: Vec<&TripRecord> = baseline
                    .iter()
                    .copied()
                    .filter(|trip| within_radius(trip.pickup_point(), point))
                    .collect();
                (
                    locality_stats(&nearby_drops, avg_rate),
                    return_trip_stats(&returns, avg_rate),
                )
            }
            None => (None, None),
        };

        HistoricalAnalysis {
            hour,
            baseline_trip_count: baseline.len(),
            avg_earnings_per_min: avg_rate,
            avg_surge: mean(&baseline.iter().map(|t| t.surge_multiplier).collect::<Vec<_>>()),
            top_performer_rate: percentile75(&sorted),
            avg_distance_km: mean(&baseline.iter().map(|t| t.distance_km).collect::<Vec<_>>()),
            avg_duration_mins: mean(
                &baseline
                    .iter()
                    .map(|t| t.duration_mins as f64)
                    .collect::<Vec<_>>(),
            ),
            next_hour_surge: self.store.average_surge_for_hour((hour + 1) % 24),
            two_hour_surge: self.store.average_surge_for_hour((hour + 2) % 24),
            pickup,
            dropoff,
            return_trips,
        }
    }
}

fn within_radius(trip_point: Option<(f64, f64)>, center: (f64, f64)) -> bool {
    match trip_point {
        Some((lat, lon)) => haversine_km(lat, lon, center.0, center.1) <= NEARBY_RADIUS_KM,
        None => false,
    }
}

fn rates_of(trips: &[&TripRecord]) -> Vec<f64> {
    trips.iter().filter_map(|t| t.earnings_per_min()).collect()
}

fn locality_stats(trips: &[&TripRecord], baseline_rate: f64) -> Option<LocalityStats> {
    if trips.is_empty() {
        return None;
    }
    let rates = rates_of(trips);
    let avg = mean(&rates);
    let hot = trips
        .iter()
        .filter_map(|t| t.earnings_per_min())
        .filter(|rate| *rate > baseline_rate * 1.2)
        .count();
    Some(LocalityStats {
        trip_count: trips.len(),
        avg_earnings_per_min: avg,
        avg_surge: mean(&trips.iter().map(|t| t.surge_multiplier).collect::<Vec<_>>()),
        avg_distance_km: mean(&trips.iter().map(|t| t.distance_km).collect::<Vec<_>>()),
        profitability_index: avg / baseline_rate.max(MIN_BASELINE_RATE),
        consistency_index: consistency_from_variance(variance(&rates)),
        has_hotspot_destinations: hot as f64 > trips.len() as f64 * 0.3,
    })
}

fn return_trip_stats(trips: &[&TripRecord], baseline_rate: f64) -> Option<ReturnTripStats> {
    if trips.is_empty() {
        return None;
    }
    let rates = rates_of(trips);
    let avg = mean(&rates);
    Some(ReturnTripStats {
        trip_count: trips.len(),
        avg_earnings_per_min: avg,
        avg_surge: mean(&trips.iter().map(|t| t.surge_multiplier).collect::<Vec<_>>()),
        quality_index: avg / baseline_rate.max(MIN_BASELINE_RATE),
        consistency_index: consistency_from_variance(variance(&rates)),
    })
}

// ---------------------------------------------------------------------------
// Factor contributions
// ---------------------------------------------------------------------------

fn score_offer(offer: &TripOffer, analysis: &HistoricalAnalysis) -> f64 {
    let rate = offer.earnings_per_min();
    earnings_factor(rate, analysis.avg_earnings_per_min)
        + pickup_factor(rate, analysis.pickup.as_ref())
        + dropoff_factor(analysis.dropoff.as_ref(), analysis.return_trips.as_ref())
        + surge_factor(offer.surge(), analysis.pickup.as_ref().map(|p| p.avg_surge))
        + distance_factor(offer.total_earnings, offer.distance_miles)
        + time_factor(offer.estimated_duration_mins)
}

/// Offered rate against the hour's mean rate.
fn earnings_factor(rate: f64, baseline: f64) -> f64 {
    if baseline <= 0.0 {
        return if rate > 0.5 { 1.0 } else { 0.4 };
    }
    let ratio = rate / baseline;
    if ratio >= 1.5 {
        2.0
    } else if ratio >= 1.2 {
        1.5
    } else if ratio >= 1.0 {
        1.0
    } else if ratio >= 0.8 {
        0.5
    } else {
        0.0
    }
}

/// Offered rate against what trips from the pickup area actually earn.
fn pickup_factor(rate: f64, pickup: Option<&LocalityStats>) -> f64 {
    let Some(stats) = pickup else {
        // No locality history: neither a bonus nor a penalty.
        return 0.7;
    };
    let local = stats.avg_earnings_per_min.max(MIN_BASELINE_RATE);
    let ratio = rate / local;
    let mut factor = if ratio >= 1.3 {
        1.8
    } else if ratio >= 1.1 {
        1.3
    } else if ratio >= 0.9 {
        0.9
    } else if ratio >= 0.7 {
        0.4
    } else {
        0.0
    };
    if stats.profitability_index > 1.2 {
        factor += 0.5;
    }
    factor + stats.consistency_index * 0.5
}

/// Chances of a worthwhile next fare near the dropoff.
fn dropoff_factor(dropoff: Option<&LocalityStats>, returns: Option<&ReturnTripStats>) -> f64 {
    if let Some(stats) = returns {
        let mut factor = if stats.quality_index > 1.2 {
            1.7
        } else if stats.quality_index > 1.0 {
            1.3
        } else if stats.quality_index > 0.8 {
            0.9
        } else {
            0.5
        };
        if stats.trip_count > 20 {
            factor += 0.5;
        } else if stats.trip_count > 10 {
            factor += 0.3;
        }
        factor + stats.consistency_index * 0.3
    } else if let Some(stats) = dropoff {
        if stats.profitability_index > 1.1 {
            0.8
        } else {
            0.5
        }
    } else {
        0.6
    }
}

fn surge_factor(current: f64, pickup_avg_surge: Option<f64>) -> f64 {
    let mut factor = if current >= 2.5 {
        2.0
    } else if current >= 1.8 {
        1.5
    } else if current >= 1.3 {
        1.0
    } else if current > 1.0 {
        0.3
    } else {
        0.0
    };
    if let Some(local) = pickup_avg_surge {
        if local > 0.0 && current > local * 1.1 {
            factor += 0.5;
        }
    }
    factor
}

/// Dollars per mile.
fn distance_factor(earnings: f64, distance_miles: f64) -> f64 {
    let per_mile = earnings / distance_miles.max(MIN_BASELINE_RATE);
    if per_mile > 3.5 {
        1.5
    } else if per_mile > 2.5 {
        1.2
    } else if per_mile > 1.8 {
        0.9
    } else if per_mile > 1.2 {
        0.5
    } else {
        0.2
    }
}

/// Shorter trips free the driver up sooner.
fn time_factor(duration_mins: u32) -> f64 {
    if duration_mins <= 10 {
        1.0
    } else if duration_mins <= 20 {
        0.7
    } else if duration_mins <= 35 {
        0.4
    } else if duration_mins <= 50 {
        0.1
    } else {
        -0.3
    }
}

fn verdict_for(score: f64) -> &'static str {
    if score >= 8.0 {
        "accept now"
    } else if score >= 6.5 {
        "accept"
    } else if score >= 5.0 {
        "consider"
    } else if score >= 3.5 {
        "marginal"
    } else {
        "skip"
    }
}

// ---------------------------------------------------------------------------
// Explanation
// ---------------------------------------------------------------------------

fn explain(offer: &TripOffer, analysis: &HistoricalAnalysis) -> Vec<String> {
    let mut reasons = Vec::new();
    let rate = offer.earnings_per_min();

    if analysis.avg_earnings_per_min > 0.0 {
        reasons.push(format!(
            "${:.2}/min offered vs ${:.2}/min typical for this hour (top performers: ${:.2}/min)",
            rate, analysis.avg_earnings_per_min, analysis.top_performer_rate
        ));
    } else {
        reasons.push(format!(
            "${rate:.2}/min offered; no earnings history for this hour"
        ));
    }

    if let Some(stats) = &analysis.pickup {
        reasons.push(format!(
            "pickup area: {} past trips averaging ${:.2}/min ({:.2}x citywide)",
            stats.trip_count, stats.avg_earnings_per_min, stats.profitability_index
        ));
        if stats.has_hotspot_destinations {
            reasons.push("most fares from this area head to high-earning destinations".to_string());
        }
    }

    match (&analysis.return_trips, &analysis.dropoff) {
        (Some(returns), _) => reasons.push(format!(
            "{} past fares start near the dropoff (quality {:.2}x)",
            returns.trip_count, returns.quality_index
        )),
        (None, Some(stats)) => reasons.push(format!(
            "dropoff area sees traffic ({} trips) but few follow-up fares",
            stats.trip_count
        )),
        (None, None) => reasons.push("no history near the dropoff".to_string()),
    }

    let surge = offer.surge();
    if surge > 1.0 {
        reasons.push(format!("surge {surge:.1}x active"));
    }

    if offer.distance_miles > 0.0 {
        reasons.push(format!(
            "${:.2}/mile over {:.1} miles",
            offer.total_earnings / offer.distance_miles.max(MIN_BASELINE_RATE),
            offer.distance_miles
        ));
    }
    reasons.push(format!("{} minute commitment", offer.estimated_duration_mins));

    reasons
}

fn surge_outlook(current: f64, next: f64, two_hour: f64, config: &SurgeOutlookConfig) -> String {
    let current = current.max(MIN_BASELINE_RATE);
    if next > current * config.rise_next {
        format!("surge rising next hour ({next:.2}x) - waiting could pay off")
    } else if two_hour > current * config.rise_two_hour {
        format!("surge climbing over two hours ({two_hour:.2}x) - waiting longer could pay off")
    } else if current > next * config.peak_over_next {
        "surge is peaking - take trips now".to_string()
    } else {
        "surge outlook stable".to_string()
    }
}

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population variance.
fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    values.iter().map(|v| (v - avg) * (v - avg)).sum::<f64>() / values.len() as f64
}

/// 75th percentile of an ascending-sorted population: floor(0.75 * n),
/// clamped to the last index.
fn percentile75(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64 * 0.75) as usize).min(sorted.len() - 1);
    sorted[idx]
}

fn consistency_from_variance(variance: f64) -> f64 {
    if variance < 0.5 {
        1.0
    } else if variance < 1.0 {
        0.7
    } else {
        0.4
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
