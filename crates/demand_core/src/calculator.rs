//! Pure demand scoring: normalized signals in, per-zone scores and advice out.
//!
//! No I/O lives here. Inputs arrive as optional maps keyed by zone id (the
//! canonical zones, or a city id string in single-city mode); the output maps
//! each key seen in any input to a [`ZoneDemand`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;

/// Demand intensity band for a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DemandLevel {
    Low,
    Med,
    High,
}

impl DemandLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 0.33 {
            DemandLevel::Low
        } else if score < 0.66 {
            DemandLevel::Med
        } else {
            DemandLevel::High
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DemandLevel::Low => "low",
            DemandLevel::Med => "med",
            DemandLevel::High => "high",
        }
    }
}

impl fmt::Display for DemandLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kind of work the caller is asking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UserCategory {
    Rider,
    Food,
    Unspecified,
}

impl UserCategory {
    /// Lenient parse for API boundaries; anything unrecognized (including
    /// blank) means no stated preference.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "rider" | "rides" => UserCategory::Rider,
            "food" | "eats" => UserCategory::Food,
            _ => UserCategory::Unspecified,
        }
    }

    pub(crate) fn prefers_eats(self) -> bool {
        matches!(self, UserCategory::Food)
    }
}

/// Optional per-zone input signals. Any zone present in any map is scored;
/// missing values default to 0.0, except weather which defaults to 1.0
/// (a multiplier centered at "no effect").
#[derive(Debug, Clone, Default)]
pub struct DemandInputs {
    pub rides: Option<HashMap<String, f64>>,
    pub eats: Option<HashMap<String, f64>>,
    pub surge: Option<HashMap<String, f64>>,
    pub heat: Option<HashMap<String, f64>>,
    pub incentives: Option<HashMap<String, f64>>,
    pub weather_factor: Option<HashMap<String, f64>>,
    pub cancellation: Option<HashMap<String, f64>>,
}

/// Computed demand for one zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneDemand {
    pub rides_score: f64,
    pub rides_level: DemandLevel,
    pub eats_score: f64,
    pub eats_level: DemandLevel,
    pub recommendation: String,
}

/// Compute per-zone demand from the provided signals.
///
/// With no zones in any input the result is an empty map, not an error.
pub fn calculate_demand(
    inputs: &DemandInputs,
    category: UserCategory,
) -> BTreeMap<String, ZoneDemand> {
    let mut zones: BTreeSet<&String> = BTreeSet::new();
    for map in [
        &inputs.rides,
        &inputs.eats,
        &inputs.surge,
        &inputs.heat,
        &inputs.incentives,
        &inputs.weather_factor,
        &inputs.cancellation,
    ] {
        if let Some(map) = map {
            zones.extend(map.keys());
        }
    }

    let mut out = BTreeMap::new();
    for zone in zones {
        let r = value_of(&inputs.rides, zone, 0.0);
        let e = value_of(&inputs.eats, zone, 0.0);
        let s = value_of(&inputs.surge, zone, 0.0);
        let h = value_of(&inputs.heat, zone, 0.0);
        let i = value_of(&inputs.incentives, zone, 0.0);
        let w = value_of(&inputs.weather_factor, zone, 1.0);
        let c = value_of(&inputs.cancellation, zone, 0.0);

        // Incentives carry no weight yet; the term stays so the input keeps
        // flowing through the formula.
        let rides_score =
            clamp01(0.9 * r + 0.05 * s + 0.03 * h + 0.02 * (w - 1.0) - 0.05 * c + 0.0 * i);
        let eats_score = clamp01(0.9 * e + 0.05 * s + 0.03 * h + 0.02 * (w - 1.0) + 0.0 * i);

        let rides_score = round2(rides_score);
        let eats_score = round2(eats_score);
        let rides_level = DemandLevel::from_score(rides_score);
        let eats_level = DemandLevel::from_score(eats_score);

        out.insert(
            zone.clone(),
            ZoneDemand {
                rides_score,
                rides_level,
                eats_score,
                eats_level,
                recommendation: recommend(category, rides_score, rides_level, eats_score, eats_level),
            },
        );
    }
    out
}

fn recommend(
    category: UserCategory,
    rides_score: f64,
    rides_level: DemandLevel,
    eats_score: f64,
    eats_level: DemandLevel,
) -> String {
    match category {
        UserCategory::Rider => format!("rides demand {rides_level}"),
        UserCategory::Food => format!("eats demand {eats_level}"),
        UserCategory::Unspecified => {
            if rides_score - eats_score > 0.15 {
                "rides".to_string()
            } else if eats_score - rides_score > 0.15 {
                "eats".to_string()
            } else if rides_score < 0.33 && eats_score < 0.33 {
                "stay".to_string()
            } else {
                "either".to_string()
            }
        }
    }
}

fn value_of(map: &Option<HashMap<String, f64>>, zone: &str, default: f64) -> f64 {
    map.as_ref()
        .and_then(|m| m.get(zone))
        .copied()
        .unwrap_or(default)
}

fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
