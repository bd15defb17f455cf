//! Spatial helpers: great-circle distance, hex-key and city zone mapping.
//!
//! Trip logs carry two levels of location detail: raw lat/lon pairs and H3
//! resolution-9 cell ids ("hex keys"). Demand reporting collapses both onto
//! a small fixed set of zones; the profitability scorer works on raw
//! coordinates with a fixed locality radius.

use h3o::CellIndex;

/// Canonical coarse zones used for demand reporting.
pub const ZONES: [&str; 3] = ["A", "B", "C"];

/// Locality radius for "nearby trip" filtering, in kilometers.
pub const NEARBY_RADIUS_KM: f64 = 5.0;

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine great-circle distance between two lat/lon points, in km.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1) = (lat1.to_radians(), lon1.to_radians());
    let (lat2, lon2) = (lat2.to_radians(), lon2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Map a positive city id onto a zone by cycling through the canonical set.
pub fn zone_for_city(city_id: u32) -> Option<&'static str> {
    if city_id == 0 {
        return None;
    }
    Some(ZONES[((city_id - 1) as usize) % ZONES.len()])
}

/// Deterministically bucket a hex grid key into a zone.
///
/// Only the key's last character matters: decimal digits and hex letters map
/// via their numeric value mod the zone count, anything else via the
/// character's ordinal. Blank keys have no zone.
pub fn zone_for_hex(key: &str) -> Option<&'static str> {
    let last = key.trim().chars().last()?;
    let bucket = if let Some(d) = last.to_digit(10) {
        d as usize
    } else if let Some(d) = last.to_digit(16) {
        // a-f / A-F carry their hex value (10-15)
        d as usize
    } else {
        last as usize
    };
    Some(ZONES[bucket % ZONES.len()])
}

/// Center coordinates of an H3 cell key, when the key parses as one.
///
/// Used as a fallback position for records whose lat/lon columns are unusable
/// but whose hex key is intact.
pub fn hex_center(key: &str) -> Option<(f64, f64)> {
    let cell: CellIndex = key.trim().parse().ok()?;
    let ll: h3o::LatLng = cell.into();
    Some((ll.lat(), ll.lng()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_zero_for_same_point() {
        assert!(haversine_km(52.52, 13.40, 52.52, 13.40) < 1e-9);
    }

    #[test]
    fn haversine_one_degree_latitude() {
        // One degree of latitude is ~111.2 km everywhere.
        let d = haversine_km(52.0, 13.40, 53.0, 13.40);
        assert!((d - 111.19).abs() < 0.5, "got {d}");
    }

    #[test]
    fn city_zone_cycles() {
        assert_eq!(zone_for_city(1), Some("A"));
        assert_eq!(zone_for_city(2), Some("B"));
        assert_eq!(zone_for_city(3), Some("C"));
        assert_eq!(zone_for_city(4), Some("A"));
        assert_eq!(zone_for_city(0), None);
    }

    #[test]
    fn hex_zone_is_deterministic() {
        assert_eq!(zone_for_hex("8a1fb4660"), Some("A"));
        assert_eq!(zone_for_hex("8a1fb4661"), Some("B"));
        assert_eq!(zone_for_hex("8a1fb4662"), Some("C"));
        // Hex letters use their numeric value: f = 15 -> 15 % 3 = 0.
        assert_eq!(zone_for_hex("8a1fb466f"), Some("A"));
        assert_eq!(zone_for_hex("8a1fb466a"), Some("B"));
        // Anything else falls back to the character ordinal.
        assert_eq!(zone_for_hex("keyz"), Some(ZONES[('z' as usize) % 3]));
        assert_eq!(zone_for_hex(""), None);
        assert_eq!(zone_for_hex("   "), None);
        // Same key, same zone, every call.
        for _ in 0..3 {
            assert_eq!(zone_for_hex("8a1fb4660"), Some("A"));
        }
    }

    #[test]
    fn hex_center_parses_valid_cells() {
        let (lat, lng) = hex_center("8a1fb46622dffff").expect("valid cell");
        assert!(lat.is_finite() && lng.is_finite());
        assert_eq!(hex_center("not-a-cell"), None);
        assert_eq!(hex_center(""), None);
    }
}
