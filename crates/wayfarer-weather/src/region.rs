//! AEMET warning-area resolution by bounding box.

/// Canary Islands warning area
pub const CANARY_ISLANDS: &str = "65";
/// Balearic Islands warning area
pub const BALEARIC_ISLANDS: &str = "64";
/// Peninsular Spain (national bulletin)
pub const PENINSULA: &str = "esp";

struct Region {
    code: &'static str,
    lat: (f64, f64),
    lon: (f64, f64),
}

impl Region {
    fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.lat.0..=self.lat.1).contains(&lat) && (self.lon.0..=self.lon.1).contains(&lon)
    }
}

// Checked in order; the islands come before the peninsula box.
const REGIONS: &[Region] = &[
    Region {
        code: CANARY_ISLANDS,
        lat: (27.5, 29.5),
        lon: (-18.5, -13.3),
    },
    Region {
        code: BALEARIC_ISLANDS,
        lat: (38.6, 40.1),
        lon: (1.1, 4.4),
    },
    Region {
        code: PENINSULA,
        lat: (35.9, 43.8),
        lon: (-9.4, 3.4),
    },
];

/// AEMET area code for a point, or `None` outside AEMET coverage.
pub fn aemet_area(lat: f64, lon: f64) -> Option<&'static str> {
    REGIONS.iter().find(|r| r.contains(lat, lon)).map(|r| r.code)
}
