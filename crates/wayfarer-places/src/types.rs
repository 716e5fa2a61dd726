use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Display category, assigned by `classify::classify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoiCategory {
    Viewpoint,
    Museum,
    Tourism,
    Historic,
    Beach,
    Nature,
    Leisure,
    Food,
    Religious,
    Amenity,
    Shopping,
    Other,
}

impl PoiCategory {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Viewpoint => "Viewpoint",
            Self::Museum => "Museum",
            Self::Tourism => "Attraction",
            Self::Historic => "Historic site",
            Self::Beach => "Beach",
            Self::Nature => "Nature",
            Self::Leisure => "Park & leisure",
            Self::Food => "Food & drink",
            Self::Religious => "Place of worship",
            Self::Amenity => "Amenity",
            Self::Shopping => "Shopping",
            Self::Other => "Place",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Viewpoint => "binoculars",
            Self::Museum => "bank",
            Self::Tourism => "star",
            Self::Historic => "castle_turret",
            Self::Beach => "umbrella_simple",
            Self::Nature => "tree",
            Self::Leisure => "park",
            Self::Food => "fork_knife",
            Self::Religious => "church",
            Self::Amenity => "info",
            Self::Shopping => "shopping_bag",
            Self::Other => "map_pin",
        }
    }

    /// Worth suggesting to a visitor.
    pub fn is_interesting(&self) -> bool {
        matches!(
            self,
            Self::Viewpoint
                | Self::Museum
                | Self::Tourism
                | Self::Historic
                | Self::Beach
                | Self::Nature
                | Self::Religious
        )
    }
}

/// A normalized point of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    /// `node/123`, `way/456`, `seed:...` or `fallback:...`
    pub id: String,
    pub name: String,
    /// Value of the tag that decided the category (e.g. `viewpoint`)
    pub poi_type: String,
    pub category: PoiCategory,
    pub lat: f64,
    pub lon: f64,
    /// Metres from the query point
    pub distance_m: f64,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub icon: String,
    pub is_interesting: bool,
}
