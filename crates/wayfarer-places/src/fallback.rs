//! Procedural POIs for places without seed data.
//!
//! Eight entries on a ring of fixed degree offsets around the query point.
//! The offsets ignore local geography, so near a coast some may land in the
//! sea.

use std::collections::BTreeMap;

use wayfarer_fetch::coord_key;

use crate::classify::classify;
use crate::geo::haversine_m;
use crate::types::Poi;

/// (lat offset, lon offset, name, tag)
const RING: [(f64, f64, &str, (&str, &str)); 8] = [
    (0.0045, 0.0, "Lookout point", ("tourism", "viewpoint")),
    (0.0032, 0.0032, "Local café", ("amenity", "cafe")),
    (0.0, 0.0045, "Town square", ("tourism", "attraction")),
    (-0.0032, 0.0032, "Neighbourhood park", ("leisure", "park")),
    (-0.0045, 0.0, "Old quarter", ("historic", "yes")),
    (-0.0032, -0.0032, "Corner market", ("shop", "convenience")),
    (0.0, -0.0045, "Local museum", ("tourism", "museum")),
    (0.0032, -0.0032, "Green walk", ("natural", "wood")),
];

pub fn ring_around(lat: f64, lon: f64) -> Vec<Poi> {
    let cell = coord_key(lat, lon);
    RING.iter()
        .enumerate()
        .map(|(index, (d_lat, d_lon, name, tag))| {
            let poi_lat = lat + d_lat;
            let poi_lon = lon + d_lon;
            let tags = BTreeMap::from([
                ("name".to_string(), name.to_string()),
                (tag.0.to_string(), tag.1.to_string()),
            ]);
            let classification = classify(&tags);
            Poi {
                id: format!("fallback:{}:{}", cell, index),
                name: name.to_string(),
                poi_type: classification.poi_type,
                icon: classification.category.icon().to_string(),
                is_interesting: classification.category.is_interesting(),
                category: classification.category,
                lat: poi_lat,
                lon: poi_lon,
                distance_m: haversine_m(lat, lon, poi_lat, poi_lon),
                tags,
            }
        })
        .collect()
}
