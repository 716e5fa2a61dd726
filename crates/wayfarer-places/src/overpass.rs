//! Overpass QL query construction and response normalization.

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;
use wayfarer_core::FetchError;
use wayfarer_fetch::RequestDescriptor;

use crate::classify::{classify, TagKey};
use crate::geo::haversine_m;
use crate::types::Poi;

/// Server-side query timeout, seconds
const QUERY_TIMEOUT_SECS: u32 = 25;
/// Cap on elements returned by the server
const QUERY_LIMIT: u32 = 200;
/// Same-named elements closer than this are one place (node + way of a building)
const DUPLICATE_DISTANCE_M: f64 = 75.0;

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    id: i64,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    fn position(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon, &self.center) {
            (Some(lat), Some(lon), _) => Some((lat, lon)),
            (_, _, Some(center)) => Some((center.lat, center.lon)),
            _ => None,
        }
    }

    fn name(&self) -> Option<&str> {
        self.tags
            .get("name")
            .or_else(|| self.tags.get("name:es"))
            .or_else(|| self.tags.get("name:en"))
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
    }
}

/// Nodes and ways carrying any recognised tag key within `radius_m`.
pub fn build_query(lat: f64, lon: f64, radius_m: u32) -> String {
    let around = format!("(around:{},{:.6},{:.6})", radius_m, lat, lon);
    let mut query = format!("[out:json][timeout:{}];\n(\n", QUERY_TIMEOUT_SECS);
    for key in TagKey::ALL {
        for kind in ["node", "way"] {
            query.push_str(&format!("  {}[\"{}\"][\"name\"]{};\n", kind, key.as_str(), around));
        }
    }
    query.push_str(&format!(");\nout center tags {};\n", QUERY_LIMIT));
    query
}

/// The form-encoded POST every Overpass interpreter accepts.
pub fn request(lat: f64, lon: f64, radius_m: u32) -> RequestDescriptor {
    let body = format!("data={}", urlencoding::encode(&build_query(lat, lon, radius_m)));
    RequestDescriptor::post("", body)
        .with_header("Content-Type", "application/x-www-form-urlencoded")
        .with_header("Accept", "application/json")
}

/// Parse an interpreter response and normalize it against the query point.
///
/// A body without an `elements` array is rejected so the rotation moves on.
pub fn parse_response(body: &str, origin: (f64, f64), limit: usize) -> Result<Vec<Poi>, FetchError> {
    let response: OverpassResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::parse(format!("Overpass response: {}", e)))?;
    Ok(normalize(response.elements, origin, limit))
}

fn normalize(elements: Vec<OverpassElement>, origin: (f64, f64), limit: usize) -> Vec<Poi> {
    let pois = elements.into_iter().filter_map(|element| {
        let name = element.name()?.to_string();
        let (lat, lon) = element.position()?;
        let classification = classify(&element.tags);
        Some(Poi {
            id: format!("{}/{}", element.kind, element.id),
            name,
            poi_type: classification.poi_type,
            icon: classification.category.icon().to_string(),
            is_interesting: classification.category.is_interesting(),
            category: classification.category,
            distance_m: haversine_m(origin.0, origin.1, lat, lon),
            lat,
            lon,
            tags: element.tags,
        })
    });
    rank_and_dedup(pois, limit)
}

/// Drop duplicates, order interesting-first then nearest, keep `limit`.
///
/// Duplicates are repeated ids, or the same name within
/// `DUPLICATE_DISTANCE_M` of an already kept entry. Ranking happens first so
/// the better-ranked copy survives.
pub fn rank_and_dedup(pois: impl IntoIterator<Item = Poi>, limit: usize) -> Vec<Poi> {
    let mut pois: Vec<Poi> = pois.into_iter().collect();
    pois.sort_by(|a, b| {
        b.is_interesting
            .cmp(&a.is_interesting)
            .then(a.distance_m.total_cmp(&b.distance_m))
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut seen_ids = HashSet::new();
    let mut kept: Vec<Poi> = Vec::with_capacity(pois.len().min(limit));
    for poi in pois {
        if kept.len() >= limit {
            break;
        }
        if !seen_ids.insert(poi.id.clone()) {
            continue;
        }
        let name = poi.name.to_lowercase();
        let near_twin = kept.iter().any(|k| {
            k.name.to_lowercase() == name
                && haversine_m(k.lat, k.lon, poi.lat, poi.lon) < DUPLICATE_DISTANCE_M
        });
        if !near_twin {
            kept.push(poi);
        }
    }
    kept
}
