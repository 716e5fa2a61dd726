//! Curated places for Santa Cruz de Tenerife, served when Overpass is out
//! of reach near the city.

use std::collections::BTreeMap;

use crate::classify::classify;
use crate::geo::haversine_m;
use crate::types::Poi;

pub const SANTA_CRUZ_CENTER: (f64, f64) = (28.4636, -16.2518);
/// Query points within this distance of the centre get the seed list
pub const SEED_RADIUS_M: f64 = 25_000.0;

struct Seed {
    slug: &'static str,
    name: &'static str,
    lat: f64,
    lon: f64,
    tag: (&'static str, &'static str),
}

const SANTA_CRUZ: [Seed; 15] = [
    Seed { slug: "auditorio", name: "Auditorio de Tenerife", lat: 28.4566, lon: -16.2525, tag: ("tourism", "attraction") },
    Seed { slug: "garcia-sanabria", name: "Parque García Sanabria", lat: 28.4724, lon: -16.2528, tag: ("leisure", "park") },
    Seed { slug: "plaza-espana", name: "Plaza de España", lat: 28.4677, lon: -16.2466, tag: ("tourism", "attraction") },
    Seed { slug: "concepcion", name: "Iglesia de la Concepción", lat: 28.4665, lon: -16.2497, tag: ("historic", "church") },
    Seed { slug: "muna", name: "Museo de la Naturaleza y Arqueología", lat: 28.4655, lon: -16.2506, tag: ("tourism", "museum") },
    Seed { slug: "tea", name: "TEA Tenerife Espacio de las Artes", lat: 28.4650, lon: -16.2516, tag: ("tourism", "gallery") },
    Seed { slug: "mercado-africa", name: "Mercado Nuestra Señora de África", lat: 28.4631, lon: -16.2557, tag: ("amenity", "marketplace") },
    Seed { slug: "teresitas", name: "Playa de Las Teresitas", lat: 28.5083, lon: -16.1858, tag: ("natural", "beach") },
    Seed { slug: "san-juan", name: "Castillo de San Juan Bautista", lat: 28.4600, lon: -16.2528, tag: ("historic", "castle") },
    Seed { slug: "palmetum", name: "Palmetum", lat: 28.4555, lon: -16.2555, tag: ("leisure", "garden") },
    Seed { slug: "parque-maritimo", name: "Parque Marítimo César Manrique", lat: 28.4555, lon: -16.2461, tag: ("leisure", "water_park") },
    Seed { slug: "candelaria", name: "Plaza de la Candelaria", lat: 28.4685, lon: -16.2478, tag: ("historic", "monument") },
    Seed { slug: "guimera", name: "Teatro Guimerá", lat: 28.4686, lon: -16.2510, tag: ("amenity", "theatre") },
    Seed { slug: "museo-militar", name: "Museo Militar Regional de Canarias", lat: 28.4734, lon: -16.2419, tag: ("tourism", "museum") },
    Seed { slug: "anaga", name: "Parque Rural de Anaga", lat: 28.5522, lon: -16.2233, tag: ("leisure", "nature_reserve") },
];

/// Seeds applying to a query point, with distances measured from it.
pub fn seeds_for(lat: f64, lon: f64) -> Option<Vec<Poi>> {
    let from_center = haversine_m(SANTA_CRUZ_CENTER.0, SANTA_CRUZ_CENTER.1, lat, lon);
    if from_center > SEED_RADIUS_M {
        return None;
    }

    Some(
        SANTA_CRUZ
            .iter()
            .map(|seed| {
                let tags = BTreeMap::from([
                    ("name".to_string(), seed.name.to_string()),
                    (seed.tag.0.to_string(), seed.tag.1.to_string()),
                ]);
                let classification = classify(&tags);
                Poi {
                    id: format!("seed:santa-cruz:{}", seed.slug),
                    name: seed.name.to_string(),
                    poi_type: classification.poi_type,
                    icon: classification.category.icon().to_string(),
                    category: classification.category,
                    lat: seed.lat,
                    lon: seed.lon,
                    distance_m: haversine_m(lat, lon, seed.lat, seed.lon),
                    tags,
                    // Curated, so every seed is worth showing
                    is_interesting: true,
                }
            })
            .collect(),
    )
}
