//! Category assignment from OSM tags.
//!
//! Only the keys in `TagKey` are consulted. Rules are checked top to bottom
//! and the first match wins, so an element tagged both `tourism` and
//! `amenity` is a tourism POI.
//!
//! | # | Rule                                   | Category    |
//! |---|----------------------------------------|-------------|
//! | 1 | `tourism=viewpoint`                    | Viewpoint   |
//! | 2 | `tourism=museum` or `tourism=gallery`  | Museum      |
//! | 3 | any other `tourism`                    | Tourism     |
//! | 4 | any `historic`                         | Historic    |
//! | 5 | `natural=beach`                        | Beach       |
//! | 6 | any other `natural`                    | Nature      |
//! | 7 | any `leisure`                          | Leisure     |
//! | 8 | `amenity` in the food set              | Food        |
//! | 9 | `amenity=place_of_worship`             | Religious   |
//! |10 | any other `amenity`                    | Amenity     |
//! |11 | any `shop`                             | Shopping    |
//! |   | none of the above                      | Other       |

use std::collections::BTreeMap;

use crate::types::PoiCategory;

/// The closed set of tag keys classification looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKey {
    Tourism,
    Historic,
    Natural,
    Leisure,
    Amenity,
    Shop,
}

impl TagKey {
    pub const ALL: [TagKey; 6] = [
        TagKey::Tourism,
        TagKey::Historic,
        TagKey::Natural,
        TagKey::Leisure,
        TagKey::Amenity,
        TagKey::Shop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tourism => "tourism",
            Self::Historic => "historic",
            Self::Natural => "natural",
            Self::Leisure => "leisure",
            Self::Amenity => "amenity",
            Self::Shop => "shop",
        }
    }
}

const FOOD_AMENITIES: &[&str] = &[
    "restaurant",
    "cafe",
    "bar",
    "pub",
    "fast_food",
    "ice_cream",
    "biergarten",
    "food_court",
];

/// Typed view over the recognised keys of a tag map.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecognisedTags<'a> {
    tourism: Option<&'a str>,
    historic: Option<&'a str>,
    natural: Option<&'a str>,
    leisure: Option<&'a str>,
    amenity: Option<&'a str>,
    shop: Option<&'a str>,
}

impl<'a> RecognisedTags<'a> {
    pub fn from_tags(tags: &'a BTreeMap<String, String>) -> Self {
        let get = |key: TagKey| {
            tags.get(key.as_str())
                .map(|v| v.trim())
                .filter(|v| !v.is_empty() && *v != "no")
        };
        Self {
            tourism: get(TagKey::Tourism),
            historic: get(TagKey::Historic),
            natural: get(TagKey::Natural),
            leisure: get(TagKey::Leisure),
            amenity: get(TagKey::Amenity),
            shop: get(TagKey::Shop),
        }
    }

    pub fn get(&self, key: TagKey) -> Option<&'a str> {
        match key {
            TagKey::Tourism => self.tourism,
            TagKey::Historic => self.historic,
            TagKey::Natural => self.natural,
            TagKey::Leisure => self.leisure,
            TagKey::Amenity => self.amenity,
            TagKey::Shop => self.shop,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: PoiCategory,
    /// Value of the deciding tag, or `unknown`
    pub poi_type: String,
}

pub fn classify(tags: &BTreeMap<String, String>) -> Classification {
    let (category, poi_type) = classify_recognised(&RecognisedTags::from_tags(tags));
    Classification {
        category,
        poi_type: poi_type.unwrap_or("unknown").to_string(),
    }
}

fn classify_recognised<'a>(tags: &RecognisedTags<'a>) -> (PoiCategory, Option<&'a str>) {
    if let Some(tourism) = tags.tourism {
        let category = match tourism {
            "viewpoint" => PoiCategory::Viewpoint,
            "museum" | "gallery" => PoiCategory::Museum,
            _ => PoiCategory::Tourism,
        };
        return (category, Some(tourism));
    }
    if let Some(historic) = tags.historic {
        return (PoiCategory::Historic, Some(historic));
    }
    if let Some(natural) = tags.natural {
        let category = if natural == "beach" {
            PoiCategory::Beach
        } else {
            PoiCategory::Nature
        };
        return (category, Some(natural));
    }
    if let Some(leisure) = tags.leisure {
        return (PoiCategory::Leisure, Some(leisure));
    }
    if let Some(amenity) = tags.amenity {
        let category = if FOOD_AMENITIES.contains(&amenity) {
            PoiCategory::Food
        } else if amenity == "place_of_worship" {
            PoiCategory::Religious
        } else {
            PoiCategory::Amenity
        };
        return (category, Some(amenity));
    }
    if let Some(shop) = tags.shop {
        return (PoiCategory::Shopping, Some(shop));
    }
    (PoiCategory::Other, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn category(pairs: &[(&str, &str)]) -> PoiCategory {
        classify(&tags(pairs)).category
    }

    #[test]
    fn test_tourism_variants() {
        assert_eq!(category(&[("tourism", "viewpoint")]), PoiCategory::Viewpoint);
        assert_eq!(category(&[("tourism", "museum")]), PoiCategory::Museum);
        assert_eq!(category(&[("tourism", "gallery")]), PoiCategory::Museum);
        assert_eq!(category(&[("tourism", "attraction")]), PoiCategory::Tourism);
    }

    #[test]
    fn test_tourism_wins_over_amenity() {
        let c = classify(&tags(&[("amenity", "restaurant"), ("tourism", "attraction")]));
        assert_eq!(c.category, PoiCategory::Tourism);
        assert_eq!(c.poi_type, "attraction");
    }

    #[test]
    fn test_historic_wins_over_religious_amenity() {
        let c = category(&[("amenity", "place_of_worship"), ("historic", "church")]);
        assert_eq!(c, PoiCategory::Historic);
    }

    #[test]
    fn test_natural_variants() {
        assert_eq!(category(&[("natural", "beach")]), PoiCategory::Beach);
        assert_eq!(category(&[("natural", "peak")]), PoiCategory::Nature);
        assert_eq!(category(&[("natural", "beach"), ("leisure", "park")]), PoiCategory::Beach);
    }

    #[test]
    fn test_amenity_variants() {
        assert_eq!(category(&[("amenity", "cafe")]), PoiCategory::Food);
        assert_eq!(category(&[("amenity", "place_of_worship")]), PoiCategory::Religious);
        assert_eq!(category(&[("amenity", "theatre")]), PoiCategory::Amenity);
        assert_eq!(category(&[("amenity", "bar"), ("shop", "wine")]), PoiCategory::Food);
    }

    #[test]
    fn test_leisure_before_amenity_and_shop() {
        assert_eq!(category(&[("leisure", "park"), ("amenity", "toilets")]), PoiCategory::Leisure);
        assert_eq!(category(&[("shop", "books")]), PoiCategory::Shopping);
    }

    #[test]
    fn test_unrecognised_keys_default_to_other() {
        let c = classify(&tags(&[("building", "yes"), ("name", "Somewhere")]));
        assert_eq!(c.category, PoiCategory::Other);
        assert_eq!(c.poi_type, "unknown");
    }

    #[test]
    fn test_empty_and_no_values_are_ignored() {
        assert_eq!(category(&[("tourism", ""), ("shop", "bakery")]), PoiCategory::Shopping);
        assert_eq!(category(&[("historic", "no")]), PoiCategory::Other);
    }

    #[test]
    fn test_recognised_tags_accessor() {
        let map = tags(&[("tourism", "museum"), ("shop", "gift")]);
        let recognised = RecognisedTags::from_tags(&map);
        let present: Vec<_> = TagKey::ALL
            .iter()
            .filter(|k| recognised.get(**k).is_some())
            .map(|k| k.as_str())
            .collect();
        assert_eq!(present, vec!["tourism", "shop"]);
    }
}
