//! Renaming of Nominatim field names into the canonical attribute vocabulary.

use serde_json::{Map, Value};
use tracing::debug;

use crate::model::AttributeMap;

/// Nominatim field -> canonical name. `None` keeps the field name as-is.
pub static RENAMING_TABLE: &[(&str, Option<&str>)] = &[
    ("license", None),
    ("osm_type", None),
    ("osm_id", None),
    ("lat", None),
    ("lon", None),
    ("display_name", Some("description")),
    ("house_number", Some("building")),
    ("road", Some("street")),
    ("suburb", Some("area")),
    ("city", Some("locality")),
    ("county", None),
    ("state_district", None),
    ("state", Some("region")),
    ("postcode", Some("postalcode")),
    ("country", Some("country")),
    ("country_code", Some("countrycode")),
    ("continent", None),
    ("address", None),
];

/// Canonical name for a service field.
pub fn canonical_name(field: &str) -> &str {
    match RENAMING_TABLE.iter().find(|(source, _)| *source == field) {
        Some((_, Some(canonical))) => *canonical,
        Some((_, None)) => field,
        None => {
            debug!(attribute = field, "unknown attribute, keeping its name");
            field
        }
    }
}

/// Merge one level of a response object into `out`.
///
/// Only non-empty string values are taken; numbers, booleans, nulls and
/// nested containers are skipped. Later calls overwrite earlier values under
/// the same canonical name.
pub fn normalize_into(object: &Map<String, Value>, out: &mut AttributeMap) {
    for (field, value) in object {
        let Some(value) = value.as_str().filter(|s| !s.is_empty()) else {
            continue;
        };

        out.insert(canonical_name(field).to_string(), value.to_string());
    }
}
