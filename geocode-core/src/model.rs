use anyhow::{Result, bail};
use std::collections::BTreeMap;
use std::fmt;

/// Canonical attribute name -> value, as handed back to callers.
pub type AttributeMap = BTreeMap<String, String>;

/// A point on the globe, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            bail!("Invalid latitude {latitude}: expected a value between -90 and 90");
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            bail!("Invalid longitude {longitude}: expected a value between -180 and 180");
        }

        Ok(Self { latitude, longitude })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", format_coordinate(self.latitude), format_coordinate(self.longitude))
    }
}

/// Format a coordinate with six significant digits, trailing zeros trimmed.
///
/// This is what ends up on the wire, so it is also part of the cache key.
pub fn format_coordinate(value: f64) -> String {
    const SIGNIFICANT: i32 = 6;

    if value == 0.0 {
        return "0".to_string();
    }

    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (SIGNIFICANT - 1 - magnitude).max(0) as usize;
    let mut out = format!("{value:.decimals$}");

    if out.contains('.') {
        let trimmed = out.trim_end_matches('0').trim_end_matches('.').len();
        out.truncate(trimmed);
    }
    if out == "-0" {
        out = "0".to_string();
    }

    out
}

/// Outbound request parameters.
///
/// Keys are unique and iterate in sorted order, so the encoded form is stable
/// no matter in which order parameters were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    params: BTreeMap<String, String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Set a parameter only if it is not present yet.
    pub fn set_default(&mut self, key: &str, value: &str) {
        self.params
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `application/x-www-form-urlencoded` rendering of the parameters.
    pub fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.iter())
            .finish()
    }
}

/// Identity of a request: the full URI it is sent to.
///
/// Used verbatim as the HTTP request target and hashed for the cache path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(endpoint: &str, query: &Query) -> Self {
        let encoded = query.encode();
        if encoded.is_empty() {
            Self(endpoint.to_string())
        } else {
            Self(format!("{endpoint}?{encoded}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response body bytes, exactly as received or as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse(Vec<u8>);

impl RawResponse {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for RawResponse {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for RawResponse {
    fn from(body: &str) -> Self {
        Self(body.as_bytes().to_vec())
    }
}
