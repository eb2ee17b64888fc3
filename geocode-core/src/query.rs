use crate::locale::LocaleSource;
use crate::model::{Location, Query, format_coordinate};

pub const PARAM_LATITUDE: &str = "lat";
pub const PARAM_LONGITUDE: &str = "lon";
pub const PARAM_LANGUAGE: &str = "accept-language";

/// Assembles the outbound parameter set.
///
/// Caller-supplied parameters always win over the service defaults.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    params: Query,
}

impl QueryBuilder {
    pub fn for_location(location: &Location) -> Self {
        let mut params = Query::new();
        params.set(PARAM_LATITUDE, format_coordinate(location.latitude));
        params.set(PARAM_LONGITUDE, format_coordinate(location.longitude));
        Self { params }
    }

    /// Start from arbitrary caller parameters, e.g. a free-form `q`.
    ///
    /// Empty values count as not supplied.
    pub fn for_params<I, K, V>(params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        params
            .into_iter()
            .fold(Self::default(), |builder, (key, value)| builder.with_param(key, value))
    }

    /// Add a caller parameter. An empty value is ignored.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.params.set(key, value);
        }
        self
    }

    pub fn with_language(self, language: impl Into<String>) -> Self {
        self.with_param(PARAM_LANGUAGE, language)
    }

    /// Inject `format`, `email`, `addressdetails` and, when the caller did not
    /// pick one, the locale's language.
    pub fn build(self, contact_email: &str, locale: &dyn LocaleSource) -> Query {
        let mut query = self.params;

        query.set_default("format", "json");
        query.set_default("email", contact_email);
        query.set_default("addressdetails", "1");

        if !query.contains(PARAM_LANGUAGE) {
            if let Some(language) = locale.language().filter(|tag| !tag.is_empty()) {
                query.set(PARAM_LANGUAGE, language);
            }
        }

        query
    }
}
