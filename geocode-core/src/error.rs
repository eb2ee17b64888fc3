use thiserror::Error;

/// Message used when the service rejects a query without saying why.
pub const DEFAULT_NOT_SUPPORTED: &str = "Query not supported";

/// Message used when a failed HTTP exchange carries no reason phrase.
pub const DEFAULT_NETWORK_FAILURE: &str = "Query failed";

/// Terminal failure of a single resolution attempt.
///
/// None of these are retried. Cache read and write failures never show up
/// here: a failed read is a miss and a failed write is only logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// The service answered with an `error` field.
    #[error("{0}")]
    NotSupported(String),

    /// Non-success HTTP status or a transport-level fault.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The body was not JSON, or not a JSON object.
    #[error("failed to parse response: {0}")]
    ParseFailure(String),

    /// The caller cancelled before the network stage started.
    #[error("resolution cancelled")]
    Cancelled,

    /// A local fault while driving the resolution, e.g. no runtime could be started.
    #[error("resolver runtime failure: {0}")]
    Runtime(String),
}

impl ResolutionError {
    pub fn is_network(&self) -> bool {
        matches!(self, ResolutionError::NetworkFailure(_))
    }
}

impl From<serde_json::Error> for ResolutionError {
    fn from(err: serde_json::Error) -> Self {
        ResolutionError::ParseFailure(err.to_string())
    }
}
