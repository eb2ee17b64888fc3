use async_trait::async_trait;
use std::fmt::Debug;

use crate::{CacheKey, RawResponse, ResolutionError};

pub mod http;

pub use http::HttpFetcher;

/// Performs the single network request of a resolution.
///
/// Implementations make exactly one attempt and map every failure to
/// [`ResolutionError::NetworkFailure`].
#[async_trait]
pub trait Fetcher: Send + Sync + Debug {
    async fn fetch(&self, key: &CacheKey) -> Result<RawResponse, ResolutionError>;
}
