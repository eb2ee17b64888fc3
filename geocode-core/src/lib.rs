//! Core library for the `geocode` CLI.
//!
//! This crate defines:
//! - Query building and the request identity used for caching
//! - Normalization of Nominatim responses into canonical attributes
//! - A flat on-disk response cache
//! - The cache-first resolver, with async, blocking and spawned entry points
//!
//! It is used by `geocode-cli`, but can also be reused by other binaries or services.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod locale;
pub mod model;
pub mod normalize;
pub mod parser;
pub mod query;
pub mod resolver;
mod runtime;

pub use cache::CacheStore;
pub use config::Config;
pub use error::ResolutionError;
pub use fetcher::{Fetcher, HttpFetcher};
pub use locale::{FixedLocale, LocaleSource, SystemLocale};
pub use model::{AttributeMap, CacheKey, Location, Query, RawResponse};
pub use parser::parse_response;
pub use query::QueryBuilder;
pub use resolver::{PendingResolution, Resolver};
pub use tokio_util::sync::CancellationToken;
