use async_trait::async_trait;
use hyper::ext::ReasonPhrase;
use reqwest::{Client, StatusCode, header};
use std::time::Duration;
use tracing::debug;

use crate::error::DEFAULT_NETWORK_FAILURE;
use crate::{CacheKey, RawResponse, ResolutionError};

use super::Fetcher;

const USER_AGENT: &str = concat!("geocode/", env!("CARGO_PKG_VERSION"));

/// [`Fetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .default_headers(default_headers())
            .build()?;

        Ok(Self { http })
    }

    /// Reuse an existing client, e.g. one shared with other services.
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

fn default_headers() -> header::HeaderMap {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    headers
}

/// Text carried by a non-OK status.
///
/// The phrase the server sent wins; otherwise the canonical phrase for the
/// code, otherwise a generic message.
pub fn status_failure(status: StatusCode, phrase: Option<&str>) -> ResolutionError {
    let reason = phrase
        .map(str::trim)
        .filter(|phrase| !phrase.is_empty())
        .or_else(|| status.canonical_reason())
        .unwrap_or(DEFAULT_NETWORK_FAILURE);
    ResolutionError::NetworkFailure(reason.to_string())
}

/// Reason phrase as received, when it differs from the canonical one.
fn received_phrase(res: &reqwest::Response) -> Option<String> {
    res.extensions()
        .get::<ReasonPhrase>()
        .map(|phrase| String::from_utf8_lossy(phrase.as_bytes()).into_owned())
}

fn transport_failure(err: reqwest::Error) -> ResolutionError {
    ResolutionError::NetworkFailure(err.to_string())
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, key: &CacheKey) -> Result<RawResponse, ResolutionError> {
        debug!(url = %key, "fetching");

        let res = self
            .http
            .get(key.as_str())
            .send()
            .await
            .map_err(transport_failure)?;

        let status = res.status();
        if status != StatusCode::OK {
            let phrase = received_phrase(&res);
            debug!(url = %key, %status, phrase = phrase.as_deref(), "request failed");
            return Err(status_failure(status, phrase.as_deref()));
        }

        let body = res.bytes().await.map_err(transport_failure)?;
        Ok(RawResponse::from(body.to_vec()))
    }
}
