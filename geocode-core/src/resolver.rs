//! Cache-first resolution pipeline.
//!
//! ```text
//! Init -> CacheLookup -> hit  -> Parsing -> Done | Failed
//!                     -> miss -> Fetching -> Parsing -> (cache write) Done | Failed
//! ```
//!
//! A cached entry is authoritative: if it fails to parse the attempt fails
//! with that error and the network is not consulted. The cache is only
//! written after a fetched body parsed successfully.

use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::locale::{FixedLocale, LocaleSource, SystemLocale};
use crate::parser::parse_response;
use crate::query::QueryBuilder;
use crate::runtime;
use crate::{AttributeMap, CacheKey, Location, ResolutionError};

type Resolution = Result<AttributeMap, ResolutionError>;

/// Resolves queries against a geocoding endpoint through the cache.
///
/// Cloning is cheap; clones share the fetcher, the cache and the locale source.
#[derive(Debug, Clone)]
pub struct Resolver {
    endpoint: Arc<str>,
    contact_email: Arc<str>,
    fetcher: Arc<dyn Fetcher>,
    cache: CacheStore,
    locale: Arc<dyn LocaleSource>,
}

impl Resolver {
    pub fn new(
        endpoint: impl Into<String>,
        contact_email: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
        cache: CacheStore,
        locale: Arc<dyn LocaleSource>,
    ) -> Self {
        let endpoint: String = endpoint.into();
        let contact_email: String = contact_email.into();

        Self {
            endpoint: Arc::from(endpoint),
            contact_email: Arc::from(contact_email),
            fetcher,
            cache,
            locale,
        }
    }

    /// HTTP fetcher, cache and locale as described by `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let fetcher = HttpFetcher::new(config.timeout())?;

        let cache = if config.cache_enabled {
            CacheStore::new(config.resolved_cache_dir()?)
        } else {
            CacheStore::disabled()
        };

        let locale: Arc<dyn LocaleSource> = match &config.language {
            Some(language) => Arc::new(FixedLocale(Some(language.clone()))),
            None => Arc::new(SystemLocale),
        };

        Ok(Self::new(
            config.endpoint.clone(),
            config.contact_email.clone(),
            Arc::new(fetcher),
            cache,
            locale,
        ))
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// The request identity `builder` resolves to, defaults included.
    pub fn cache_key(&self, builder: QueryBuilder) -> CacheKey {
        let query = builder.build(&self.contact_email, self.locale.as_ref());
        CacheKey::new(&self.endpoint, &query)
    }

    pub async fn resolve(&self, builder: QueryBuilder) -> Resolution {
        self.resolve_with_cancel(builder, &CancellationToken::new())
            .await
    }

    /// Like [`Resolver::resolve`], but gives up with
    /// [`ResolutionError::Cancelled`] if `cancel` fires during the cache
    /// lookup. Once the fetch has started the attempt runs to completion.
    pub async fn resolve_with_cancel(
        &self,
        builder: QueryBuilder,
        cancel: &CancellationToken,
    ) -> Resolution {
        let key = self.cache_key(builder);

        let lookup = async {
            let path = self.cache.path_for(&key).await;
            let cached = match &path {
                Some(path) => self.cache.lookup(path).await,
                None => None,
            };
            (path, cached)
        };

        let (path, cached) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(url = %key, "resolution cancelled during cache lookup");
                return Err(ResolutionError::Cancelled);
            }
            found = lookup => found,
        };

        if let Some(raw) = cached {
            return parse_response(&raw);
        }

        let raw = self.fetcher.fetch(&key).await?;
        let attributes = parse_response(&raw)?;

        if let Some(path) = &path {
            self.cache.store(path, &raw).await;
        }

        Ok(attributes)
    }

    /// Blocking variant of [`Resolver::resolve`].
    pub fn resolve_blocking(&self, builder: QueryBuilder) -> Resolution {
        let this = self.clone();
        runtime::block_on(async move { this.resolve(builder).await })
    }

    /// Start resolving in the background. Must be called within a Tokio runtime.
    pub fn spawn_resolve(&self, builder: QueryBuilder) -> PendingResolution {
        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let this = self.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            let result = this.resolve_with_cancel(builder, &token).await;
            // The receiver may be gone; nobody is waiting for the result then.
            let _ = tx.send(result);
        });

        PendingResolution { rx, cancel }
    }

    pub async fn reverse(&self, location: &Location, language: Option<&str>) -> Resolution {
        self.resolve(reverse_query(location, language)).await
    }

    pub fn reverse_blocking(&self, location: &Location, language: Option<&str>) -> Resolution {
        self.resolve_blocking(reverse_query(location, language))
    }
}

fn reverse_query(location: &Location, language: Option<&str>) -> QueryBuilder {
    let builder = QueryBuilder::for_location(location);
    match language {
        Some(language) => builder.with_language(language),
        None => builder,
    }
}

/// A resolution running in the background. Yields its result exactly once.
#[derive(Debug)]
pub struct PendingResolution {
    rx: oneshot::Receiver<Resolution>,
    cancel: CancellationToken,
}

impl PendingResolution {
    /// Request cancellation. Only effective while the cache lookup is pending.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> Resolution {
        self.rx.await.unwrap_or(Err(ResolutionError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RawResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    const GUILDFORD: &str = r#"{"display_name": "The Astolat, Old Palace Road", "address": {"road": "Old Palace Road", "city": "Guildford", "postcode": "GU2 7UP", "country_code": "gb"}}"#;

    /// Serves canned bodies keyed by a substring of the request URI.
    #[derive(Debug, Default)]
    struct FakeFetcher {
        calls: AtomicUsize,
        routes: Mutex<Vec<(String, Result<RawResponse, ResolutionError>)>>,
        started: Notify,
        gate: Option<Notify>,
    }

    impl FakeFetcher {
        fn route(self, needle: &str, response: Result<&str, ResolutionError>) -> Self {
            self.routes
                .lock()
                .unwrap()
                .push((needle.to_string(), response.map(RawResponse::from)));
            self
        }

        fn gated(mut self) -> Self {
            self.gate = Some(Notify::new());
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, key: &CacheKey) -> Result<RawResponse, ResolutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.started.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            self.routes
                .lock()
                .unwrap()
                .iter()
                .find(|(needle, _)| key.as_str().contains(needle.as_str()))
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| Err(ResolutionError::NetworkFailure("Not Found".into())))
        }
    }

    fn resolver(fetcher: Arc<FakeFetcher>, cache: CacheStore) -> Resolver {
        Resolver::new(
            "https://nominatim.example/reverse",
            "tests@example.org",
            fetcher,
            cache,
            Arc::new(FixedLocale(None)),
        )
    }

    fn guildford() -> Location {
        Location::new(51.237070, -0.589669).expect("valid location")
    }

    fn cached_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(dir)
            .map(|entries| entries.map(|e| e.expect("entry").path()).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn second_resolution_is_served_from_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = Arc::new(FakeFetcher::default().route("lat=51.2371", Ok(GUILDFORD)));
        let resolver = resolver(fetcher.clone(), CacheStore::new(dir.path()));

        let first = resolver.reverse(&guildford(), None).await.expect("first");
        let second = resolver.reverse(&guildford(), None).await.expect("second");

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(first["locality"], "Guildford");
        assert_eq!(first["postalcode"], "GU2 7UP");
    }

    #[tokio::test]
    async fn cache_file_holds_the_exact_response_body() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = Arc::new(FakeFetcher::default().route("lat=", Ok(GUILDFORD)));
        let resolver = resolver(fetcher, CacheStore::new(dir.path()));

        resolver.reverse(&guildford(), None).await.expect("resolve");

        let key = resolver.cache_key(QueryBuilder::for_location(&guildford()));
        let path = dir.path().join(CacheStore::file_name(&key));
        assert_eq!(std::fs::read(path).expect("cache file"), GUILDFORD.as_bytes());
    }

    #[tokio::test]
    async fn corrupt_cache_entry_is_authoritative() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = Arc::new(FakeFetcher::default().route("lat=", Ok(GUILDFORD)));
        let resolver = resolver(fetcher.clone(), CacheStore::new(dir.path()));

        let key = resolver.cache_key(QueryBuilder::for_location(&guildford()));
        let path = dir.path().join(CacheStore::file_name(&key));
        std::fs::write(&path, b"{ not json").expect("seed cache");

        let err = resolver.reverse(&guildford(), None).await.unwrap_err();

        assert!(matches!(err, ResolutionError::ParseFailure(_)));
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(std::fs::read(&path).expect("cache file"), b"{ not json");
    }

    #[tokio::test]
    async fn service_errors_are_not_cached() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = Arc::new(
            FakeFetcher::default().route("lat=", Ok(r#"{"error": "Unable to geocode"}"#)),
        );
        let resolver = resolver(fetcher.clone(), CacheStore::new(dir.path()));

        for _ in 0..2 {
            let err = resolver.reverse(&guildford(), None).await.unwrap_err();
            assert_eq!(err, ResolutionError::NotSupported("Unable to geocode".into()));
        }

        assert_eq!(fetcher.calls(), 2);
        assert!(cached_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn network_failures_are_terminal_and_not_cached() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = Arc::new(FakeFetcher::default().route(
            "lat=",
            Err(ResolutionError::NetworkFailure("Bad Gateway".into())),
        ));
        let resolver = resolver(fetcher.clone(), CacheStore::new(dir.path()));

        let err = resolver.reverse(&guildford(), None).await.unwrap_err();

        assert_eq!(err, ResolutionError::NetworkFailure("Bad Gateway".into()));
        assert_eq!(fetcher.calls(), 1);
        assert!(cached_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn disabled_cache_always_fetches() {
        let fetcher = Arc::new(FakeFetcher::default().route("lat=", Ok(GUILDFORD)));
        let resolver = resolver(fetcher.clone(), CacheStore::disabled());

        resolver.reverse(&guildford(), None).await.expect("first");
        resolver.reverse(&guildford(), None).await.expect("second");

        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn language_is_part_of_the_cache_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = Arc::new(FakeFetcher::default().route("lat=", Ok(GUILDFORD)));
        let resolver = resolver(fetcher.clone(), CacheStore::new(dir.path()));

        resolver.reverse(&guildford(), Some("en")).await.expect("en");
        resolver.reverse(&guildford(), Some("fr")).await.expect("fr");
        resolver.reverse(&guildford(), Some("en")).await.expect("en again");

        assert_eq!(fetcher.calls(), 2);
        assert_eq!(cached_files(dir.path()).len(), 2);
    }

    #[test]
    fn blocking_and_async_share_the_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = Arc::new(FakeFetcher::default().route("lat=", Ok(GUILDFORD)));
        let resolver = resolver(fetcher.clone(), CacheStore::new(dir.path()));

        let blocking = resolver.reverse_blocking(&guildford(), None).expect("blocking");

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let awaited = rt
            .block_on(resolver.reverse(&guildford(), None))
            .expect("async");

        assert_eq!(blocking, awaited);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_resolutions_do_not_interfere() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = Arc::new(
            FakeFetcher::default()
                .route("lat=51.2371", Ok(GUILDFORD))
                .route("lat=48.8584", Ok(r#"{"address": {"city": "Paris", "country_code": "fr"}}"#)),
        );
        let resolver = resolver(fetcher.clone(), CacheStore::new(dir.path()));
        let paris = Location::new(48.8584, 2.2945).expect("valid location");

        let a = resolver.spawn_resolve(QueryBuilder::for_location(&guildford()));
        let b = resolver.spawn_resolve(QueryBuilder::for_location(&paris));

        let (a, b) = tokio::join!(a.wait(), b.wait());

        assert_eq!(a.expect("guildford")["locality"], "Guildford");
        let b = b.expect("paris");
        assert_eq!(b["locality"], "Paris");
        assert_eq!(b["countrycode"], "fr");
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn cancelled_before_lookup_never_fetches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = Arc::new(FakeFetcher::default().route("lat=", Ok(GUILDFORD)));
        let resolver = resolver(fetcher.clone(), CacheStore::new(dir.path()));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = resolver
            .resolve_with_cancel(QueryBuilder::for_location(&guildford()), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err, ResolutionError::Cancelled);
        assert_eq!(fetcher.calls(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_while_cache_read_is_pending() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = Arc::new(FakeFetcher::default().route("lat=", Ok(GUILDFORD)));
        let resolver = resolver(fetcher.clone(), CacheStore::new(dir.path()));

        // A FIFO as the cache entry: reading it blocks until a writer shows up.
        let key = resolver.cache_key(QueryBuilder::for_location(&guildford()));
        let path = dir.path().join(CacheStore::file_name(&key));
        let status = std::process::Command::new("mkfifo")
            .arg(&path)
            .status()
            .expect("run mkfifo");
        assert!(status.success());

        let pending = resolver.spawn_resolve(QueryBuilder::for_location(&guildford()));

        // Opening the write end only returns once the resolver has opened the
        // read end, so the lookup is in flight from here on.
        let writer = tokio::task::spawn_blocking(move || {
            std::fs::OpenOptions::new().write(true).open(path)
        })
        .await
        .expect("join")
        .expect("open fifo for writing");

        pending.cancel();
        let result = pending.wait().await;
        drop(writer);

        assert_eq!(result, Err(ResolutionError::Cancelled));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn cancellation_is_ignored_once_fetching() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = Arc::new(FakeFetcher::default().route("lat=", Ok(GUILDFORD)).gated());
        let resolver = resolver(fetcher.clone(), CacheStore::new(dir.path()));

        let pending = resolver.spawn_resolve(QueryBuilder::for_location(&guildford()));
        fetcher.started.notified().await;
        pending.cancel();
        if let Some(gate) = &fetcher.gate {
            gate.notify_one();
        }

        let attrs = pending.wait().await.expect("runs to completion");
        assert_eq!(attrs["street"], "Old Palace Road");
        assert_eq!(cached_files(dir.path()).len(), 1);
    }
}
