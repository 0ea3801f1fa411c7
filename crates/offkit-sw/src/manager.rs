//! The cache manager: install, activate, routing policy, control messages.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};

use offkit_cache::{CacheError, CacheStorage};

use crate::clients::Clients;
use crate::events::{
    parse_control_message, ControlCommand, FetchEvent, FetchResponse, RespondWith, ResponseKind,
    RouteOutcome,
};
use crate::SwError;

// ==================== Fetcher ====================

/// Network seam: how the worker reaches the origin server.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a request from the network.
    async fn fetch(&self, event: &FetchEvent) -> Result<FetchResponse, SwError>;
}

// ==================== Configuration ====================

/// Static-asset extensions eligible for caching on a network miss.
pub const CACHEABLE_EXTENSIONS: &[&str] = &[
    "js", "css", "woff2", "png", "jpg", "jpeg", "gif", "svg", "webp",
];

/// Whether a URL path ends in a cacheable static-asset extension.
pub fn has_cacheable_extension(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit_once('.') {
        Some((_, ext)) => CACHEABLE_EXTENSIONS
            .iter()
            .any(|c| ext.eq_ignore_ascii_case(c)),
        None => false,
    }
}

/// Configuration for one worker version's cache manager.
#[derive(Debug, Clone)]
pub struct CacheManagerConfig {
    /// Name of the cache instance this version owns; bumped per deploy.
    pub cache_version: String,

    /// URLs guaranteed available offline after install.
    pub precache_manifest: Vec<String>,

    /// Document served when a navigation fails with nothing cached for it.
    pub offline_fallback: String,

    /// Whether install signals immediate activation eligibility.
    /// Trades version-consistency risk for update latency.
    pub skip_waiting_on_install: bool,
}

impl CacheManagerConfig {
    /// Create a configuration with the fast-update defaults.
    pub fn new(cache_version: &str, precache_manifest: Vec<String>) -> Self {
        Self {
            cache_version: cache_version.to_string(),
            precache_manifest,
            offline_fallback: "/index.html".to_string(),
            skip_waiting_on_install: true,
        }
    }

    /// Override the offline fallback document.
    pub fn with_offline_fallback(mut self, url: &str) -> Self {
        self.offline_fallback = url.to_string();
        self
    }

    /// Override the skip-waiting policy.
    pub fn with_skip_waiting(mut self, skip: bool) -> Self {
        self.skip_waiting_on_install = skip;
        self
    }
}

// ==================== Outcomes ====================

/// Outcome of a successful install, signalled to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Wait for existing clients to release the previous version.
    Waiting,
    /// Immediately eligible for activation.
    SkipWaiting,
}

/// Result of the activation cleanup pass.
///
/// Deletions are independent; failures are captured per instance and do not
/// block the rest of the pass.
#[derive(Debug, Default)]
pub struct ActivationReport {
    /// Stale instances that were removed.
    pub removed: Vec<String>,

    /// Stale instances whose removal failed; retried on the next activation.
    pub failures: Vec<(String, CacheError)>,
}

impl ActivationReport {
    /// Whether every stale instance was removed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// ==================== Cache Manager ====================

/// The service-worker core for one worker version.
///
/// Owns the cache instance named by its version; shares the storage area
/// and the client registry with the host and with other versions.
pub struct CacheManager {
    config: CacheManagerConfig,
    storage: CacheStorage,
    clients: Arc<RwLock<Clients>>,
    fetcher: Arc<dyn Fetcher>,
}

impl CacheManager {
    /// Create a manager for one worker version.
    pub fn new(
        config: CacheManagerConfig,
        storage: CacheStorage,
        clients: Arc<RwLock<Clients>>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            storage,
            clients,
            fetcher,
        }
    }

    /// The cache version this manager owns.
    pub fn cache_version(&self) -> &str {
        &self.config.cache_version
    }

    /// Install: populate the precache manifest, all-or-nothing.
    ///
    /// Every manifest URL is fetched before anything is stored, so a failed
    /// install leaves no partial instance behind. On success the returned
    /// outcome tells the host whether to bypass the waiting period.
    pub async fn install(&self) -> Result<InstallOutcome, SwError> {
        info!(
            version = %self.config.cache_version,
            entries = self.config.precache_manifest.len(),
            "installing"
        );

        let mut entries = Vec::with_capacity(self.config.precache_manifest.len());
        for url in &self.config.precache_manifest {
            let event = FetchEvent::get(url);
            let response = self.fetcher.fetch(&event).await.map_err(|err| {
                SwError::Precache {
                    url: url.clone(),
                    reason: err.to_string(),
                }
            })?;
            if !response.ok() {
                return Err(SwError::Precache {
                    url: url.clone(),
                    reason: format!("status {}", response.status),
                });
            }
            entries.push(response.to_entry(&event));
        }

        let cache = self.storage.open(&self.config.cache_version).await;
        cache.put_all(entries).await;
        debug!(version = %self.config.cache_version, "precache populated");

        Ok(if self.config.skip_waiting_on_install {
            InstallOutcome::SkipWaiting
        } else {
            InstallOutcome::Waiting
        })
    }

    /// Activate: evict every instance that is not the current version, then
    /// claim all open clients.
    pub async fn activate(&self) -> ActivationReport {
        let mut report = ActivationReport::default();

        for name in self.storage.names().await {
            if name == self.config.cache_version {
                continue;
            }
            match self.storage.delete(&name).await {
                Ok(_) => {
                    info!(cache = %name, "deleted stale cache");
                    report.removed.push(name);
                }
                Err(err) => {
                    warn!(cache = %name, error = %err, "failed to delete stale cache");
                    report.failures.push((name, err));
                }
            }
        }

        self.clients.write().await.claim(&self.config.cache_version);
        report
    }

    /// Route an intercepted request.
    ///
    /// Only GET is intercepted. Policy: cache lookup first; on a hit return
    /// immediately (navigations also get a background revalidation handle);
    /// on a miss fetch the network, caching eligible static assets; on a
    /// total network failure serve the offline fallback for navigations and
    /// propagate the error otherwise.
    pub async fn route(&self, event: FetchEvent) -> Result<RouteOutcome, SwError> {
        if !event.is_get() {
            trace!(method = %event.method, url = %event.url, "not intercepted");
            return Ok(RouteOutcome::Passthrough);
        }

        let current = self.storage.get(&self.config.cache_version).await;

        if let Some(cache) = &current {
            if let Some(entry) = cache.lookup(&event.method, &event.url).await {
                debug!(url = %event.url, "cache hit");
                let background = event
                    .is_navigation
                    .then(|| self.revalidate_task(event.clone()));
                return Ok(RouteOutcome::Respond(RespondWith {
                    response: FetchResponse::from_entry(&entry),
                    background,
                }));
            }
        }

        match self.fetcher.fetch(&event).await {
            Ok(response) => {
                if self.should_cache(&event, &response) {
                    // Independent copy; the original response goes back to
                    // the caller untouched.
                    let entry = response.to_entry(&event);
                    self.storage
                        .open(&self.config.cache_version)
                        .await
                        .put(entry)
                        .await;
                    trace!(url = %event.url, "stored network response");
                }
                Ok(RouteOutcome::Respond(RespondWith {
                    response,
                    background: None,
                }))
            }
            Err(err) => {
                if event.is_navigation {
                    if let Some(cache) = &current {
                        if let Some(entry) =
                            cache.lookup("GET", &self.config.offline_fallback).await
                        {
                            warn!(url = %event.url, "network failed, serving offline fallback");
                            return Ok(RouteOutcome::Respond(RespondWith {
                                response: FetchResponse::from_entry(&entry),
                                background: None,
                            }));
                        }
                    }
                }
                Err(err)
            }
        }
    }

    /// Handle a raw control message.
    ///
    /// Recognizes the skip-waiting request; every other shape is ignored.
    pub fn handle_message(&self, raw: &str) -> Option<ControlCommand> {
        let command = parse_control_message(raw);
        if command.is_some() {
            debug!(version = %self.config.cache_version, "skip-waiting requested");
        }
        command
    }

    fn should_cache(&self, event: &FetchEvent, response: &FetchResponse) -> bool {
        response.ok()
            && response.kind == ResponseKind::Basic
            && has_cacheable_extension(&event.url)
    }

    /// Background refresh for a navigation served from cache. Failures are
    /// silent; the entry stays until the next successful revalidation.
    fn revalidate_task(&self, event: FetchEvent) -> BoxFuture<'static, ()> {
        let storage = self.storage.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let cache_version = self.config.cache_version.clone();

        async move {
            match fetcher.fetch(&event).await {
                Ok(response) => {
                    let entry = response.to_entry(&event);
                    storage.open(&cache_version).await.put(entry).await;
                    trace!(url = %event.url, "revalidated");
                }
                Err(err) => {
                    debug!(url = %event.url, error = %err, "background refresh failed");
                }
            }
        }
        .boxed()
    }
}
