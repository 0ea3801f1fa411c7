//! The browser-host driver: lifecycle sequencing and event dispatch.
//!
//! Models the host side of the event contract: install always precedes
//! activate for a version, activate precedes fetch interception, and every
//! handler's background work is surfaced as an explicit awaitable handle.

use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use offkit_cache::CacheStorage;

use crate::clients::Clients;
use crate::events::{ControlCommand, FetchEvent, RouteOutcome};
use crate::manager::{
    ActivationReport, CacheManager, CacheManagerConfig, Fetcher, InstallOutcome,
};
use crate::registration::Registration;
use crate::SwError;

/// Drives worker versions through their lifecycle and delivers events to
/// the active one.
pub struct WorkerHost {
    storage: CacheStorage,
    clients: Arc<RwLock<Clients>>,
    registration: RwLock<Registration>,
    workers: RwLock<HashMap<String, Arc<CacheManager>>>,
}

impl WorkerHost {
    /// Create a host with a fresh storage area and client registry.
    pub fn new() -> Self {
        Self {
            storage: CacheStorage::new(),
            clients: Arc::new(RwLock::new(Clients::new())),
            registration: RwLock::new(Registration::new()),
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// Handle to the shared storage area.
    pub fn storage(&self) -> CacheStorage {
        self.storage.clone()
    }

    /// Register an open page. It starts out controlled by the currently
    /// active version, if one exists.
    pub async fn connect_client(&self, id: &str, url: &str) {
        let controller = self
            .registration
            .read()
            .await
            .active_version()
            .map(str::to_string);
        self.clients
            .write()
            .await
            .add(id, url, controller.as_deref());
    }

    /// Number of pages controlled by the given version.
    pub async fn controlled_clients(&self, version: &str) -> usize {
        self.clients.read().await.controlled_by(version)
    }

    /// Cache version of the active worker, if any.
    pub async fn active_version(&self) -> Option<String> {
        self.registration
            .read()
            .await
            .active_version()
            .map(str::to_string)
    }

    /// Cache version of the waiting worker, if any.
    pub async fn waiting_version(&self) -> Option<String> {
        self.registration
            .read()
            .await
            .waiting_version()
            .map(str::to_string)
    }

    /// Register a new worker version and run its install event.
    ///
    /// A failed install discards the version (it never becomes eligible to
    /// activate). On success, the skip-waiting policy decides whether
    /// activation runs immediately; the activation report is returned when
    /// it does.
    pub async fn register(
        &self,
        config: CacheManagerConfig,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Option<ActivationReport>, SwError> {
        let version = config.cache_version.clone();
        let manager = Arc::new(CacheManager::new(
            config,
            self.storage.clone(),
            Arc::clone(&self.clients),
            fetcher,
        ));

        self.registration.write().await.begin_install(&version);

        match manager.install().await {
            Ok(outcome) => {
                self.workers.write().await.insert(version.clone(), manager);
                self.registration.write().await.install_complete();
                info!(version = %version, "worker installed");

                if outcome == InstallOutcome::SkipWaiting {
                    Ok(self.activate_waiting().await)
                } else {
                    Ok(None)
                }
            }
            Err(err) => {
                self.registration.write().await.install_failed();
                Err(err)
            }
        }
    }

    /// Promote the waiting version and run its activate event.
    ///
    /// Returns `None` when no version is waiting.
    pub async fn activate_waiting(&self) -> Option<ActivationReport> {
        let (version, retired) = {
            let mut registration = self.registration.write().await;
            registration.waiting_version()?;
            let retired = registration.active_version().map(str::to_string);
            registration.activate();
            (registration.active_version()?.to_string(), retired)
        };

        if let Some(old) = retired {
            self.workers.write().await.remove(&old);
            debug!(version = %old, "retired worker dropped");
        }

        let manager = self.workers.read().await.get(&version).cloned()?;
        Some(manager.activate().await)
    }

    /// Deliver a fetch event to the active worker.
    ///
    /// Before any version activates, requests pass through to default
    /// network handling.
    pub async fn fetch(&self, event: FetchEvent) -> Result<RouteOutcome, SwError> {
        let active = self
            .registration
            .read()
            .await
            .active_version()
            .map(str::to_string);

        let manager = match active {
            Some(version) => self.workers.read().await.get(&version).cloned(),
            None => None,
        };

        match manager {
            Some(manager) => manager.route(event).await,
            None => Ok(RouteOutcome::Passthrough),
        }
    }

    /// Deliver a raw control message to the worker (the waiting version if
    /// one exists, otherwise the active one).
    pub async fn deliver_message(&self, raw: &str) -> Option<ActivationReport> {
        let target = {
            let registration = self.registration.read().await;
            registration
                .waiting_version()
                .or(registration.active_version())
                .map(str::to_string)
        }?;

        let manager = self.workers.read().await.get(&target).cloned()?;
        match manager.handle_message(raw)? {
            ControlCommand::SkipWaiting => self.activate_waiting().await,
        }
    }
}

impl Default for WorkerHost {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::FetchResponse;
    use async_trait::async_trait;

    struct StaticFetcher;

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, event: &FetchEvent) -> Result<FetchResponse, SwError> {
            Ok(FetchResponse::basic(&event.url, 200, b"ok".to_vec()))
        }
    }

    #[tokio::test]
    async fn test_fetch_passes_through_before_activation() {
        let host = WorkerHost::new();
        let outcome = host.fetch(FetchEvent::get("/index.html")).await.unwrap();
        assert!(outcome.is_passthrough());
    }

    #[tokio::test]
    async fn test_register_without_skip_waiting_stays_waiting() {
        let host = WorkerHost::new();
        let config = CacheManagerConfig::new("v1", vec!["/".to_string()]).with_skip_waiting(false);

        let report = host.register(config, Arc::new(StaticFetcher)).await.unwrap();
        assert!(report.is_none());
        assert_eq!(host.waiting_version().await, Some("v1".to_string()));
        assert_eq!(host.active_version().await, None);
    }

    #[tokio::test]
    async fn test_skip_waiting_message_activates_waiting_worker() {
        let host = WorkerHost::new();
        host.connect_client("tab-1", "/").await;
        let config = CacheManagerConfig::new("v1", vec!["/".to_string()]).with_skip_waiting(false);
        host.register(config, Arc::new(StaticFetcher)).await.unwrap();

        let report = host.deliver_message(r#"{ "action": "skipWaiting" }"#).await;
        assert!(report.is_some());
        assert_eq!(host.active_version().await, Some("v1".to_string()));
        assert_eq!(host.controlled_clients("v1").await, 1);
    }

    #[tokio::test]
    async fn test_unrecognized_message_is_ignored() {
        let host = WorkerHost::new();
        let config = CacheManagerConfig::new("v1", vec![]).with_skip_waiting(false);
        host.register(config, Arc::new(StaticFetcher)).await.unwrap();

        assert!(host.deliver_message(r#"{ "action": "refresh" }"#).await.is_none());
        assert_eq!(host.active_version().await, None);
    }
}
