//! End-to-end lifecycle tests: deploy cycles, offline behavior, and
//! stale-while-revalidate through the host driver.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use offkit_common::{init_logging, LogConfig};
use offkit_sw::{
    CacheManagerConfig, FetchEvent, FetchResponse, Fetcher, RouteOutcome, SwError, WorkerHost,
};

/// An origin server the tests can edit and take offline.
struct OriginServer {
    documents: RwLock<Vec<(String, Vec<u8>)>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl OriginServer {
    fn new(documents: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            documents: RwLock::new(
                documents
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.as_bytes().to_vec()))
                    .collect(),
            ),
            offline: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    async fn publish(&self, url: &str, body: &str) {
        let mut documents = self.documents.write().await;
        if let Some(slot) = documents.iter_mut().find(|(u, _)| u == url) {
            slot.1 = body.as_bytes().to_vec();
        } else {
            documents.push((url.to_string(), body.as_bytes().to_vec()));
        }
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for OriginServer {
    async fn fetch(&self, event: &FetchEvent) -> Result<FetchResponse, SwError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(SwError::Network("offline".to_string()));
        }
        let documents = self.documents.read().await;
        match documents.iter().find(|(u, _)| u == &event.url) {
            Some((_, body)) => Ok(FetchResponse::basic(&event.url, 200, body.clone())),
            None => Ok(FetchResponse::basic(&event.url, 404, vec![])),
        }
    }
}

fn init() {
    init_logging(LogConfig::default().with_filter("offkit_sw=debug"));
}

fn body(outcome: &RouteOutcome) -> Vec<u8> {
    outcome.response().expect("intercepted response").body.clone()
}

#[tokio::test]
async fn end_to_end_deploy_cycle() {
    init();
    let server = OriginServer::new(&[
        ("/", "<home>"),
        ("/index.html", "<home>"),
        ("/styles.css", "body{}"),
        ("/new.css", ".new{}"),
    ]);
    let host = WorkerHost::new();
    host.connect_client("tab-1", "/").await;

    // First deploy: v1 precaches three documents and activates immediately.
    let manifest_v1 = vec!["/".to_string(), "/index.html".to_string(), "/styles.css".to_string()];
    let report = host
        .register(CacheManagerConfig::new("v1", manifest_v1), server.clone())
        .await
        .unwrap()
        .expect("skip-waiting install activates");
    assert!(report.is_clean());

    let storage = host.storage();
    assert_eq!(storage.names().await, vec!["v1".to_string()]);
    assert_eq!(storage.get("v1").await.unwrap().len().await, 3);

    // Second deploy held in waiting: both instances coexist on disk.
    let manifest_v2 = vec![
        "/".to_string(),
        "/index.html".to_string(),
        "/styles.css".to_string(),
        "/new.css".to_string(),
    ];
    let config_v2 = CacheManagerConfig::new("v2", manifest_v2).with_skip_waiting(false);
    assert!(host.register(config_v2, server.clone()).await.unwrap().is_none());

    let mut names = storage.names().await;
    names.sort();
    assert_eq!(names, vec!["v1".to_string(), "v2".to_string()]);
    assert_eq!(storage.get("v1").await.unwrap().len().await, 3);
    assert_eq!(storage.get("v2").await.unwrap().len().await, 4);
    assert_eq!(host.active_version().await, Some("v1".to_string()));

    // The page requests the update; v2 takes over and evicts v1.
    let report = host
        .deliver_message(r#"{ "action": "skipWaiting" }"#)
        .await
        .expect("skip-waiting activates v2");
    assert_eq!(report.removed, vec!["v1".to_string()]);

    assert_eq!(storage.names().await, vec!["v2".to_string()]);
    assert_eq!(storage.get("v2").await.unwrap().len().await, 4);
    assert_eq!(host.active_version().await, Some("v2".to_string()));
    assert_eq!(host.controlled_clients("v2").await, 1);
}

#[tokio::test]
async fn precached_pages_survive_going_offline() {
    init();
    let server = OriginServer::new(&[("/", "<home>"), ("/index.html", "<home>")]);
    let host = WorkerHost::new();
    host.register(
        CacheManagerConfig::new("v1", vec!["/".to_string(), "/index.html".to_string()]),
        server.clone(),
    )
    .await
    .unwrap();

    server.set_offline(true);

    // Precached navigation is served from cache; its background refresh
    // fails silently.
    let outcome = host.fetch(FetchEvent::navigation("/")).await.unwrap();
    assert_eq!(body(&outcome), b"<home>");
    if let RouteOutcome::Respond(respond) = outcome {
        if let Some(background) = respond.background {
            background.await;
        }
    }
    assert_eq!(body(&host.fetch(FetchEvent::navigation("/")).await.unwrap()), b"<home>");

    // Uncached navigation falls back to the cached root document.
    let outcome = host.fetch(FetchEvent::navigation("/projects.html")).await.unwrap();
    assert_eq!(outcome.response().unwrap().url, "/index.html");

    // Uncached sub-resource failures propagate.
    let err = host.fetch(FetchEvent::get("/js/combined.js")).await.unwrap_err();
    assert!(matches!(err, SwError::Network(_)));
}

#[tokio::test]
async fn navigation_revalidates_in_background() {
    init();
    let server = OriginServer::new(&[("/index.html", "version one")]);
    let host = WorkerHost::new();
    host.register(
        CacheManagerConfig::new("v1", vec!["/index.html".to_string()]),
        server.clone(),
    )
    .await
    .unwrap();

    server.publish("/index.html", "version two").await;

    // The stale copy is returned immediately; exactly one background fetch
    // refreshes the entry once the handle is awaited.
    let before = server.calls();
    let outcome = host.fetch(FetchEvent::navigation("/index.html")).await.unwrap();
    assert_eq!(body(&outcome), b"version one");

    match outcome {
        RouteOutcome::Respond(respond) => respond.background.expect("revalidation").await,
        RouteOutcome::Passthrough => panic!("expected interception"),
    }
    assert_eq!(server.calls(), before + 1);

    let outcome = host.fetch(FetchEvent::navigation("/index.html")).await.unwrap();
    assert_eq!(body(&outcome), b"version two");
}

#[tokio::test]
async fn network_misses_cache_static_assets_only() {
    init();
    let server = OriginServer::new(&[
        ("/img/shot.webp", "img-bytes"),
        ("/api/projects", "[{}]"),
    ]);
    let host = WorkerHost::new();
    host.register(CacheManagerConfig::new("v1", vec![]), server.clone())
        .await
        .unwrap();

    let outcome = host.fetch(FetchEvent::get("/img/shot.webp")).await.unwrap();
    assert_eq!(body(&outcome), b"img-bytes");

    let outcome = host.fetch(FetchEvent::get("/api/projects")).await.unwrap();
    assert_eq!(body(&outcome), b"[{}]");

    let cache = host.storage().get("v1").await.unwrap();
    assert!(cache.lookup("GET", "/img/shot.webp").await.is_some());
    assert!(cache.lookup("GET", "/api/projects").await.is_none());
}

#[tokio::test]
async fn failed_install_keeps_previous_version_serving() {
    init();
    let server = OriginServer::new(&[("/", "<home>"), ("/index.html", "<home>")]);
    let host = WorkerHost::new();
    host.register(
        CacheManagerConfig::new("v1", vec!["/".to_string(), "/index.html".to_string()]),
        server.clone(),
    )
    .await
    .unwrap();

    // v2's manifest references a document the server no longer has.
    let manifest_v2 = vec!["/".to_string(), "/gone.css".to_string()];
    let err = host
        .register(CacheManagerConfig::new("v2", manifest_v2), server.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, SwError::Precache { .. }));

    // v1 keeps serving and no partial v2 instance exists.
    assert_eq!(host.active_version().await, Some("v1".to_string()));
    assert!(!host.storage().has("v2").await);
    let outcome = host.fetch(FetchEvent::navigation("/")).await.unwrap();
    assert_eq!(body(&outcome), b"<home>");
}
