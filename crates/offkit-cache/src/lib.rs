//! # OffKit Cache
//!
//! Versioned request/response cache storage for the OffKit offline caching
//! toolkit.
//!
//! ## Features
//!
//! - **CacheEntry**: a stored request/response pair
//! - **Cache**: a single named cache instance, keyed by request identity
//! - **CacheStorage**: the set of named instances (one per deployed version)
//!
//! ## Architecture
//!
//! ```text
//! CacheStorage
//!     ├── Cache "portfolio-v3"   (stale, awaiting eviction)
//!     └── Cache "portfolio-v4"   (current)
//!             └── method + URL → CacheEntry
//! ```
//!
//! Storage is concurrency-safe at the key level: individual puts, lookups
//! and deletes are atomic, but no cross-key transactions exist. Handles are
//! cheaply clonable so several worker versions can share one storage area.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::trace;

// ==================== Errors ====================

/// Errors that can occur in cache storage operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ==================== Entries ====================

/// A stored request/response pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Create an entry for the given request identity.
    pub fn new(method: &str, url: &str, status: u16, body: Vec<u8>) -> Self {
        Self {
            url: url.to_string(),
            method: method.to_string(),
            status,
            headers: HashMap::new(),
            body,
            cached_at: now_millis(),
        }
    }

    /// The storage key for this entry.
    pub fn key(&self) -> String {
        request_key(&self.method, &self.url)
    }
}

/// Compose the storage key for a request identity.
pub fn request_key(method: &str, url: &str) -> String {
    format!("{} {}", method.to_ascii_uppercase(), url)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ==================== Cache ====================

/// A single named cache instance.
///
/// Clones share the same underlying entry map.
#[derive(Debug, Clone)]
pub struct Cache {
    name: String,
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl Cache {
    /// Create a new, empty cache instance.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a stored response for a request identity.
    pub async fn lookup(&self, method: &str, url: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .await
            .get(&request_key(method, url))
            .cloned()
    }

    /// Store an entry. A later put for the same key overwrites.
    pub async fn put(&self, entry: CacheEntry) {
        trace!(cache = %self.name, key = %entry.key(), "put");
        self.entries.write().await.insert(entry.key(), entry);
    }

    /// Store a batch of entries.
    pub async fn put_all(&self, entries: Vec<CacheEntry>) {
        let mut map = self.entries.write().await;
        for entry in entries {
            map.insert(entry.key(), entry);
        }
    }

    /// Remove an entry. Returns whether it existed.
    pub async fn delete(&self, method: &str, url: &str) -> bool {
        self.entries
            .write()
            .await
            .remove(&request_key(method, url))
            .is_some()
    }

    /// All stored request URLs.
    pub async fn urls(&self) -> Vec<String> {
        self.entries
            .read()
            .await
            .values()
            .map(|e| e.url.clone())
            .collect()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the instance holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

// ==================== Cache Storage ====================

/// The set of named cache instances.
///
/// Clones share the same underlying storage area, so a newly installed
/// worker version and the previous one see the same instances.
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    caches: Arc<RwLock<HashMap<String, Cache>>>,
}

impl CacheStorage {
    /// Create a new, empty storage area.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a named instance, creating it if absent.
    pub async fn open(&self, name: &str) -> Cache {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
            .clone()
    }

    /// Get a named instance without creating it.
    pub async fn get(&self, name: &str) -> Option<Cache> {
        self.caches.read().await.get(name).cloned()
    }

    /// Check whether a named instance exists.
    pub async fn has(&self, name: &str) -> bool {
        self.caches.read().await.contains_key(name)
    }

    /// Delete a named instance. Returns whether it existed.
    ///
    /// Fallible so callers can capture per-instance failures from backends
    /// where deletion can actually fail; the in-memory area always succeeds.
    pub async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let existed = self.caches.write().await.remove(name).is_some();
        trace!(cache = %name, existed, "delete instance");
        Ok(existed)
    }

    /// All instance names.
    pub async fn names(&self) -> Vec<String> {
        self.caches.read().await.keys().cloned().collect()
    }
}
