//! # OffKit Service Worker
//!
//! Service-worker cache lifecycle and request routing for the OffKit
//! offline caching toolkit.
//!
//! ## Features
//!
//! - **Lifecycle**: install (all-or-nothing precache), activate (stale
//!   version eviction), fetch routing, control messages
//! - **Routing policy**: cache-first, network-fallback, background
//!   revalidation for navigations, offline fallback document
//! - **Registration**: installing → waiting → active state machine with
//!   skip-waiting semantics
//! - **Clients**: claim controlled pages without a reload
//!
//! ## Architecture
//!
//! ```text
//! WorkerHost (the browser-host driver)
//!     │
//!     ├── Registration
//!     │       ├── installing (WorkerVersion)
//!     │       ├── waiting (WorkerVersion)
//!     │       └── active (WorkerVersion)
//!     │
//!     ├── Clients
//!     │
//!     └── CacheManager (one per worker version)
//!             └── CacheStorage (shared)
//!                     └── Cache "portfolio-v4"
//! ```
//!
//! The host delivers lifecycle events; handlers return explicit task
//! handles for any background work so the "keep the event alive until the
//! async work finishes" contract is visible to callers and tests.

use thiserror::Error;

pub mod clients;
pub mod events;
pub mod host;
pub mod manager;
pub mod registration;

pub use clients::{Client, Clients};
pub use events::{
    parse_control_message, ControlCommand, FetchEvent, FetchResponse, RespondWith, ResponseKind,
    RouteOutcome,
};
pub use host::WorkerHost;
pub use manager::{
    has_cacheable_extension, ActivationReport, CacheManager, CacheManagerConfig, Fetcher,
    InstallOutcome,
};
pub use registration::{Registration, WorkerState, WorkerVersion};

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum SwError {
    /// A precache manifest entry could not be fetched or stored; the
    /// install aborts and the worker version never activates.
    #[error("Precache failed for {url}: {reason}")]
    Precache { url: String, reason: String },

    /// A network fetch produced no response.
    #[error("Network error: {0}")]
    Network(String),

    /// An operation was attempted in an invalid lifecycle state.
    #[error("State error: {0}")]
    State(String),

    /// Cache storage failure.
    #[error("Cache error: {0}")]
    Cache(#[from] offkit_cache::CacheError),
}
