//! Event and message types delivered by the host.

use std::fmt;

use futures::future::BoxFuture;
use hashbrown::HashMap;
use offkit_cache::CacheEntry;
use serde::Deserialize;

// ==================== Fetch Event ====================

/// A request intercepted by the worker.
#[derive(Debug, Clone)]
pub struct FetchEvent {
    /// Request URL (root-relative for same-origin requests).
    pub url: String,

    /// Request method.
    pub method: String,

    /// Whether this is a page navigation rather than a sub-resource fetch.
    pub is_navigation: bool,
}

impl FetchEvent {
    /// A GET sub-resource request.
    pub fn get(url: &str) -> Self {
        Self {
            url: url.to_string(),
            method: "GET".to_string(),
            is_navigation: false,
        }
    }

    /// A page navigation request.
    pub fn navigation(url: &str) -> Self {
        Self {
            is_navigation: true,
            ..Self::get(url)
        }
    }

    /// A request with an arbitrary method.
    pub fn with_method(method: &str, url: &str) -> Self {
        Self {
            method: method.to_string(),
            ..Self::get(url)
        }
    }

    /// Whether the request uses the GET method.
    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

// ==================== Fetch Response ====================

/// Response classification, mirroring the browser's response types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseKind {
    /// Same-origin response with readable headers and body.
    #[default]
    Basic,
    /// Cross-origin response obtained via CORS.
    Cors,
    /// Cross-origin response with opaque body; never cacheable here.
    Opaque,
}

/// A response produced by the cache or the network.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final response URL.
    pub url: String,

    /// Status code.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Response classification.
    pub kind: ResponseKind,

    /// Whether this response was read from the cache.
    pub from_cache: bool,
}

impl FetchResponse {
    /// A same-origin response.
    pub fn basic(url: &str, status: u16, body: Vec<u8>) -> Self {
        Self {
            url: url.to_string(),
            status,
            headers: HashMap::new(),
            body,
            kind: ResponseKind::Basic,
            from_cache: false,
        }
    }

    /// Rehydrate a response from a cache entry.
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            url: entry.url.clone(),
            status: entry.status,
            headers: entry.headers.clone(),
            body: entry.body.clone(),
            kind: ResponseKind::Basic,
            from_cache: true,
        }
    }

    /// Whether the response is successful (2xx).
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Copy this response into a cache entry for the given request.
    ///
    /// The entry is an independent duplicate: the response handed back to
    /// the caller is left untouched.
    pub fn to_entry(&self, event: &FetchEvent) -> CacheEntry {
        let mut entry = CacheEntry::new(&event.method, &event.url, self.status, self.body.clone());
        entry.headers = self.headers.clone();
        entry
    }
}

// ==================== Route Outcome ====================

/// Result of routing an intercepted request.
pub enum RouteOutcome {
    /// Not intercepted; the host's default network handling applies.
    Passthrough,

    /// Intercepted with a response.
    Respond(RespondWith),
}

impl RouteOutcome {
    /// The response, if the request was intercepted.
    pub fn response(&self) -> Option<&FetchResponse> {
        match self {
            RouteOutcome::Respond(r) => Some(&r.response),
            RouteOutcome::Passthrough => None,
        }
    }

    /// Whether the request was left to default handling.
    pub fn is_passthrough(&self) -> bool {
        matches!(self, RouteOutcome::Passthrough)
    }
}

/// A response plus any extend-lifetime work the host must await before
/// considering the fetch event complete.
pub struct RespondWith {
    /// The response to hand back to the caller immediately.
    pub response: FetchResponse,

    /// Background work (revalidation) that outlives the response.
    pub background: Option<BoxFuture<'static, ()>>,
}

impl fmt::Debug for RespondWith {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RespondWith")
            .field("response", &self.response)
            .field("background", &self.background.is_some())
            .finish()
    }
}

impl fmt::Debug for RouteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteOutcome::Passthrough => f.write_str("Passthrough"),
            RouteOutcome::Respond(r) => f.debug_tuple("Respond").field(r).finish(),
        }
    }
}

// ==================== Control Messages ====================

/// Commands a worker can receive over the message channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Make the waiting worker version active immediately.
    SkipWaiting,
}

#[derive(Debug, Deserialize)]
struct ControlMessage {
    action: String,
}

/// Parse a raw control message.
///
/// Recognizes `{ "action": "skipWaiting" }`; any other shape, including
/// malformed JSON, is ignored.
pub fn parse_control_message(raw: &str) -> Option<ControlCommand> {
    let message: ControlMessage = serde_json::from_str(raw).ok()?;
    match message.action.as_str() {
        "skipWaiting" => Some(ControlCommand::SkipWaiting),
        _ => None,
    }
}
