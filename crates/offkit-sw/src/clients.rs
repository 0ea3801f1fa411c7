//! Controlled pages and claim semantics.

use hashbrown::HashMap;
use tracing::debug;

/// A page the worker can control.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Page URL.
    pub url: String,

    /// Cache version of the worker controlling this page, if any.
    pub controller: Option<String>,
}

/// Registry of open pages.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page, initially controlled by the given version.
    pub fn add(&mut self, id: &str, url: &str, controller: Option<&str>) {
        self.clients.insert(
            id.to_string(),
            Client {
                id: id.to_string(),
                url: url.to_string(),
                controller: controller.map(str::to_string),
            },
        );
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Remove a client (page closed).
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    /// Take control of every registered page without a reload.
    pub fn claim(&mut self, controller: &str) {
        debug!(version = %controller, clients = self.clients.len(), "claiming clients");
        for client in self.clients.values_mut() {
            client.controller = Some(controller.to_string());
        }
    }

    /// Number of pages controlled by the given version.
    pub fn controlled_by(&self, controller: &str) -> usize {
        self.clients
            .values()
            .filter(|c| c.controller.as_deref() == Some(controller))
            .count()
    }

    /// Number of registered pages.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no pages are registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_repoints_all_clients() {
        let mut clients = Clients::new();
        clients.add("tab-1", "/", Some("v1"));
        clients.add("tab-2", "/projects.html", None);

        clients.claim("v2");

        assert_eq!(clients.controlled_by("v2"), 2);
        assert_eq!(clients.controlled_by("v1"), 0);
    }

    #[test]
    fn test_remove_client() {
        let mut clients = Clients::new();
        clients.add("tab-1", "/", None);

        assert!(clients.remove("tab-1").is_some());
        assert!(clients.is_empty());
    }
}
