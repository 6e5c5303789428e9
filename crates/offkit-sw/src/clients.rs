//! Controlled pages.
//!
//! The worker tracks the open pages it may control. Claiming sets the
//! controller on every page so new logic takes effect without a reload;
//! each newly claimed page produces a controller-change signal consumed by
//! the installability tracker.

use hashbrown::HashMap;
use tracing::debug;
use url::Url;

/// An open page.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Page URL.
    pub url: Url,

    /// Generation name of the controlling worker, if any.
    pub controller: Option<String>,

    /// Whether the page is focused.
    pub focused: bool,
}

impl Client {
    /// Whether this page is controlled by the given generation.
    pub fn is_controlled_by(&self, generation: &str) -> bool {
        self.controller.as_deref() == Some(generation)
    }
}

/// Registry of open pages.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
    next_id: u64,
}

impl Clients {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("client-{}", self.next_id)
    }

    /// Register an open page (initially uncontrolled).
    pub fn add(&mut self, url: Url) -> Client {
        let id = self.next_id();
        let client = Client {
            id: id.clone(),
            url,
            controller: None,
            focused: false,
        };
        self.clients.insert(id, client.clone());
        client
    }

    /// Get a page by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Remove a page (tab closed).
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    /// Number of open pages.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no pages are open.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Take control of every open page; returns the IDs whose controller
    /// actually changed.
    pub fn claim(&mut self, generation: &str) -> Vec<String> {
        let mut claimed = Vec::new();
        for client in self.clients.values_mut() {
            if !client.is_controlled_by(generation) {
                client.controller = Some(generation.to_string());
                claimed.push(client.id.clone());
            }
        }
        if !claimed.is_empty() {
            debug!(generation, count = claimed.len(), "Claimed clients");
        }
        claimed
    }

    /// Whether any page is controlled by a different generation.
    pub fn any_controlled_by_other(&self, generation: &str) -> bool {
        self.clients
            .values()
            .any(|c| c.controller.is_some() && !c.is_controlled_by(generation))
    }

    /// Open a new focused window.
    pub fn open_window(&mut self, url: Url) -> Client {
        let id = self.next_id();
        let client = Client {
            id: id.clone(),
            url,
            controller: None,
            focused: true,
        };
        self.clients.insert(id, client.clone());
        client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_add_and_remove() {
        let mut clients = Clients::new();
        let client = clients.add(url("https://portal.example.gov/"));

        assert_eq!(clients.len(), 1);
        assert!(clients.get(&client.id).is_some());
        assert!(client.controller.is_none());

        clients.remove(&client.id);
        assert!(clients.is_empty());
    }

    #[test]
    fn test_claim_controls_every_page() {
        let mut clients = Clients::new();
        let a = clients.add(url("https://portal.example.gov/"));
        let b = clients.add(url("https://portal.example.gov/registry/births"));

        let mut claimed = clients.claim("portal-cache-v3");
        claimed.sort();
        let mut expected = vec![a.id.clone(), b.id.clone()];
        expected.sort();
        assert_eq!(claimed, expected);

        assert!(clients.get(&a.id).unwrap().is_controlled_by("portal-cache-v3"));
        assert!(clients.get(&b.id).unwrap().is_controlled_by("portal-cache-v3"));
    }

    #[test]
    fn test_claim_is_idempotent() {
        let mut clients = Clients::new();
        clients.add(url("https://portal.example.gov/"));

        assert_eq!(clients.claim("v1").len(), 1);
        assert!(clients.claim("v1").is_empty());
    }

    #[test]
    fn test_claim_takes_over_from_previous_generation() {
        let mut clients = Clients::new();
        let client = clients.add(url("https://portal.example.gov/"));
        clients.claim("portal-cache-v2");

        assert!(clients.any_controlled_by_other("portal-cache-v3"));

        let claimed = clients.claim("portal-cache-v3");
        assert_eq!(claimed, vec![client.id.clone()]);
        assert!(!clients.any_controlled_by_other("portal-cache-v3"));
    }

    #[test]
    fn test_open_window_is_focused() {
        let mut clients = Clients::new();
        let window = clients.open_window(url("https://portal.example.gov/dashboard"));

        assert!(window.focused);
        assert_eq!(clients.len(), 1);
    }
}
