//! Key-value store clients, one per device category

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};

/// A cache that accepts binary values under string keys.
pub trait CacheStore: Send + Sync {
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// Connect and socket timeout for store clients
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(100);

/// memcached client connected on first use.
///
/// Construction never touches the network, so dry runs and unused
/// categories cost nothing. A failed connect is reported by `set` and
/// retried on the next call.
///
/// Connecting and each socket read/write are bounded by the store timeout,
/// so one attempt against a dead server costs at most that long.
pub struct MemcacheStore {
    url: String,
    client: OnceLock<memcache::Client>,
}

impl MemcacheStore {
    /// `addr` is `host:port` or a full `memcache://` URL.
    ///
    /// `connect_timeout` and `timeout` query parameters already present in
    /// `addr` win over `timeout`.
    pub fn new(addr: &str, timeout: Duration) -> Self {
        let url = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("memcache://{addr}")
        };
        Self {
            url: with_timeouts(url, timeout),
            client: OnceLock::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn client(&self) -> Result<&memcache::Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = memcache::Client::connect(self.url.clone())
            .with_context(|| format!("Failed to connect to {}", self.url))?;
        Ok(self.client.get_or_init(|| client))
    }
}

/// Append `connect_timeout`/`timeout` (seconds) unless the URL sets them.
/// Zero is raised to 1ms; the pool and sockets reject a zero timeout.
fn with_timeouts(mut url: String, timeout: Duration) -> String {
    let secs = timeout.max(Duration::from_millis(1)).as_secs_f64();
    for param in ["connect_timeout", "timeout"] {
        if has_query_param(&url, param) {
            continue;
        }
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&format!("{param}={secs}"));
    }
    url
}

fn has_query_param(url: &str, name: &str) -> bool {
    url.split_once('?').is_some_and(|(_, query)| {
        query
            .split('&')
            .any(|pair| pair.split('=').next() == Some(name))
    })
}

impl CacheStore for MemcacheStore {
    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.client()?
            .set(key, value, 0)
            .with_context(|| format!("memcached set failed on {}", self.url))
    }
}

/// Device category → store client. Built once, then shared read-only.
#[derive(Default)]
pub struct ClientMap {
    clients: HashMap<String, Box<dyn CacheStore>>,
}

impl ClientMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// One lazily connected memcached client per category.
    pub fn from_addresses(addresses: &BTreeMap<String, String>, timeout: Duration) -> Self {
        let mut map = Self::new();
        for (category, addr) in addresses {
            let store = MemcacheStore::new(addr, timeout);
            log::debug!("{category} -> {}", store.url());
            map.insert(category.clone(), store);
        }
        map
    }

    pub fn insert(&mut self, category: impl Into<String>, store: impl CacheStore + 'static) {
        self.clients.insert(category.into(), Box::new(store));
    }

    pub fn get(&self, category: &str) -> Option<&dyn CacheStore> {
        self.clients.get(category).map(|store| store.as_ref())
    }

    /// Known categories, sorted
    pub fn categories(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ClientMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientMap")
            .field("categories", &self.categories())
            .finish()
    }
}
