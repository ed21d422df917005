//! Loader run configuration

use std::collections::BTreeMap;
use std::time::Duration;

use memcload_core::RetryPolicy;

use crate::processor::DEFAULT_MAX_ERROR_RATE;
use crate::store::DEFAULT_STORE_TIMEOUT;

/// Default memcached address per device category
pub const DEFAULT_STORES: [(&str, &str); 4] = [
    ("idfa", "127.0.0.1:33013"),
    ("gaid", "127.0.0.1:33014"),
    ("adid", "127.0.0.1:33015"),
    ("dvid", "127.0.0.1:33016"),
];

/// Runtime configuration for one loader run
#[derive(Debug, Clone)]
pub struct Config {
    /// Glob selecting input files
    pub pattern: String,
    /// Device category → memcached address
    pub stores: BTreeMap<String, String>,
    /// Connect and socket timeout per store call
    pub store_timeout: Duration,
    /// Log records instead of storing them
    pub dry_run: bool,
    /// Worker pool width
    pub workers: usize,
    /// Store write retry policy
    pub retry: RetryPolicy,
    /// Failed-line share above which a file is reported
    pub max_error_rate: f64,
    /// Rename files that breached `max_error_rate` anyway
    pub mark_breached: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            stores: default_stores(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            dry_run: false,
            workers: default_workers(),
            retry: RetryPolicy::default(),
            max_error_rate: DEFAULT_MAX_ERROR_RATE,
            mark_breached: true,
        }
    }
}

pub fn default_stores() -> BTreeMap<String, String> {
    DEFAULT_STORES
        .iter()
        .map(|(category, addr)| (category.to_string(), addr.to_string()))
        .collect()
}

/// Available cores, capped at 8
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(8)
}
