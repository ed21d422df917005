//! memcload - load device app-install logs into memcached
//!
//! Streams gzip TSV logs, parses each line into a [`Record`], encodes it as
//! a `UserApps` protobuf and stores it under `"{type}:{id}"` in the
//! memcached instance for the record's device category.
//!
//! # Example
//!
//! ```ignore
//! use memcload::{Config, run};
//!
//! let config = Config {
//!     pattern: "/data/appsinstalled/*.tsv.gz".into(),
//!     dry_run: true,
//!     ..Default::default()
//! };
//!
//! let summary = run(&config, &progress)?;
//! println!("Loaded {} lines", summary.total_lines);
//! ```

pub mod codec;
pub mod config;
pub mod discover;
pub mod dispatcher;
pub mod marker;
pub mod processor;
pub mod record;
pub mod runner;
pub mod store;
pub mod writer;

// Re-exports
pub use codec::UserApps;
pub use config::Config;
pub use dispatcher::{Dispatcher, FileOutcome, Job};
pub use processor::{FileError, FileProcessor, FileStats};
pub use record::{ParseError, Record, parse_record};
pub use runner::{Summary, run, run_until, run_with_clients};
pub use store::{CacheStore, ClientMap, MemcacheStore};
pub use writer::{CacheWriter, InsertError};
