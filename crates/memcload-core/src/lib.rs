//! memcload core - shared plumbing for the log loader
//!
//! Gzip file streaming, the shared work queue, retry policy, progress bars
//! and logging setup. Nothing in here knows about device records.

pub mod logging;
pub mod progress;
pub mod retry;
pub mod shutdown;
pub mod stream;
pub mod work_queue;

// Re-exports for convenience
pub use logging::{IndicatifLogger, init_logging};
pub use progress::{ProgressContext, SharedProgress, fmt_num, upgrade_to_bar};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use shutdown::{install_signal_handlers, is_shutdown_requested};
pub use stream::{ByteCounter, CountingReader, GzipReader, open_gzip_file};
pub use work_queue::WorkQueue;
