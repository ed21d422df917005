//! Per-file pipeline: gunzip → lines → parse → store, with the error-rate gate

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use memcload_core::{fmt_num, open_gzip_file, upgrade_to_bar};
use thiserror::Error;

use crate::record::parse_record;
use crate::writer::CacheWriter;

/// Share of failed lines a file may have before it is reported
pub const DEFAULT_MAX_ERROR_RATE: f64 = 0.01;

/// Initial capacity for the per-line read buffer
const LINE_BUF_CAPACITY: usize = 1024;

/// Progress update interval (every N lines to avoid overhead)
const UPDATE_INTERVAL: usize = 10_000;

/// Error that stops a single file; other files are unaffected.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("cannot open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("read error in {} after line {line}: {source}", .path.display())]
    Read {
        path: PathBuf,
        line: usize,
        source: std::io::Error,
    },
}

/// Line counts for one processed file
#[derive(Debug, Clone, PartialEq)]
pub struct FileStats {
    pub path: PathBuf,
    pub total_lines: usize,
    pub failed_lines: usize,
    /// Error rate exceeded the threshold
    pub breached: bool,
    pub elapsed: Duration,
}

impl FileStats {
    /// failed / total, 0 for an empty file
    pub fn error_rate(&self) -> f64 {
        error_rate(self.failed_lines, self.total_lines)
    }
}

fn error_rate(failed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        failed as f64 / total as f64
    }
}

/// Runs one file through parsing and the cache writer.
#[derive(Debug)]
pub struct FileProcessor<'a> {
    writer: &'a CacheWriter<'a>,
    max_error_rate: f64,
}

impl<'a> FileProcessor<'a> {
    pub fn new(writer: &'a CacheWriter<'a>, max_error_rate: f64) -> Self {
        Self {
            writer,
            max_error_rate,
        }
    }

    /// Load every line of the gzip file at `path`.
    ///
    /// Bad lines and failed writes are counted, never returned. Only a file
    /// that cannot be opened or decompressed is an error.
    pub fn process(&self, path: &Path, pb: &ProgressBar) -> Result<FileStats, FileError> {
        let start = Instant::now();

        let (mut reader, counter, size) = open_gzip_file(path).map_err(|source| FileError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        upgrade_to_bar(pb, size);
        log::info!("Processing {}", path.display());

        let mut buf = Vec::with_capacity(LINE_BUF_CAPACITY);
        let mut total = 0usize;
        let mut failed = 0usize;

        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(|source| FileError::Read {
                    path: path.to_path_buf(),
                    line: total,
                    source,
                })?;
            if n == 0 {
                break;
            }
            total += 1;

            if total.is_multiple_of(UPDATE_INTERVAL) {
                pb.set_position(counter.load(Ordering::Relaxed));
                pb.set_message(format!("{} lines, {} failed", fmt_num(total), fmt_num(failed)));
            }

            if !self.process_line(trim_line_end(&buf)) {
                failed += 1;
            }
        }
        pb.set_position(counter.load(Ordering::Relaxed));

        let stats = FileStats {
            path: path.to_path_buf(),
            total_lines: total,
            failed_lines: failed,
            breached: error_rate(failed, total) > self.max_error_rate,
            elapsed: start.elapsed(),
        };

        if stats.breached {
            log::error!(
                "Too many invalid records in {} (Total: {total} | Error: {failed} | Rate: {:.2}%)",
                path.display(),
                stats.error_rate() * 100.0
            );
        } else {
            log::info!("Done {} (Total: {total} | Error: {failed})", path.display());
        }

        Ok(stats)
    }

    /// Parse and store one line; false if it counts as failed.
    fn process_line(&self, raw: &[u8]) -> bool {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("Invalid UTF-8 ({e}) for: {}", String::from_utf8_lossy(raw));
                return false;
            }
        };

        let record = match parse_record(line) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("{e} for: {line}");
                return false;
            }
        };

        self.writer.insert(&record).is_ok()
    }
}

/// Strip a trailing `\n` or `\r\n`.
fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
