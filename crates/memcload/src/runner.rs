//! Run orchestration: discover → dispatch → mark

use std::time::{Duration, Instant};

use anyhow::Result;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use memcload_core::{SharedProgress, fmt_num, is_shutdown_requested};

use crate::config::Config;
use crate::discover::find_input_files;
use crate::dispatcher::{Dispatcher, FileOutcome, Job};
use crate::marker::mark_processed;
use crate::processor::{FileProcessor, FileStats};
use crate::store::ClientMap;
use crate::writer::CacheWriter;

/// Run summary
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Summary {
    pub total_files: usize,
    /// Files read to the end
    pub processed_files: usize,
    /// Files that could not be opened or decompressed, or whose worker panicked
    pub failed_files: usize,
    /// Files not started because of a shutdown request
    pub skipped_files: usize,
    /// Processed files over the error-rate threshold
    pub breached_files: usize,
    /// Files renamed with the processed marker
    pub marked_files: usize,
    pub total_lines: usize,
    pub failed_lines: usize,
    pub elapsed: Duration,
}

impl Summary {
    fn add_stats(&mut self, stats: &FileStats) {
        self.processed_files += 1;
        self.total_lines += stats.total_lines;
        self.failed_lines += stats.failed_lines;
        if stats.breached {
            self.breached_files += 1;
        }
    }

    /// Whether every file was read to the end
    pub fn is_success(&self) -> bool {
        self.failed_files == 0 && self.skipped_files == 0
    }

    fn lines_per_sec(&self) -> Option<f64> {
        (self.total_lines > 0 && !self.elapsed.is_zero())
            .then(|| self.total_lines as f64 / self.elapsed.as_secs_f64())
    }

    /// Format summary table as a string.
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Load Summary")
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
                Cell::new("%").fg(Color::Cyan),
            ]);

        table.add_row(vec![
            Cell::new("Files processed"),
            Cell::new(format!("{}/{}", self.processed_files, self.total_files)),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Files marked"),
            Cell::new(self.marked_files),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Over error threshold"),
            Cell::new(self.breached_files),
            Cell::new(""),
        ]);
        let failed = Cell::new(self.failed_files);
        table.add_row(vec![
            Cell::new("Files failed"),
            if self.failed_files > 0 { failed.fg(Color::Red) } else { failed },
            Cell::new(""),
        ]);
        let skipped = Cell::new(self.skipped_files);
        table.add_row(vec![
            Cell::new("Files skipped"),
            if self.skipped_files > 0 { skipped.fg(Color::Yellow) } else { skipped },
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Lines"),
            Cell::new(fmt_num(self.total_lines)),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Lines failed"),
            Cell::new(fmt_num(self.failed_lines)),
            Cell::new(format!("{:.2}", pct(self.failed_lines, self.total_lines))),
        ]);
        table.add_row(vec![
            Cell::new("Time"),
            Cell::new(format!("{:.1}s", self.elapsed.as_secs_f64())),
            Cell::new(""),
        ]);
        if let Some(rate) = self.lines_per_sec() {
            table.add_row(vec![
                Cell::new("Throughput"),
                Cell::new(format!("{rate:.0} lines/sec")),
                Cell::new(""),
            ]);
        }

        format!("\n{table}")
    }

    /// Log summary (non-TTY mode).
    pub fn log(&self) {
        log::info!("=== Load Summary ===");
        log::info!(
            "Files: {}/{} processed ({} failed, {} skipped, {} over error threshold, {} marked)",
            self.processed_files,
            self.total_files,
            self.failed_files,
            self.skipped_files,
            self.breached_files,
            self.marked_files
        );
        log::info!(
            "Lines: {} ({} failed)",
            fmt_num(self.total_lines),
            fmt_num(self.failed_lines)
        );
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        if let Some(rate) = self.lines_per_sec() {
            log::info!("Throughput: {rate:.0} lines/sec");
        }
    }
}

fn pct(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

/// Load every file matching `config.pattern` into memcached.
pub fn run(config: &Config, progress: &SharedProgress) -> Result<Summary> {
    let clients = ClientMap::from_addresses(&config.stores, config.store_timeout);
    run_with_clients(config, &clients, progress)
}

/// Same as [`run`] with a prepared client map.
pub fn run_with_clients(
    config: &Config,
    clients: &ClientMap,
    progress: &SharedProgress,
) -> Result<Summary> {
    run_until(config, clients, progress, is_shutdown_requested)
}

/// Same as [`run_with_clients`], starting no new file once `stop` is true.
///
/// Files left unstarted are counted as skipped and keep their name.
pub fn run_until(
    config: &Config,
    clients: &ClientMap,
    progress: &SharedProgress,
    stop: impl Fn() -> bool + Sync,
) -> Result<Summary> {
    let start = Instant::now();

    let files = find_input_files(&config.pattern)?;
    log::info!("Found: {} files", files.len());

    let dispatcher = Dispatcher::new(config.workers)?;
    let writer = CacheWriter::new(clients, config.dry_run, config.retry.clone());
    let processor = FileProcessor::new(&writer, config.max_error_rate);

    log::info!(
        "Processing {} files with {} workers{}",
        files.len(),
        dispatcher.workers().min(files.len()),
        if config.dry_run { " (dry run)" } else { "" }
    );

    let mut summary = Summary {
        total_files: files.len(),
        ..Default::default()
    };

    dispatcher.run(
        files,
        stop,
        |job| process_job(&processor, job, progress),
        |job, outcome| complete_job(config, job, outcome, &mut summary),
    );

    summary.elapsed = start.elapsed();
    if progress.is_tty() {
        progress.println(summary.format_table());
    } else {
        summary.log();
    }
    Ok(summary)
}

fn process_job(processor: &FileProcessor<'_>, job: &Job, progress: &SharedProgress) -> FileOutcome {
    let name = job
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let pb = progress.file_bar(&name);

    let outcome = match processor.process(&job.path, &pb) {
        Ok(stats) => FileOutcome::Processed(stats),
        Err(e) => FileOutcome::Failed(e),
    };
    pb.finish_and_clear();
    outcome
}

/// Runs on the dispatching thread, in file order.
fn complete_job(config: &Config, job: &Job, outcome: FileOutcome, summary: &mut Summary) {
    match outcome {
        FileOutcome::Processed(stats) => {
            summary.add_stats(&stats);
            if stats.breached && !config.mark_breached {
                log::warn!(
                    "Leaving {} unmarked: error rate {:.2}% over threshold",
                    job.path.display(),
                    stats.error_rate() * 100.0
                );
                return;
            }
            log::info!("Renaming: {}", job.path.display());
            match mark_processed(&job.path) {
                Ok(_) => summary.marked_files += 1,
                Err(e) => log::error!("Error while renaming file {}: {e}", job.path.display()),
            }
        }
        FileOutcome::Failed(e) => {
            summary.failed_files += 1;
            log::error!("{e}");
        }
        FileOutcome::Skipped => {
            summary.skipped_files += 1;
            log::warn!("{}: skipped, shutdown requested", job.path.display());
        }
        FileOutcome::Panicked => {
            summary.failed_files += 1;
            log::error!("{}: worker panicked", job.path.display());
        }
    }
}
