//! memcload - load gzip app-install logs into memcached
//!
//! Each line `type \t id \t lat \t lon \t apps` is stored as a `UserApps`
//! protobuf under `"{type}:{id}"` in the memcached for its device type.
//! Loaded files are renamed with a leading dot.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use memcload_core::RetryPolicy;

mod config;

use config::FileConfig;

#[derive(Parser, Debug)]
#[command(name = "memcload")]
#[command(about = "Load gzip app-install logs into memcached")]
#[command(version)]
struct Cli {
    /// Glob for input log files, e.g. "/data/appsinstalled/*.tsv.gz"
    #[arg(
        long,
        required_unless_present = "show_config",
        value_parser = clap::builder::NonEmptyStringValueParser::new()
    )]
    pattern: Option<String>,

    /// memcached address for idfa devices
    #[arg(long)]
    idfa: Option<String>,

    /// memcached address for gaid devices
    #[arg(long)]
    gaid: Option<String>,

    /// memcached address for adid devices
    #[arg(long)]
    adid: Option<String>,

    /// memcached address for dvid devices
    #[arg(long)]
    dvid: Option<String>,

    /// Connect and read/write timeout per memcached call, in milliseconds
    #[arg(long)]
    store_timeout_ms: Option<u64>,

    /// Dry run (log records, do not touch memcached)
    #[arg(long)]
    dry: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Config file path (default: ./memcload.toml or ~/.config/memcload/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of parallel workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Attempts per memcached write
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Milliseconds between write attempts
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Failed-line share above which a file is reported (0.01 = 1%)
    #[arg(long)]
    max_error_rate: Option<f64>,

    /// Do not rename files whose error rate is over the threshold
    #[arg(long)]
    keep_breached: bool,

    /// Print the effective settings and exit
    #[arg(long)]
    show_config: bool,
}

impl Cli {
    /// Store addresses given on the command line
    fn store_overrides(&self) -> BTreeMap<String, String> {
        [
            ("idfa", &self.idfa),
            ("gaid", &self.gaid),
            ("adid", &self.adid),
            ("dvid", &self.dvid),
        ]
        .into_iter()
        .filter_map(|(category, addr)| Some((category.to_string(), addr.clone()?)))
        .collect()
    }

    /// Defaults < config file < flags
    fn resolve(&self, file: &FileConfig) -> memcload::Config {
        let mut stores = file.store_addresses();
        stores.extend(self.store_overrides());

        let retry = RetryPolicy::fixed(
            self.max_attempts.unwrap_or(file.retry.max_attempts),
            Duration::from_millis(self.retry_delay_ms.unwrap_or(file.retry.delay_ms)),
        );

        memcload::Config {
            pattern: self.pattern.clone().unwrap_or_default(),
            stores,
            store_timeout: Duration::from_millis(
                self.store_timeout_ms.unwrap_or(file.connection.timeout_ms),
            ),
            dry_run: self.dry,
            workers: self.workers.unwrap_or(file.workers.default).max(1),
            retry,
            max_error_rate: self.max_error_rate.unwrap_or(file.gate.max_error_rate),
            mark_breached: file.gate.mark_breached && !self.keep_breached,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect); logs go through it in a TTY
    let progress = Arc::new(memcload_core::ProgressContext::new());
    let multi = progress.is_tty().then(|| progress.multi());
    memcload_core::init_logging(cli.debug, multi).context("Failed to init logging")?;

    let file_config = match &cli.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::load()?,
    };
    let config = cli.resolve(&file_config);

    if cli.show_config {
        print_config(&config);
        return Ok(ExitCode::SUCCESS);
    }

    memcload_core::install_signal_handlers().context("Failed to install signal handlers")?;

    let summary = memcload::run(&config, &progress)?;

    if summary.skipped_files > 0 {
        log::warn!("Shutdown requested, {} files left for the next run", summary.skipped_files);
    } else if summary.failed_files > 0 {
        log::error!("{} files could not be loaded", summary.failed_files);
    }
    Ok(ExitCode::from(exit_status(&summary)))
}

/// 130 when interrupted, 1 when any file failed, else 0
fn exit_status(summary: &memcload::Summary) -> u8 {
    if summary.skipped_files > 0 {
        130
    } else if summary.failed_files > 0 {
        1
    } else {
        0
    }
}

fn print_config(config: &memcload::Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec![
        "Pattern",
        if config.pattern.is_empty() {
            "(not set)"
        } else {
            config.pattern.as_str()
        },
    ]);
    for (category, addr) in &config.stores {
        table.add_row(vec![format!("Store {category}"), addr.clone()]);
    }
    table.add_row(vec![
        "Store timeout",
        &format!("{}ms", config.store_timeout.as_millis()),
    ]);
    table.add_row(vec!["Dry run", if config.dry_run { "yes" } else { "no" }]);
    table.add_row(vec!["Workers", &config.workers.to_string()]);
    table.add_row(vec![
        "Write attempts",
        &format!(
            "{} ({}ms apart)",
            config.retry.max_attempts(),
            config.retry.delay().as_millis()
        ),
    ]);
    table.add_row(vec![
        "Max error rate",
        &format!("{:.2}%", config.max_error_rate * 100.0),
    ]);
    table.add_row(vec![
        "Mark breached files",
        if config.mark_breached { "yes" } else { "no" },
    ]);

    eprintln!("\n{table}");
}
