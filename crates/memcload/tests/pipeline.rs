//! End-to-end tests: gzip fixtures on disk, in-memory stores

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use indicatif::ProgressBar;
use memcload::{
    CacheStore, CacheWriter, ClientMap, Config, FileError, FileProcessor, UserApps,
    run_until, run_with_clients,
};
use memcload_core::{ProgressContext, RetryPolicy, SharedProgress, Sleeper};
use prost::Message;
use tempfile::TempDir;

/// Records every successful set; optionally fails every call.
#[derive(Clone, Default)]
struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    calls: Arc<AtomicUsize>,
    always_fail: bool,
}

impl CacheStore for MemoryStore {
    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.always_fail {
            anyhow::bail!("server unavailable");
        }
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _duration: Duration) {}
}

fn write_gz(path: &Path, lines: &[String]) {
    let mut enc = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    for line in lines {
        enc.write_all(line.as_bytes()).unwrap();
        enc.write_all(b"\n").unwrap();
    }
    enc.finish().unwrap();
}

fn valid_lines(category: &str, n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("{category}\tdev{i}\t{}.5\t-{}.25\t{},{},x", i, i, i, i + 1))
        .collect()
}

/// `n` lines of which the first `bad` have a broken field count
fn lines_with_errors(n: usize, bad: usize) -> Vec<String> {
    let mut lines = valid_lines("idfa", n);
    for line in lines.iter_mut().take(bad) {
        *line = "idfa\tbroken".to_string();
    }
    lines
}

fn progress() -> SharedProgress {
    Arc::new(ProgressContext::hidden())
}

fn config(dir: &TempDir) -> Config {
    Config {
        pattern: format!("{}/*.tsv.gz", dir.path().display()),
        workers: 2,
        retry: RetryPolicy::default().with_sleeper(Arc::new(NoSleep)),
        ..Default::default()
    }
}

fn clients(store: &MemoryStore) -> ClientMap {
    let mut clients = ClientMap::new();
    clients.insert("idfa", store.clone());
    clients.insert("gaid", store.clone());
    clients
}

fn marked(path: &Path) -> PathBuf {
    path.with_file_name(format!(".{}", path.file_name().unwrap().to_string_lossy()))
}

#[test]
fn clean_file_is_loaded_and_marked() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("20170929000000.tsv.gz");
    write_gz(&path, &valid_lines("idfa", 100));
    let store = MemoryStore::default();

    let summary = run_with_clients(&config(&dir), &clients(&store), &progress()).unwrap();

    assert_eq!(summary.total_files, 1);
    assert_eq!(summary.processed_files, 1);
    assert_eq!(summary.total_lines, 100);
    assert_eq!(summary.failed_lines, 0);
    assert_eq!(summary.breached_files, 0);
    assert_eq!(summary.marked_files, 1);
    assert!(summary.is_success());
    assert!(!path.exists());
    assert!(marked(&path).exists());

    let entries = store.entries.lock().unwrap();
    assert_eq!(entries.len(), 100);
    let msg = UserApps::decode(entries["idfa:dev7"].as_slice()).unwrap();
    assert_eq!(msg.lat, 7.5);
    assert_eq!(msg.lon, -7.25);
    assert_eq!(msg.apps, vec![7, 8]);
}

#[test]
fn two_percent_bad_lines_breach_but_still_mark_by_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.tsv.gz");
    write_gz(&path, &lines_with_errors(100, 2));
    let store = MemoryStore::default();

    let summary = run_with_clients(&config(&dir), &clients(&store), &progress()).unwrap();

    assert_eq!(summary.failed_lines, 2);
    assert_eq!(summary.breached_files, 1);
    assert_eq!(summary.marked_files, 1);
    assert!(marked(&path).exists());
    assert_eq!(store.entries.lock().unwrap().len(), 98);
}

#[test]
fn breached_file_kept_when_marking_disabled() {
    let dir = TempDir::new().unwrap();
    let breached = dir.path().join("a.tsv.gz");
    let clean = dir.path().join("b.tsv.gz");
    write_gz(&breached, &lines_with_errors(100, 2));
    write_gz(&clean, &valid_lines("gaid", 10));
    let store = MemoryStore::default();
    let config = Config {
        mark_breached: false,
        ..config(&dir)
    };

    let summary = run_with_clients(&config, &clients(&store), &progress()).unwrap();

    assert_eq!(summary.breached_files, 1);
    assert_eq!(summary.marked_files, 1);
    assert!(breached.exists());
    assert!(marked(&clean).exists());
}

#[test]
fn one_percent_is_within_threshold() {
    let dir = TempDir::new().unwrap();
    write_gz(&dir.path().join("a.tsv.gz"), &lines_with_errors(100, 1));
    let store = MemoryStore::default();

    let summary = run_with_clients(&config(&dir), &clients(&store), &progress()).unwrap();

    assert_eq!(summary.failed_lines, 1);
    assert_eq!(summary.breached_files, 0);
}

#[test]
fn unknown_category_counts_as_failed_line() {
    let dir = TempDir::new().unwrap();
    let mut lines = valid_lines("idfa", 5);
    lines.extend(valid_lines("dvid", 5));
    write_gz(&dir.path().join("a.tsv.gz"), &lines);
    let store = MemoryStore::default();

    let summary = run_with_clients(&config(&dir), &clients(&store), &progress()).unwrap();

    assert_eq!(summary.total_lines, 10);
    assert_eq!(summary.failed_lines, 5);
    assert_eq!(store.calls.load(Ordering::SeqCst), 5);
}

#[test]
fn unreachable_store_fails_lines_after_retries() {
    let dir = TempDir::new().unwrap();
    write_gz(&dir.path().join("a.tsv.gz"), &valid_lines("idfa", 3));
    let store = MemoryStore {
        always_fail: true,
        ..Default::default()
    };

    let summary = run_with_clients(&config(&dir), &clients(&store), &progress()).unwrap();

    assert_eq!(summary.failed_lines, 3);
    assert_eq!(summary.breached_files, 1);
    assert_eq!(store.calls.load(Ordering::SeqCst), 15);
}

#[test]
fn dry_run_touches_no_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.tsv.gz");
    write_gz(&path, &valid_lines("idfa", 20));
    let store = MemoryStore::default();
    let config = Config {
        dry_run: true,
        ..config(&dir)
    };

    let summary = run_with_clients(&config, &clients(&store), &progress()).unwrap();

    assert_eq!(summary.total_lines, 20);
    assert_eq!(summary.failed_lines, 0);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    assert!(marked(&path).exists());
}

#[test]
fn corrupt_file_does_not_stop_siblings() {
    let dir = TempDir::new().unwrap();
    let good_a = dir.path().join("a.tsv.gz");
    let corrupt = dir.path().join("b.tsv.gz");
    let good_c = dir.path().join("c.tsv.gz");
    write_gz(&good_a, &valid_lines("idfa", 10));
    std::fs::write(&corrupt, b"plain text, not gzip\n").unwrap();
    write_gz(&good_c, &valid_lines("gaid", 10));
    let store = MemoryStore::default();

    let summary = run_with_clients(&config(&dir), &clients(&store), &progress()).unwrap();

    assert_eq!(summary.total_files, 3);
    assert_eq!(summary.processed_files, 2);
    assert_eq!(summary.failed_files, 1);
    assert!(!summary.is_success());
    assert!(marked(&good_a).exists());
    assert!(marked(&good_c).exists());
    assert!(corrupt.exists());
    assert_eq!(store.entries.lock().unwrap().len(), 20);
}

#[test]
fn marked_files_are_not_reprocessed() {
    let dir = TempDir::new().unwrap();
    write_gz(&dir.path().join(".old.tsv.gz"), &valid_lines("idfa", 5));
    write_gz(&dir.path().join("new.tsv.gz"), &valid_lines("idfa", 3));
    let store = MemoryStore::default();

    let summary = run_with_clients(&config(&dir), &clients(&store), &progress()).unwrap();

    assert_eq!(summary.total_files, 1);
    assert_eq!(summary.total_lines, 3);

    // Second run finds nothing left to do
    let again = run_with_clients(&config(&dir), &clients(&store), &progress()).unwrap();
    assert_eq!(again.total_files, 0);
}

#[test]
fn many_files_all_marked() {
    let dir = TempDir::new().unwrap();
    let paths: Vec<PathBuf> = (0..6)
        .map(|i| dir.path().join(format!("{i:02}.tsv.gz")))
        .collect();
    for path in &paths {
        write_gz(path, &valid_lines("idfa", 50));
    }
    let store = MemoryStore::default();

    let summary = run_with_clients(&config(&dir), &clients(&store), &progress()).unwrap();

    assert_eq!(summary.processed_files, 6);
    assert_eq!(summary.marked_files, 6);
    assert!(paths.iter().all(|p| marked(p).exists()));
}

#[test]
fn shutdown_leaves_unstarted_files_unmarked() {
    let dir = TempDir::new().unwrap();
    let paths: Vec<PathBuf> = ["a", "b", "c"]
        .iter()
        .map(|name| dir.path().join(format!("{name}.tsv.gz")))
        .collect();
    for path in &paths {
        write_gz(path, &valid_lines("idfa", 5));
    }
    let store = MemoryStore::default();
    let config = Config {
        workers: 1,
        ..config(&dir)
    };

    // Signal arrives while the first file is loading
    let summary = run_until(&config, &clients(&store), &progress(), || {
        store.calls.load(Ordering::SeqCst) > 0
    })
    .unwrap();

    assert_eq!(summary.total_files, 3);
    assert_eq!(summary.processed_files, 1);
    assert_eq!(summary.skipped_files, 2);
    assert_eq!(summary.marked_files, 1);
    assert!(!summary.is_success());
    assert!(marked(&paths[0]).exists());
    assert!(paths[1].exists() && paths[2].exists());
    assert_eq!(store.entries.lock().unwrap().len(), 5);
}

#[test]
fn invalid_pattern_is_fatal() {
    let store = MemoryStore::default();
    let config = Config {
        pattern: "/tmp/[".to_string(),
        ..Default::default()
    };
    assert!(run_with_clients(&config, &clients(&store), &progress()).is_err());
}

#[test]
fn empty_pattern_is_fatal() {
    let store = MemoryStore::default();
    let config = Config::default();
    assert!(config.pattern.is_empty());
    assert!(run_with_clients(&config, &clients(&store), &progress()).is_err());
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn processor_handles_line_endings_and_bad_bytes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mixed.tsv.gz");
    let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    enc.write_all(b"idfa\ta\t1\t2\t3\r\n").unwrap();
    enc.write_all(b"idfa\t\xff\xfe\t1\t2\t3\n").unwrap();
    enc.write_all(b"\n").unwrap();
    enc.write_all(b"gaid\tb\t1\t2\t").unwrap();
    enc.finish().unwrap();

    let store = MemoryStore::default();
    let clients = clients(&store);
    let writer = CacheWriter::new(&clients, false, RetryPolicy::default());
    let processor = FileProcessor::new(&writer, 0.01);

    let stats = processor.process(&path, &ProgressBar::hidden()).unwrap();

    assert_eq!(stats.total_lines, 4);
    assert_eq!(stats.failed_lines, 2);
    assert!(stats.breached);
    assert_eq!(stats.error_rate(), 0.5);

    let entries = store.entries.lock().unwrap();
    let msg = UserApps::decode(entries["gaid:b"].as_slice()).unwrap();
    assert!(msg.apps.is_empty());
    assert!(entries.contains_key("idfa:a"));
}

#[test]
fn processor_empty_file_has_zero_rate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.tsv.gz");
    write_gz(&path, &[]);
    let clients = ClientMap::new();
    let writer = CacheWriter::new(&clients, false, RetryPolicy::default());
    let processor = FileProcessor::new(&writer, 0.01);

    let stats = processor.process(&path, &ProgressBar::hidden()).unwrap();

    assert_eq!(stats.total_lines, 0);
    assert_eq!(stats.error_rate(), 0.0);
    assert!(!stats.breached);
}

#[test]
fn processor_reports_missing_file() {
    let dir = TempDir::new().unwrap();
    let clients = ClientMap::new();
    let writer = CacheWriter::new(&clients, true, RetryPolicy::default());
    let processor = FileProcessor::new(&writer, 0.01);

    let err = processor
        .process(&dir.path().join("missing.gz"), &ProgressBar::hidden())
        .unwrap_err();
    assert!(matches!(err, FileError::Open { .. }));
}
