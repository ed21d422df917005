//! Input discovery: glob, drop already-marked files, sort

use std::path::PathBuf;

use anyhow::{Context, Result, ensure};

use crate::marker::is_marked;

/// Files matching `pattern`, minus marked ones, in lexicographic order.
///
/// An empty or invalid pattern is an error; unreadable entries are logged
/// and skipped.
pub fn find_input_files(pattern: &str) -> Result<Vec<PathBuf>> {
    ensure!(
        !pattern.is_empty(),
        "Pattern for searching log files must be provided"
    );
    let entries =
        glob::glob(pattern).with_context(|| format!("Invalid file pattern {pattern:?}"))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|path| !is_marked(path))
        .collect();
    files.sort();
    Ok(files)
}
