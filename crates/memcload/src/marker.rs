//! Completion marker: hide processed files behind a dot prefix

use std::io;
use std::path::{Path, PathBuf};

/// Prefix that marks a file as already loaded
pub const PROCESSED_PREFIX: char = '.';

/// Whether `path` names a file that was already marked.
pub fn is_marked(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(PROCESSED_PREFIX))
}

/// Path the file is moved to once processed: `dir/name` → `dir/.name`.
pub fn marked_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_string_lossy();
    Some(path.with_file_name(format!("{PROCESSED_PREFIX}{name}")))
}

/// Rename `path` to its marked name so later scans skip it.
pub fn mark_processed(path: &Path) -> io::Result<PathBuf> {
    let target = marked_path(path).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no file name in {}", path.display()),
        )
    })?;
    std::fs::rename(path, &target)?;
    Ok(target)
}
