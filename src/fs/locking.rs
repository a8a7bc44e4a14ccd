//! File locking utilities for safe concurrent access.
//!
//! Provides locked read/write operations using `fs2` advisory locks to
//! prevent data corruption when multiple processes (lifecycle drivers, the
//! merge daemon, worker supervisors) access the same documents.
//!
//! Advisory locks are cooperative - all participants must use these
//! functions for the locking to be effective.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Read file contents with a shared (read) lock.
pub fn locked_read(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    file.lock_shared()
        .with_context(|| format!("Failed to acquire shared lock: {}", path.display()))?;
    let mut content = String::new();
    BufReader::new(&file)
        .read_to_string(&mut content)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(content)
}

/// Write file contents with an exclusive lock, then atomically replace the
/// target: write to a sibling temp file, fsync, rename over the target.
/// Readers never observe a partially written document.
pub fn locked_write(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    // Hold the exclusive lock on the target path itself for the duration of
    // the swap so concurrent writers serialize even though the visible file
    // is replaced via rename.
    let guard = OpenOptions::new()
        .write(true)
        .create(true)
        .open(path)
        .with_context(|| format!("Failed to open file for writing: {}", path.display()))?;
    guard
        .lock_exclusive()
        .with_context(|| format!("Failed to acquire exclusive lock: {}", path.display()))?;

    let tmp_path = tmp_sibling(path);
    {
        let tmp_file = File::create(&tmp_path)
            .with_context(|| format!("Failed to create temp file: {}", tmp_path.display()))?;
        let mut writer = BufWriter::new(&tmp_file);
        writer
            .write_all(content.as_bytes())
            .with_context(|| format!("Failed to write temp file: {}", tmp_path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Failed to flush temp file: {}", tmp_path.display()))?;
        tmp_file
            .sync_all()
            .with_context(|| format!("Failed to fsync temp file: {}", tmp_path.display()))?;
    }

    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace file: {}", path.display()))?;

    FileExt::unlock(&guard).ok();
    Ok(())
}

/// Append a line to a file under an exclusive lock, creating it if missing.
pub fn locked_append(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open file for append: {}", path.display()))?;
    file.lock_exclusive()
        .with_context(|| format!("Failed to acquire exclusive lock: {}", path.display()))?;
    writeln!(file, "{line}")
        .with_context(|| format!("Failed to append to file: {}", path.display()))?;
    file.flush().ok();
    FileExt::unlock(&file).ok();
    Ok(())
}

fn tmp_sibling(path: &Path) -> std::path::PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "doc".to_string());
    path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()))
}
