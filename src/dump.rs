//! Print every file in a directory under a labelled banner

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

const BANNER_WIDTH: usize = 60;

/// Dump each regular file in `dir` to `out`, sorted by name, skipping `exclude`.
///
/// Returns the number of files whose contents were printed. Files that are
/// not valid UTF-8 or cannot be read get an error line and are skipped.
pub fn dump_directory(dir: &Path, exclude: Option<&str>, out: &mut impl Write) -> Result<usize> {
    if !dir.exists() {
        anyhow::bail!("Folder '{}' does not exist.", dir.display());
    }
    if !dir.is_dir() {
        anyhow::bail!("'{}' is not a directory.", dir.display());
    }

    let folder = dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve '{}'", dir.display()))?;
    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&folder)
        .with_context(|| format!("Failed to list '{}'", folder.display()))?
    {
        let entry = entry.context("Failed to read directory entry")?;
        let path = entry.path();
        if path.is_file() && exclude.is_none_or(|ex| entry.file_name() != ex) {
            files.push(path);
        }
    }
    files.sort();

    writeln!(out, "Reading from the FOLDER: {} | PATH: {}", name, folder.display())?;

    if files.is_empty() {
        writeln!(out, "No files found in '{}'.", dir.display())?;
        return Ok(0);
    }

    let banner = "=".repeat(BANNER_WIDTH);
    let mut dumped = 0;
    for path in &files {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        writeln!(out, "\n{banner}")?;
        writeln!(out, "FILE: {file_name}")?;
        writeln!(out, "{banner}")?;

        match std::fs::read_to_string(path) {
            Ok(content) => {
                writeln!(out, "{content}")?;
                dumped += 1;
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping unreadable file");
                writeln!(out, "Error reading file: {e}")?;
            }
        }
    }

    Ok(dumped)
}
