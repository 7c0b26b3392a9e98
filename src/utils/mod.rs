pub mod databases;

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::errors::AppError;
use databases::DatabaseKind;

/// Expands a leading `~` (alone or followed by `/`) to the invoking user's home directory.
pub fn expand_tilde(path: &str) -> Result<PathBuf> {
    if path == "~" || path.starts_with("~/") {
        let home = dirs::home_dir().context("Could not determine home directory for '~' expansion")?;
        let rest = path[1..].trim_start_matches('/');
        if rest.is_empty() {
            return Ok(home);
        }
        return Ok(home.join(rest));
    }
    Ok(PathBuf::from(path))
}

/// Accepts ASCII alphanumerics, `_` and `-` only, and no leading `-`.
///
/// Names end up in local paths, remote temp paths and `scp` arguments, so nothing
/// else is allowed through.
pub fn validate_entity_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('-')
        || name.contains(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '-')
    {
        anyhow::bail!(AppError::Usage(format!("invalid {} name: '{}'", kind, name)));
    }
    Ok(())
}

/// `<root>/<server>`
pub fn server_dir(root: &Path, server: &str) -> PathBuf {
    root.join(server)
}

/// `<root>/<server>/apps`
pub fn apps_dir(root: &Path, server: &str) -> PathBuf {
    server_dir(root, server).join("apps")
}

/// `<root>/<server>/<kind>/<dbname>_backup.<ext>`
pub fn db_dump_path(root: &Path, server: &str, kind: DatabaseKind, db_name: &str) -> PathBuf {
    server_dir(root, server)
        .join(kind.tag())
        .join(kind.dump_file_name(db_name))
}

/// Creates `dir` and all parents; a no-op when it already exists.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))
}

/// Writes `contents` to `dest` through a sibling temp file, so readers never see a torn file.
pub fn write_atomic(dest: &Path, contents: &[u8]) -> Result<()> {
    let parent = dest
        .parent()
        .with_context(|| format!("No parent directory for {}", dest.display()))?;
    ensure_dir(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("Failed to write temp file for {}", dest.display()))?;
    tmp.persist(dest)
        .with_context(|| format!("Failed to move temp file into place at {}", dest.display()))?;
    Ok(())
}

/// Path a download is staged at before it is renamed over `dest`.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    dest.with_file_name(name)
}

/// Removes a file if present.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
