// dokkubackup/src/inventory/mod.rs
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use crate::backup::app::{METADATA_FILE, STORAGE_ARCHIVE};
use crate::backup::AppMetadata;
use crate::utils::databases::DatabaseKind;
use crate::utils::{apps_dir, server_dir};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRecordSummary {
    pub app: String,
    /// `None` when `metadata.json` is missing or unreadable, i.e. the backup never finished.
    pub backup_timestamp: Option<String>,
    pub has_storage: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpSummary {
    pub kind: DatabaseKind,
    pub db_name: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    pub apps: Vec<AppRecordSummary>,
    pub dumps: Vec<DumpSummary>,
}

/// Names of the per-app record directories under `<root>/<server>/apps`, sorted.
pub fn recorded_apps(backup_root: &Path, server: &str) -> Result<Vec<String>> {
    let dir = apps_dir(backup_root, server);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut apps = Vec::new();
    for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk directory: {}", dir.display()))?;
        if entry.file_type().is_dir() {
            apps.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(apps)
}

/// Scans the local backup tree of one server. Reads only the local filesystem.
pub fn scan(backup_root: &Path, server: &str) -> Result<Inventory> {
    let mut inventory = Inventory::default();

    let apps = apps_dir(backup_root, server);
    for app in recorded_apps(backup_root, server)? {
        let app_dir = apps.join(&app);
        let backup_timestamp = fs::read_to_string(app_dir.join(METADATA_FILE))
            .ok()
            .and_then(|text| serde_json::from_str::<AppMetadata>(&text).ok())
            .map(|meta| meta.backup_timestamp);
        inventory.apps.push(AppRecordSummary {
            has_storage: app_dir.join(STORAGE_ARCHIVE).is_file(),
            app,
            backup_timestamp,
        });
    }

    for kind in DatabaseKind::ALL {
        let kind_dir = server_dir(backup_root, server).join(kind.tag());
        if !kind_dir.is_dir() {
            continue;
        }
        let suffix = format!("_backup.{}", kind.extension());
        for entry in WalkDir::new(&kind_dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk directory: {}", kind_dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            let Some(db_name) = name.strip_suffix(suffix.as_str()) else {
                continue;
            };
            let size_bytes = entry
                .metadata()
                .with_context(|| format!("Failed to stat {}", entry.path().display()))?
                .len();
            inventory.dumps.push(DumpSummary {
                kind,
                db_name: db_name.to_string(),
                size_bytes,
            });
        }
    }

    Ok(inventory)
}

pub fn render(server: &str, inventory: &Inventory) -> String {
    let mut out = String::new();
    out.push_str(&format!("=====> Backups for {}\n", server));
    if inventory.apps.is_empty() && inventory.dumps.is_empty() {
        out.push_str("(none)\n");
        return out;
    }
    for app in &inventory.apps {
        out.push_str(&format!(
            "app  {:<24} {:<22} {}\n",
            app.app,
            app.backup_timestamp.as_deref().unwrap_or("incomplete"),
            if app.has_storage { "storage" } else { "-" }
        ));
    }
    for dump in &inventory.dumps {
        out.push_str(&format!(
            "{:<4} {:<24} {} bytes\n",
            dump.kind.tag(),
            dump.db_name,
            dump.size_bytes
        ));
    }
    out
}
