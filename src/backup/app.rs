// dokkubackup/src/backup/app.rs
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::ServerProfile;
use crate::remote::{self, RemoteExecutor};
use crate::utils::{self, ensure_dir, remove_if_exists, write_atomic};

pub const VHOST_FILE: &str = "VHOST";
pub const ENV_FILE: &str = "ENV";
pub const STORAGE_ARCHIVE: &str = "storage.tar.gz";
pub const METADATA_FILE: &str = "metadata.json";

/// Written in place of a VHOST file the app does not have.
pub const NO_VHOST: &str = "no VHOST";
/// Written in place of an ENV file the app does not have.
pub const NO_ENV: &str = "no ENV";

/// Contents of `metadata.json`. Written last; its presence marks a finished backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadata {
    pub app: String,
    pub server: String,
    pub backup_timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppBackup {
    pub app_dir: PathBuf,
    pub has_storage: bool,
}

/// Backs up one app into `<server_dir>/apps/<app>`.
///
/// Missing VHOST or ENV files are recorded as placeholders and a missing storage
/// directory simply leaves `storage.tar.gz` out. Every artifact is replaced on rerun.
pub async fn backup_app<E: RemoteExecutor>(
    executor: &E,
    profile: &ServerProfile,
    app: &str,
    server_dir: &Path,
) -> Result<AppBackup> {
    utils::validate_entity_name("app", app)?;
    let app_dir = server_dir.join("apps").join(app);
    info!("📦 Backing up app {} from {}", app, profile.name);

    ensure_dir(&app_dir)?;
    // drop the old completion marker first so an interrupted rerun is visible as incomplete
    remove_if_exists(&app_dir.join(METADATA_FILE))?;

    fetch_app_file(executor, profile, app, VHOST_FILE, NO_VHOST, &app_dir).await?;
    fetch_app_file(executor, profile, app, ENV_FILE, NO_ENV, &app_dir).await?;

    let has_storage = fetch_storage(executor, profile, app, &app_dir).await?;

    let metadata = AppMetadata {
        app: app.to_string(),
        server: profile.name.clone(),
        backup_timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    };
    let json = serde_json::to_vec_pretty(&metadata).context("Failed to serialize app metadata")?;
    write_atomic(&app_dir.join(METADATA_FILE), &json)?;

    info!("✓ Backup of {} written to {}", app, app_dir.display());
    Ok(AppBackup {
        app_dir,
        has_storage,
    })
}

async fn fetch_app_file<E: RemoteExecutor>(
    executor: &E,
    profile: &ServerProfile,
    app: &str,
    file: &str,
    placeholder: &str,
    app_dir: &Path,
) -> Result<()> {
    let contents = remote::run_probe(executor, profile, &remote::read_app_file(app, file)).await?;
    let contents = match contents {
        Some(text) => text.trim_end().to_string(),
        None => {
            warn!("⚠️ {} has no {} file, writing placeholder", app, file);
            placeholder.to_string()
        }
    };
    write_atomic(&app_dir.join(file), contents.as_bytes())
}

/// Returns whether the app had persistent storage to capture.
async fn fetch_storage<E: RemoteExecutor>(
    executor: &E,
    profile: &ServerProfile,
    app: &str,
    app_dir: &Path,
) -> Result<bool> {
    let local_archive = app_dir.join(STORAGE_ARCHIVE);
    let storage_dir = remote::storage_dir(app);

    let present = remote::run_probe(executor, profile, &remote::dir_exists(&storage_dir))
        .await?
        .is_some();
    if !present {
        info!("ℹ️ {} has no persistent storage, skipping archive", app);
        if remove_if_exists(&local_archive)? {
            info!("Removed stale {} for {}", STORAGE_ARCHIVE, app);
        }
        return Ok(false);
    }

    let remote_archive = remote::storage_temp_archive(app);
    info!("🗜 Archiving {} on {}", storage_dir, profile.name);
    remote::run_checked(executor, profile, &remote::archive_storage(app, &remote_archive)).await?;

    let downloaded = remote::download_into(executor, profile, &remote_archive, &local_archive).await;
    remote::cleanup_temp(executor, profile, &remote_archive).await;
    downloaded.with_context(|| format!("Failed to download storage archive for {}", app))?;

    Ok(true)
}
