// dokkubackup/src/restore/app.rs
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::backup::app::{ENV_FILE, NO_ENV, NO_VHOST, STORAGE_ARCHIVE, VHOST_FILE};
use crate::config::ServerProfile;
use crate::errors::AppError;
use crate::remote::{self, RemoteExecutor, TransferDirection};
use crate::utils;

/// Deployment-tracking key that must never be reapplied from a backup.
pub const RESERVED_CONFIG_KEY: &str = "GIT_REV";

/// Recreates one app on `profile` from `<server_dir>/apps/<app>`.
///
/// Creation must succeed before anything else is applied. Domains and config are
/// applied only when the backup captured real content; storage only when an archive exists.
pub async fn restore_app<E: RemoteExecutor>(
    executor: &E,
    profile: &ServerProfile,
    app: &str,
    server_dir: &Path,
) -> Result<()> {
    utils::validate_entity_name("app", app)?;
    let app_dir = server_dir.join("apps").join(app);
    if !app_dir.is_dir() {
        anyhow::bail!(AppError::BackupNotFound(app_dir));
    }

    info!("🔄 Restoring app {} to {}", app, profile.name);
    remote::run_checked(executor, profile, &remote::apps_create(app))
        .await
        .with_context(|| format!("Could not create app {} on {}", app, profile.name))?;

    if let Some(vhost) = read_artifact(&app_dir.join(VHOST_FILE), NO_VHOST)? {
        let domains = parse_vhost_artifact(&vhost);
        if !domains.is_empty() {
            info!("🌐 Adding {} domain(s) to {}", domains.len(), app);
            remote::run_checked(executor, profile, &remote::domains_add(app, domains.iter().copied())).await?;
        }
    }

    if let Some(env) = read_artifact(&app_dir.join(ENV_FILE), NO_ENV)? {
        let pairs = parse_env_artifact(&env);
        if !pairs.is_empty() {
            info!("⚙️ Setting {} config value(s) on {}", pairs.len(), app);
            remote::run_checked(executor, profile, &remote::config_set(app, pairs.iter().map(String::as_str))).await?;
            remote::run_checked(executor, profile, &remote::config_unset(app, RESERVED_CONFIG_KEY)).await?;
        }
    }

    let archive = app_dir.join(STORAGE_ARCHIVE);
    if archive.is_file() {
        restore_storage(executor, profile, app, &archive).await?;
    } else {
        info!("ℹ️ No storage archive for {}, nothing to restore", app);
    }

    info!("✓ App {} restored on {}", app, profile.name);
    Ok(())
}

async fn restore_storage<E: RemoteExecutor>(
    executor: &E,
    profile: &ServerProfile,
    app: &str,
    archive: &Path,
) -> Result<()> {
    let remote_archive = remote::storage_temp_archive(app);
    let storage_dir = remote::storage_dir(app);

    info!("📤 Uploading storage archive for {}", app);
    executor
        .copy(profile, archive, &remote_archive, TransferDirection::Upload)
        .await
        .with_context(|| format!("Failed to upload storage archive for {}", app))?;

    // once uploaded, the temp archive is removed whether or not extraction works
    let unpacked = async {
        remote::run_checked(executor, profile, &remote::make_dir(&storage_dir)).await?;
        remote::run_checked(executor, profile, &remote::extract_storage(&remote_archive)).await?;
        remote::run_checked(executor, profile, &remote::chown_storage(&storage_dir)).await?;
        Ok::<(), anyhow::Error>(())
    }
    .await;
    remote::cleanup_temp(executor, profile, &remote_archive).await;
    unpacked.with_context(|| format!("Failed to restore storage for {}", app))
}

/// Reads a captured artifact, returning `None` when absent, empty, or a placeholder.
fn read_artifact(path: &Path, placeholder: &str) -> Result<Option<String>> {
    if !path.is_file() {
        warn!("⚠️ {} not found, skipping", path.display());
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let trimmed = contents.trim();
    if trimmed.is_empty() || trimmed == placeholder {
        return Ok(None);
    }
    Ok(Some(trimmed.to_string()))
}

/// One domain per non-blank line.
pub fn parse_vhost_artifact(contents: &str) -> Vec<&str> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Turns ENV lines (`KEY=VALUE` or Dokku's `export KEY='VALUE'`) into `KEY=VALUE` arguments.
pub fn parse_env_artifact(contents: &str) -> Vec<String> {
    let mut pairs = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
        let Some((key, value)) = line.split_once('=') else {
            warn!("⚠️ Ignoring malformed ENV line without '='");
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        pairs.push(format!("{}={}", key, unquote(value)));
    }
    pairs
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == b'\'' && last == b'\'' {
            return value[1..value.len() - 1].replace("'\\''", "'");
        }
        if first == b'"' && last == b'"' {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}
