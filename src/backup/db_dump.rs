// dokkubackup/src/backup/db_dump.rs
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::ServerProfile;
use crate::remote::{self, RemoteExecutor};
use crate::utils::databases::DatabaseKind;
use crate::utils::{self, ensure_dir};

/// Exports one database through the Dokku plugin and stores the dump at
/// `<root>/<server>/<kind>/<dbname>_backup.<ext>`, replacing any previous dump.
pub async fn backup_database<E: RemoteExecutor>(
    executor: &E,
    profile: &ServerProfile,
    backup_root: &Path,
    kind: DatabaseKind,
    db_name: &str,
) -> Result<PathBuf> {
    utils::validate_entity_name("database", db_name)?;
    let dump_path = utils::db_dump_path(backup_root, &profile.name, kind, db_name);
    if let Some(parent) = dump_path.parent() {
        ensure_dir(parent)?;
    }

    let remote_file = remote::db_temp_file(kind, db_name);
    info!("🔍 Exporting {} database {} on {}", kind, db_name, profile.name);

    // the redirection creates the remote file even when the export fails, so clean up either way
    let exported = remote::run_checked(executor, profile, &remote::db_export(kind, db_name, &remote_file)).await;
    let result = match exported {
        Ok(_) => remote::download_into(executor, profile, &remote_file, &dump_path).await,
        Err(e) => Err(e),
    };
    remote::cleanup_temp(executor, profile, &remote_file).await;
    result.with_context(|| format!("Backup of {} database {} failed", kind, db_name))?;

    info!("✓ {} database {} saved to {}", kind, db_name, dump_path.display());
    Ok(dump_path)
}
