// dokkubackup/src/restore/db_restore.rs
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::config::ServerProfile;
use crate::errors::AppError;
use crate::remote::{self, RemoteExecutor, TransferDirection};
use crate::utils::databases::DatabaseKind;
use crate::utils;

/// Imports `<root>/<server>/<kind>/<dbname>_backup.<ext>` into the named database.
///
/// The local dump is checked before anything touches the host.
pub async fn restore_database<E: RemoteExecutor>(
    executor: &E,
    profile: &ServerProfile,
    backup_root: &Path,
    kind: DatabaseKind,
    db_name: &str,
) -> Result<()> {
    utils::validate_entity_name("database", db_name)?;
    let dump_path = utils::db_dump_path(backup_root, &profile.name, kind, db_name);
    if !dump_path.is_file() {
        anyhow::bail!(AppError::BackupNotFound(dump_path));
    }

    let remote_file = remote::db_temp_file(kind, db_name);
    info!("📤 Uploading {} to {}", dump_path.display(), profile.name);
    executor
        .copy(profile, &dump_path, &remote_file, TransferDirection::Upload)
        .await
        .with_context(|| format!("Failed to upload dump for {} database {}", kind, db_name))?;

    info!("🔄 Importing {} database {} on {}", kind, db_name, profile.name);
    let imported = remote::run_checked(executor, profile, &remote::db_import(kind, db_name, &remote_file)).await;
    remote::cleanup_temp(executor, profile, &remote_file).await;
    imported.with_context(|| format!("Restore of {} database {} failed", kind, db_name))?;

    info!("✓ {} database {} restored", kind, db_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::classify;
    use crate::remote::fake::{Call, FakeExecutor, test_profile};
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_dump_makes_no_remote_calls() {
        let root = TempDir::new().unwrap();
        let fake = FakeExecutor::new();

        for kind in DatabaseKind::ALL {
            let err = restore_database(&fake, &test_profile(), root.path(), kind, "blog")
                .await
                .unwrap_err();
            assert!(matches!(classify(&err), Some(AppError::BackupNotFound(_))));
        }
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_restore_uploads_imports_and_cleans_up() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let dump = root.path().join("server1/mongo/events_backup.archive");
        fs::create_dir_all(dump.parent().unwrap())?;
        fs::write(&dump, b"archive bytes")?;
        let fake = FakeExecutor::new();

        restore_database(&fake, &test_profile(), root.path(), DatabaseKind::Mongo, "events").await?;

        assert_eq!(
            fake.calls(),
            vec![
                Call::Upload {
                    local: dump.clone(),
                    remote: "/tmp/events_backup.archive".to_string(),
                },
                Call::Run("dokku mongo:import events < /tmp/events_backup.archive".to_string()),
                Call::Run("rm -f /tmp/events_backup.archive".to_string()),
            ]
        );
        assert_eq!(fake.uploaded("/tmp/events_backup.archive"), Some(b"archive bytes".to_vec()));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_import_still_cleans_up() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let dump = root.path().join("server1/postgres/blog_backup.sql");
        fs::create_dir_all(dump.parent().unwrap())?;
        fs::write(&dump, b"-- dump")?;
        let fake = FakeExecutor::new();
        fake.respond("dokku postgres:import", 1, "");

        let err = restore_database(&fake, &test_profile(), root.path(), DatabaseKind::Postgres, "blog")
            .await
            .unwrap_err();

        assert!(matches!(classify(&err), Some(AppError::RemoteCommandFailed { .. })));
        assert_eq!(fake.commands().last().map(String::as_str), Some("rm -f /tmp/blog_backup.sql"));
        Ok(())
    }
}
