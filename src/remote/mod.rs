//! Remote execution seam
//!
//! The engines never build shell strings. They describe each remote procedure as a
//! [`RemoteCommand`] and hand it to a [`RemoteExecutor`], which owns quoting and
//! authentication.

pub(crate) mod ssh;
#[cfg(test)]
pub(crate) mod fake;

use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;

use crate::config::ServerProfile;
use crate::errors::AppError;
use crate::utils::databases::DatabaseKind;

pub const DOKKU_HOME: &str = "/home/dokku";
pub const STORAGE_ROOT: &str = "/var/lib/dokku/data/storage";
pub const REMOTE_TMP: &str = "/tmp";
/// uid:gid of the `herokuish` user that runs Dokku containers.
pub const STORAGE_OWNER: &str = "32767:32767";

/// A program invocation on the remote host, with optional file redirections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub program: String,
    pub args: Vec<String>,
    pub stdin_from: Option<String>,
    pub stdout_to: Option<String>,
}

impl RemoteCommand {
    pub fn new(program: impl Into<String>) -> Self {
        RemoteCommand {
            program: program.into(),
            args: Vec::new(),
            stdin_from: None,
            stdout_to: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin_from(mut self, path: impl Into<String>) -> Self {
        self.stdin_from = Some(path.into());
        self
    }

    pub fn stdout_to(mut self, path: impl Into<String>) -> Self {
        self.stdout_to = Some(path.into());
        self
    }

    /// Renders the command for a POSIX shell with every token single-quoted.
    pub fn to_shell_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 5);
        parts.push(sh_quote(&self.program));
        parts.extend(self.args.iter().map(|a| sh_quote(a)));
        if let Some(input) = &self.stdin_from {
            parts.push("<".to_string());
            parts.push(sh_quote(input));
        }
        if let Some(output) = &self.stdout_to {
            parts.push(">".to_string());
            parts.push(sh_quote(output));
        }
        parts.join(" ")
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        if let Some(input) = &self.stdin_from {
            write!(f, " < {}", input)?;
        }
        if let Some(output) = &self.stdout_to {
            write!(f, " > {}", output)?;
        }
        Ok(())
    }
}

pub fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl RemoteOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

/// Runs commands on and copies files to/from a configured server.
///
/// `run` returns `Ok` for any completed command, whatever its exit status; only a
/// failure to reach the host is an `Err`. Use [`run_checked`] for mandatory steps.
pub trait RemoteExecutor {
    async fn run(&self, profile: &ServerProfile, command: &RemoteCommand) -> Result<RemoteOutput>;

    async fn copy(
        &self,
        profile: &ServerProfile,
        local_path: &Path,
        remote_path: &str,
        direction: TransferDirection,
    ) -> Result<()>;
}

/// Runs a mandatory step: a non-zero exit status becomes `RemoteCommandFailed`.
pub async fn run_checked<E: RemoteExecutor>(
    executor: &E,
    profile: &ServerProfile,
    command: &RemoteCommand,
) -> Result<RemoteOutput> {
    let output = executor.run(profile, command).await?;
    if !output.success() {
        anyhow::bail!(AppError::RemoteCommandFailed {
            command: command.to_string(),
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}

/// Runs an optional probe: `Some(stdout)` on success, `None` on any non-zero status.
pub async fn run_probe<E: RemoteExecutor>(
    executor: &E,
    profile: &ServerProfile,
    command: &RemoteCommand,
) -> Result<Option<String>> {
    let output = executor.run(profile, command).await?;
    if output.success() {
        Ok(Some(output.stdout))
    } else {
        tracing::debug!(command = %command, status = output.status, "probe reported absent");
        Ok(None)
    }
}

/// Downloads `remote_path` to `dest` through a `.partial` file, renamed only on success.
pub async fn download_into<E: RemoteExecutor>(
    executor: &E,
    profile: &ServerProfile,
    remote_path: &str,
    dest: &Path,
) -> Result<()> {
    let staging = crate::utils::partial_path(dest);
    let result = executor
        .copy(profile, &staging, remote_path, TransferDirection::Download)
        .await;
    if let Err(e) = result {
        crate::utils::remove_if_exists(&staging)?;
        return Err(e);
    }
    std::fs::rename(&staging, dest).with_context(|| {
        format!("Failed to move {} into place at {}", staging.display(), dest.display())
    })?;
    Ok(())
}

/// Deletes a remote temp file. Failures are logged, never returned.
pub async fn cleanup_temp<E: RemoteExecutor>(executor: &E, profile: &ServerProfile, remote_path: &str) {
    match executor.run(profile, &remove_file(remote_path)).await {
        Ok(out) if out.success() => {
            tracing::debug!(server = %profile.name, path = remote_path, "removed remote temp file");
        }
        Ok(out) => tracing::warn!(
            "⚠️ Could not remove remote temp file {} on {} (status {}): {}",
            remote_path,
            profile.name,
            out.status,
            out.stderr.trim()
        ),
        Err(e) => tracing::warn!(
            "⚠️ Could not remove remote temp file {} on {}: {:#}",
            remote_path,
            profile.name,
            e
        ),
    }
}

// Dokku command vocabulary

pub fn dokku(subcommand: &str) -> RemoteCommand {
    RemoteCommand::new("dokku").arg(subcommand)
}

pub fn apps_list() -> RemoteCommand {
    dokku("apps:list")
}

pub fn apps_create(app: &str) -> RemoteCommand {
    dokku("apps:create").arg(app)
}

pub fn domains_add<'a>(app: &str, domains: impl IntoIterator<Item = &'a str>) -> RemoteCommand {
    dokku("domains:add").arg(app).args(domains)
}

pub fn config_set<'a>(app: &str, pairs: impl IntoIterator<Item = &'a str>) -> RemoteCommand {
    dokku("config:set").arg("--no-restart").arg(app).args(pairs)
}

pub fn config_unset(app: &str, key: &str) -> RemoteCommand {
    dokku("config:unset").arg("--no-restart").arg(app).arg(key)
}

pub fn read_app_file(app: &str, file: &str) -> RemoteCommand {
    RemoteCommand::new("cat").arg(format!("{}/{}/{}", DOKKU_HOME, app, file))
}

pub fn storage_dir(app: &str) -> String {
    format!("{}/{}", STORAGE_ROOT, app)
}

pub fn storage_temp_archive(app: &str) -> String {
    format!("{}/{}_storage.tar.gz", REMOTE_TMP, app)
}

pub fn dir_exists(path: &str) -> RemoteCommand {
    RemoteCommand::new("test").arg("-d").arg(path)
}

pub fn make_dir(path: &str) -> RemoteCommand {
    RemoteCommand::new("mkdir").arg("-p").arg(path)
}

pub fn archive_storage(app: &str, archive: &str) -> RemoteCommand {
    RemoteCommand::new("tar")
        .arg("-czf")
        .arg(archive)
        .arg("-C")
        .arg(STORAGE_ROOT)
        .arg(app)
}

pub fn extract_storage(archive: &str) -> RemoteCommand {
    RemoteCommand::new("tar")
        .arg("-xzf")
        .arg(archive)
        .arg("-C")
        .arg(STORAGE_ROOT)
}

pub fn chown_storage(path: &str) -> RemoteCommand {
    RemoteCommand::new("chown").arg("-R").arg(STORAGE_OWNER).arg(path)
}

pub fn remove_file(path: &str) -> RemoteCommand {
    RemoteCommand::new("rm").arg("-f").arg(path)
}

pub fn db_temp_file(kind: DatabaseKind, db_name: &str) -> String {
    format!("{}/{}", REMOTE_TMP, kind.dump_file_name(db_name))
}

pub fn db_export(kind: DatabaseKind, db_name: &str, remote_file: &str) -> RemoteCommand {
    dokku(&kind.export_procedure()).arg(db_name).stdout_to(remote_file)
}

pub fn db_import(kind: DatabaseKind, db_name: &str, remote_file: &str) -> RemoteCommand {
    dokku(&kind.import_procedure()).arg(db_name).stdin_from(remote_file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::classify;
    use fake::{FakeExecutor, test_profile};

    #[test]
    fn test_shell_string_quotes_every_token() {
        let cmd = config_set("blog", ["KEY=it's; rm -rf /"]);
        assert_eq!(
            cmd.to_shell_string(),
            r#"'dokku' 'config:set' '--no-restart' 'blog' 'KEY=it'\''s; rm -rf /'"#
        );
    }

    #[test]
    fn test_shell_string_redirections() {
        let cmd = db_export(DatabaseKind::Postgres, "blog", "/tmp/blog_backup.sql");
        assert_eq!(
            cmd.to_shell_string(),
            "'dokku' 'postgres:export' 'blog' > '/tmp/blog_backup.sql'"
        );
        let cmd = db_import(DatabaseKind::Mongo, "events", "/tmp/events_backup.archive");
        assert_eq!(
            cmd.to_string(),
            "dokku mongo:import events < /tmp/events_backup.archive"
        );
    }

    #[test]
    fn test_storage_commands() {
        assert_eq!(
            archive_storage("blog", "/tmp/blog_storage.tar.gz").to_string(),
            "tar -czf /tmp/blog_storage.tar.gz -C /var/lib/dokku/data/storage blog"
        );
        assert_eq!(
            chown_storage(&storage_dir("blog")).to_string(),
            "chown -R 32767:32767 /var/lib/dokku/data/storage/blog"
        );
        assert_eq!(read_app_file("blog", "VHOST").to_string(), "cat /home/dokku/blog/VHOST");
    }

    #[tokio::test]
    async fn test_checked_versus_probe() -> anyhow::Result<()> {
        let fake = FakeExecutor::new();
        fake.respond("test -d", 1, "");
        let profile = test_profile();

        assert_eq!(run_probe(&fake, &profile, &dir_exists("/nope")).await?, None);
        let err = run_checked(&fake, &profile, &dir_exists("/nope")).await.unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(AppError::RemoteCommandFailed { status: 1, command, .. }) if command == "test -d /nope"
        ));
        assert_eq!(run_probe(&fake, &profile, &apps_list()).await?, Some(String::new()));
        Ok(())
    }

    #[tokio::test]
    async fn test_download_into_renames_on_success_only() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let dest = dir.path().join("blog_backup.sql");
        let fake = FakeExecutor::new();
        let profile = test_profile();

        assert!(download_into(&fake, &profile, "/tmp/missing", &dest).await.is_err());
        assert!(!dest.exists());
        assert!(!crate::utils::partial_path(&dest).exists());

        fake.remote_file("/tmp/blog_backup.sql", b"-- dump");
        download_into(&fake, &profile, "/tmp/blog_backup.sql", &dest).await?;
        assert_eq!(std::fs::read(&dest)?, b"-- dump");
        assert!(!crate::utils::partial_path(&dest).exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_cleanup_never_fails() {
        let fake = FakeExecutor::new();
        fake.unreachable("rm");
        cleanup_temp(&fake, &test_profile(), "/tmp/x").await;
        assert_eq!(fake.commands(), vec!["rm -f /tmp/x"]);
    }
}
