//! Batch coordination
//!
//! Parses the command line into an [`Action`], enumerates the entities it targets,
//! and runs the matching engine for each one. A failing entity is recorded in the
//! [`BatchReport`] and the batch moves on to the next.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::backup;
use crate::config::{AppConfig, ServerProfile};
use crate::errors::AppError;
use crate::inventory;
use crate::remote::{self, RemoteExecutor};
use crate::restore;
use crate::utils::databases::DatabaseKind;
use crate::utils::{server_dir, validate_entity_name};

pub const USAGE: &str = "\
Usage:
  dokkubackup backup <server> [app]
  dokkubackup restore <server> [app]
  dokkubackup list <server>
  dokkubackup list-backups <server>
  dokkubackup backup-db <postgres|mongo> <server> <dbname>
  dokkubackup restore-db <postgres|mongo> <server> <dbname>
  dokkubackup help

Config is read from $DOKKU_BACKUP_CONFIG or ~/.dokku-backup/config.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Backup { server: String, app: Option<String> },
    Restore { server: String, app: Option<String> },
    List { server: String },
    ListBackups { server: String },
    BackupDb { kind: DatabaseKind, server: String, db: String },
    RestoreDb { kind: DatabaseKind, server: String, db: String },
    Help,
}

impl Action {
    /// Parses the arguments after the program name. Arity errors come before kind checks.
    pub fn parse(args: &[String]) -> Result<Action> {
        let Some((name, rest)) = args.split_first() else {
            anyhow::bail!(AppError::Usage("no action given".to_string()));
        };
        let rest: Vec<&str> = rest.iter().map(String::as_str).collect();

        let action = match (name.as_str(), rest.as_slice()) {
            ("help" | "-h" | "--help", []) => Action::Help,
            ("backup", [server]) => Action::Backup { server: server.to_string(), app: None },
            ("backup", [server, app]) => Action::Backup {
                server: server.to_string(),
                app: Some(app.to_string()),
            },
            ("restore", [server]) => Action::Restore { server: server.to_string(), app: None },
            ("restore", [server, app]) => Action::Restore {
                server: server.to_string(),
                app: Some(app.to_string()),
            },
            ("list", [server]) => Action::List { server: server.to_string() },
            ("list-backups", [server]) => Action::ListBackups { server: server.to_string() },
            ("backup-db", [kind, server, db]) => Action::BackupDb {
                kind: kind.parse()?,
                server: server.to_string(),
                db: db.to_string(),
            },
            ("restore-db", [kind, server, db]) => Action::RestoreDb {
                kind: kind.parse()?,
                server: server.to_string(),
                db: db.to_string(),
            },
            (
                known @ ("help" | "-h" | "--help" | "backup" | "restore" | "list" | "list-backups"
                | "backup-db" | "restore-db"),
                _,
            ) => {
                anyhow::bail!(AppError::Usage(format!(
                    "wrong number of arguments for '{}'",
                    known
                )));
            }
            (other, _) => anyhow::bail!(AppError::Usage(format!("unknown action '{}'", other))),
        };

        match &action {
            Action::Backup { app: Some(app), .. } | Action::Restore { app: Some(app), .. } => {
                validate_entity_name("app", app)?;
            }
            Action::BackupDb { db, .. } | Action::RestoreDb { db, .. } => {
                validate_entity_name("database", db)?;
            }
            _ => {}
        }
        Ok(action)
    }

    pub fn server(&self) -> Option<&str> {
        match self {
            Action::Backup { server, .. }
            | Action::Restore { server, .. }
            | Action::List { server }
            | Action::ListBackups { server }
            | Action::BackupDb { server, .. }
            | Action::RestoreDb { server, .. } => Some(server),
            Action::Help => None,
        }
    }

    /// Whether carrying out this action contacts the server.
    pub fn is_remote(&self) -> bool {
        !matches!(self, Action::Help | Action::ListBackups { .. })
    }
}

/// Per-entity results of a `backup` or `restore` run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, anyhow::Error)>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn log_summary(&self, verb: &str) {
        info!(
            "{} finished: {} succeeded, {} failed",
            verb,
            self.succeeded.len(),
            self.failed.len()
        );
        for (entity, err) in &self.failed {
            error!(entity = %entity, "❌ {} of {} failed: {:#}", verb, entity, err);
        }
    }

    /// Turns a report with failures into `BatchIncomplete`.
    pub fn into_result(self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(AppError::BatchIncomplete { failed: self.failed.len() }.into())
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Batch { verb: &'static str, report: BatchReport },
    /// Text for stdout, printed verbatim.
    Output(String),
    Done(String),
}

/// Runs a remote action. `Help` and `ListBackups` are handled by [`run_local`].
pub async fn dispatch<E: RemoteExecutor>(
    action: &Action,
    config: &AppConfig,
    executor: &E,
) -> Result<Outcome> {
    let root = config.backup_root();
    match action {
        Action::Backup { server, app } => {
            let profile = config.resolve(server)?;
            let apps = match app {
                Some(app) => vec![app.clone()],
                None => remote_apps(executor, profile).await?,
            };
            let report = backup_apps(executor, profile, root, &apps).await;
            Ok(Outcome::Batch { verb: "Backup", report })
        }
        Action::Restore { server, app } => {
            let profile = config.resolve(server)?;
            let apps = match app {
                Some(app) => vec![app.clone()],
                None => inventory::recorded_apps(root, &profile.name)?,
            };
            if apps.is_empty() {
                warn!("⚠️ No app backups found for {} under {}", profile.name, root.display());
            }
            let report = restore_apps(executor, profile, root, &apps).await;
            Ok(Outcome::Batch { verb: "Restore", report })
        }
        Action::List { server } => {
            let profile = config.resolve(server)?;
            let output = remote::run_checked(executor, profile, &remote::apps_list()).await?;
            Ok(Outcome::Output(output.stdout))
        }
        Action::BackupDb { kind, server, db } => {
            let profile = config.resolve(server)?;
            let path = backup::backup_database(executor, profile, root, *kind, db).await?;
            Ok(Outcome::Done(format!("Saved {} database {} to {}", kind, db, path.display())))
        }
        Action::RestoreDb { kind, server, db } => {
            let profile = config.resolve(server)?;
            restore::restore_database(executor, profile, root, *kind, db).await?;
            Ok(Outcome::Done(format!("Restored {} database {} on {}", kind, db, profile.name)))
        }
        Action::Help | Action::ListBackups { .. } => run_local(action, config),
    }
}

/// Runs an action that only needs the local backup tree.
pub fn run_local(action: &Action, config: &AppConfig) -> Result<Outcome> {
    match action {
        Action::Help => Ok(Outcome::Output(format!("{}\n", USAGE))),
        Action::ListBackups { server } => {
            let profile = config.resolve(server)?;
            let found = inventory::scan(config.backup_root(), &profile.name)?;
            Ok(Outcome::Output(inventory::render(&profile.name, &found)))
        }
        other => anyhow::bail!("action {:?} needs a remote connection", other),
    }
}

/// Lists the apps on `profile`, skipping the `=====>` header Dokku prints.
pub async fn remote_apps<E: RemoteExecutor>(executor: &E, profile: &ServerProfile) -> Result<Vec<String>> {
    let output = remote::run_checked(executor, profile, &remote::apps_list())
        .await
        .with_context(|| format!("Failed to list apps on {}", profile.name))?;
    Ok(parse_app_list(&output.stdout))
}

pub fn parse_app_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("=====>") && !line.starts_with('!'))
        .map(str::to_string)
        .collect()
}

pub async fn backup_apps<E: RemoteExecutor>(
    executor: &E,
    profile: &ServerProfile,
    backup_root: &Path,
    apps: &[String],
) -> BatchReport {
    let dir = server_dir(backup_root, &profile.name);
    let mut report = BatchReport::default();
    info!("🚀 Backing up {} app(s) from {}", apps.len(), profile.name);
    for app in apps {
        match backup::backup_app(executor, profile, app, &dir).await {
            Ok(result) => {
                debug!(app = %app, storage = result.has_storage, "recorded in {}", result.app_dir.display());
                report.succeeded.push(app.clone());
            }
            Err(e) => report.failed.push((app.clone(), e)),
        }
    }
    report
}

pub async fn restore_apps<E: RemoteExecutor>(
    executor: &E,
    profile: &ServerProfile,
    backup_root: &Path,
    apps: &[String],
) -> BatchReport {
    let dir = server_dir(backup_root, &profile.name);
    let mut report = BatchReport::default();
    info!("🔄 Restoring {} app(s) to {}", apps.len(), profile.name);
    for app in apps {
        match restore::restore_app(executor, profile, app, &dir).await {
            Ok(()) => report.succeeded.push(app.clone()),
            Err(e) => report.failed.push((app.clone(), e)),
        }
    }
    report
}
