// dokkubackup/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::AppError;
use crate::utils::expand_tilde;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "DOKKU_BACKUP_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "~/.dokku-backup/config.json";

// Structs for deserializing the config document
#[derive(Debug, Clone, Deserialize)]
pub struct RawServerConfig {
    pub host: String,
    pub user: String,
    pub ssh_key: String,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    pub backup_directory: String,
    #[serde(default)]
    pub servers: BTreeMap<String, RawServerConfig>,
}

/// Connection parameters for one Dokku host, resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProfile {
    pub name: String,
    pub host: String,
    pub user: String,
    pub ssh_key: PathBuf,
    pub port: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    backup_root: PathBuf,
    servers: BTreeMap<String, ServerProfile>,
}

impl AppConfig {
    /// Locates the config file: `$DOKKU_BACKUP_CONFIG`, else the per-user default.
    pub fn default_path() -> Result<PathBuf> {
        match env::var(CONFIG_ENV_VAR) {
            Ok(p) if !p.trim().is_empty() => expand_tilde(p.trim()),
            _ => expand_tilde(DEFAULT_CONFIG_PATH),
        }
    }

    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.is_file() {
            anyhow::bail!(AppError::ConfigMissing(config_path.to_path_buf()));
        }
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;

        let is_yaml = matches!(
            config_path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        );
        let raw: RawConfig = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| {
                AppError::ConfigInvalid(format!("{}: {}", config_path.display(), e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                AppError::ConfigInvalid(format!("{}: {}", config_path.display(), e))
            })?
        };

        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawConfig) -> Result<Self> {
        if raw.backup_directory.trim().is_empty() {
            anyhow::bail!(AppError::ConfigInvalid(
                "backup_directory cannot be empty".to_string()
            ));
        }
        let backup_root = expand_tilde(raw.backup_directory.trim())?;

        let mut servers = BTreeMap::new();
        for (name, server) in raw.servers {
            if server.host.trim().is_empty() || server.user.trim().is_empty() {
                anyhow::bail!(AppError::ConfigInvalid(format!(
                    "server '{}' must define both host and user",
                    name
                )));
            }
            let profile = ServerProfile {
                name: name.clone(),
                host: server.host.trim().to_string(),
                user: server.user.trim().to_string(),
                ssh_key: expand_tilde(server.ssh_key.trim())?,
                port: server.port,
            };
            servers.insert(name, profile);
        }

        Ok(AppConfig {
            backup_root,
            servers,
        })
    }

    pub fn resolve(&self, server_name: &str) -> Result<&ServerProfile> {
        self.servers
            .get(server_name)
            .ok_or_else(|| AppError::ServerNotFound(server_name.to_string()).into())
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }
}
