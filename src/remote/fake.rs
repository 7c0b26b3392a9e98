//! In-memory executor for engine tests.
use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{RemoteCommand, RemoteExecutor, RemoteOutput, TransferDirection};
use crate::config::ServerProfile;
use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Run(String),
    Upload { local: PathBuf, remote: String },
    Download { remote: String, local: PathBuf },
}

/// What the fake host knows about one app after the commands it has seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeApp {
    pub domains: Vec<String>,
    pub config: BTreeMap<String, String>,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    responses: Vec<(String, RemoteOutput)>,
    unreachable: Vec<String>,
    remote_files: HashMap<String, Vec<u8>>,
    uploads: HashMap<String, Vec<u8>>,
    apps: BTreeMap<String, FakeApp>,
}

#[derive(Default)]
pub struct FakeExecutor {
    state: Mutex<State>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers commands whose display form starts with `prefix`. Later entries win.
    pub fn respond(&self, prefix: &str, status: i32, stdout: &str) -> &Self {
        self.state.lock().unwrap().responses.push((
            prefix.to_string(),
            RemoteOutput {
                stdout: stdout.to_string(),
                stderr: if status == 0 { String::new() } else { format!("{} failed", prefix) },
                status,
            },
        ));
        self
    }

    /// Commands starting with `prefix` fail as if the host could not be reached.
    pub fn unreachable(&self, prefix: &str) -> &Self {
        self.state.lock().unwrap().unreachable.push(prefix.to_string());
        self
    }

    /// Makes `remote_path` available for download.
    pub fn remote_file(&self, remote_path: &str, contents: &[u8]) -> &Self {
        self.state
            .lock()
            .unwrap()
            .remote_files
            .insert(remote_path.to_string(), contents.to_vec());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Run(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    pub fn uploaded(&self, remote_path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().uploads.get(remote_path).cloned()
    }

    pub fn app(&self, name: &str) -> Option<FakeApp> {
        self.state.lock().unwrap().apps.get(name).cloned()
    }

    fn apply(state: &mut State, command: &RemoteCommand) {
        if command.program != "dokku" || command.args.is_empty() {
            return;
        }
        let rest: Vec<&str> = command.args[1..]
            .iter()
            .map(String::as_str)
            .filter(|a| *a != "--no-restart")
            .collect();
        let Some((app, values)) = rest.split_first() else {
            return;
        };
        match command.args[0].as_str() {
            "apps:create" => {
                state.apps.entry(app.to_string()).or_default();
            }
            "domains:add" => {
                let entry = state.apps.entry(app.to_string()).or_default();
                entry.domains.extend(values.iter().map(|d| d.to_string()));
            }
            "config:set" => {
                let entry = state.apps.entry(app.to_string()).or_default();
                for pair in values {
                    if let Some((k, v)) = pair.split_once('=') {
                        entry.config.insert(k.to_string(), v.to_string());
                    }
                }
            }
            "config:unset" => {
                let entry = state.apps.entry(app.to_string()).or_default();
                for key in values {
                    entry.config.remove(*key);
                }
            }
            _ => {}
        }
    }
}

impl RemoteExecutor for FakeExecutor {
    async fn run(&self, _profile: &ServerProfile, command: &RemoteCommand) -> Result<RemoteOutput> {
        let rendered = command.to_string();
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Run(rendered.clone()));

        if state.unreachable.iter().any(|p| rendered.starts_with(p.as_str())) {
            anyhow::bail!("connection reset while running `{}`", rendered);
        }

        let scripted = state
            .responses
            .iter()
            .rev()
            .find(|(prefix, _)| rendered.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone());
        let output = scripted.unwrap_or_default();

        if output.success() {
            Self::apply(&mut state, command);
        }
        Ok(output)
    }

    async fn copy(
        &self,
        _profile: &ServerProfile,
        local_path: &Path,
        remote_path: &str,
        direction: TransferDirection,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match direction {
            TransferDirection::Upload => {
                state.calls.push(Call::Upload {
                    local: local_path.to_path_buf(),
                    remote: remote_path.to_string(),
                });
                let bytes = fs::read(local_path)?;
                state.uploads.insert(remote_path.to_string(), bytes);
            }
            TransferDirection::Download => {
                state.calls.push(Call::Download {
                    remote: remote_path.to_string(),
                    local: local_path.to_path_buf(),
                });
                let Some(bytes) = state.remote_files.get(remote_path).cloned() else {
                    anyhow::bail!(AppError::TransferFailed {
                        from: remote_path.to_string(),
                        to: local_path.display().to_string(),
                        reason: "No such file or directory".to_string(),
                    });
                };
                fs::write(local_path, bytes)?;
            }
        }
        Ok(())
    }
}

pub fn test_profile() -> ServerProfile {
    ServerProfile {
        name: "server1".to_string(),
        host: "dokku1.example.com".to_string(),
        user: "root".to_string(),
        ssh_key: PathBuf::from("/keys/id_rsa"),
        port: None,
    }
}
