// dokkubackup/src/remote/ssh.rs
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use which::which;

use super::{RemoteCommand, RemoteExecutor, RemoteOutput, TransferDirection};
use crate::config::ServerProfile;
use crate::errors::AppError;

/// Production transport: the system `ssh` and `scp` clients, key-authenticated, in batch mode.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    ssh_path: PathBuf,
    scp_path: PathBuf,
}

impl SshExecutor {
    pub fn new() -> Result<Self> {
        let ssh_path = which("ssh").context(
            "ssh executable not found in PATH. Please ensure an OpenSSH client is installed and in your PATH.",
        )?;
        let scp_path = which("scp").context(
            "scp executable not found in PATH. Please ensure an OpenSSH client is installed and in your PATH.",
        )?;
        Ok(SshExecutor { ssh_path, scp_path })
    }

    fn destination(profile: &ServerProfile) -> String {
        format!("{}@{}", profile.user, profile.host)
    }

    fn configure(cmd: &mut Command, profile: &ServerProfile, scp_style: bool) {
        cmd.arg("-o").arg("BatchMode=yes");
        cmd.arg("-i").arg(&profile.ssh_key);
        if let Some(port) = profile.port {
            // scp takes the port as -P, ssh as -p
            cmd.arg(if scp_style { "-P" } else { "-p" }).arg(port.to_string());
        }
    }
}

impl RemoteExecutor for SshExecutor {
    async fn run(&self, profile: &ServerProfile, command: &RemoteCommand) -> Result<RemoteOutput> {
        let mut cmd = Command::new(&self.ssh_path);
        Self::configure(&mut cmd, profile, false);
        cmd.arg(Self::destination(profile))
            .arg("--")
            .arg(command.to_shell_string());

        tracing::debug!(server = %profile.name, command = %command, "running remote command");
        let output = cmd.output().await.with_context(|| {
            format!("Failed to execute ssh to {} for `{}`", profile.host, command)
        })?;

        if is_connection_failure(output.status.code(), &output.stderr) {
            anyhow::bail!(
                "ssh connection to {} failed: {}",
                Self::destination(profile),
                command_summary(&output)
            );
        }

        Ok(RemoteOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code().unwrap_or(-1),
        })
    }

    async fn copy(
        &self,
        profile: &ServerProfile,
        local_path: &Path,
        remote_path: &str,
        direction: TransferDirection,
    ) -> Result<()> {
        let remote = format!("{}:{}", Self::destination(profile), remote_path);
        let local = local_path.display().to_string();
        let (from, to) = match direction {
            TransferDirection::Upload => (local, remote),
            TransferDirection::Download => (remote, local),
        };

        let mut cmd = Command::new(&self.scp_path);
        Self::configure(&mut cmd, profile, true);
        // -q keeps progress meters out of captured stderr
        cmd.arg("-q").arg(&from).arg(&to);

        tracing::debug!(server = %profile.name, %from, %to, "copying file");
        let output = cmd
            .output()
            .await
            .with_context(|| format!("Failed to execute scp from {} to {}", from, to))?;

        if !output.status.success() {
            anyhow::bail!(AppError::TransferFailed {
                from,
                to,
                reason: command_summary(&output),
            });
        }
        Ok(())
    }
}

/// ssh exits with 255 both for its own failures and when the remote command does.
/// Only the former carries one of the client's diagnostics on stderr.
fn is_connection_failure(status: Option<i32>, stderr: &[u8]) -> bool {
    const CLIENT_FAILURES: [&str; 5] = [
        "ssh: ",
        "Permission denied (",
        "Host key verification failed",
        "Connection closed by",
        "kex_exchange_identification",
    ];
    if status != Some(255) {
        return false;
    }
    let stderr = String::from_utf8_lossy(stderr);
    stderr
        .lines()
        .any(|line| CLIENT_FAILURES.iter().any(|marker| line.contains(marker)))
}

fn command_summary(out: &Output) -> String {
    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
    if !stderr.is_empty() {
        return stderr;
    }
    let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if !stdout.is_empty() {
        return stdout;
    }
    format!("status {}", out.status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(port: Option<u16>) -> ServerProfile {
        ServerProfile {
            name: "server1".to_string(),
            host: "dokku1.example.com".to_string(),
            user: "root".to_string(),
            ssh_key: PathBuf::from("/keys/id_rsa"),
            port,
        }
    }

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_configure_ssh_style() {
        let mut cmd = Command::new("ssh");
        SshExecutor::configure(&mut cmd, &profile(Some(2222)), false);
        assert_eq!(
            args_of(&cmd),
            vec!["-o", "BatchMode=yes", "-i", "/keys/id_rsa", "-p", "2222"]
        );
    }

    #[test]
    fn test_configure_scp_style_without_port() {
        let mut cmd = Command::new("scp");
        SshExecutor::configure(&mut cmd, &profile(None), true);
        assert_eq!(args_of(&cmd), vec!["-o", "BatchMode=yes", "-i", "/keys/id_rsa"]);

        let mut cmd = Command::new("scp");
        SshExecutor::configure(&mut cmd, &profile(Some(22)), true);
        assert!(args_of(&cmd).ends_with(&["-P".to_string(), "22".to_string()]));
    }

    #[test]
    fn test_destination() {
        assert_eq!(SshExecutor::destination(&profile(None)), "root@dokku1.example.com");
    }

    #[test]
    fn test_connection_failure_needs_client_diagnostic() {
        assert!(is_connection_failure(
            Some(255),
            b"ssh: connect to host dokku1.example.com port 22: Connection refused\n"
        ));
        assert!(is_connection_failure(
            Some(255),
            b"root@dokku1.example.com: Permission denied (publickey).\n"
        ));
        // a remote command exiting 255 is an ordinary status
        assert!(!is_connection_failure(Some(255), b""));
        assert!(!is_connection_failure(Some(255), b"cat: /home/dokku/blog/VHOST: No such file\n"));
        assert!(!is_connection_failure(Some(1), b"ssh: connect to host x port 22: refused\n"));
    }
}
