//! Remote command execution inside a unit via `virtctl ssh`.
//!
//! Two authentication modes: key-based non-interactive (`BatchMode=yes`)
//! and password-based through `sshpass`. Every invocation has a bounded
//! connect timeout and an overall process timeout.

use async_trait::async_trait;
use scale_types::UnitRef;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::RemoteError;

/// Guest login credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Private key authentication.
    Key {
        /// Guest user.
        user: String,
        /// Private key file.
        key_path: PathBuf,
    },
    /// Password authentication.
    Password {
        /// Guest user.
        user: String,
        /// Guest password.
        password: String,
    },
}

impl Credentials {
    /// Guest user name.
    pub fn user(&self) -> &str {
        match self {
            Credentials::Key { user, .. } | Credentials::Password { user, .. } => user,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Key { user, key_path } => f
                .debug_struct("Key")
                .field("user", user)
                .field("key_path", key_path)
                .finish(),
            Credentials::Password { user, .. } => f
                .debug_struct("Password")
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Run one command string inside a unit and return its stdout.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Execute `command` on `unit`.
    async fn run(&self, unit: &UnitRef, command: &str) -> Result<String, RemoteError>;
}

/// `virtctl ssh` executor.
#[derive(Debug, Clone)]
pub struct VirtctlSsh {
    binary: String,
    credentials: Credentials,
    connect_timeout: Duration,
}

/// Extra time allowed for the command itself after the connection is up.
const COMMAND_GRACE: Duration = Duration::from_secs(30);

impl VirtctlSsh {
    /// Executor using `virtctl` from `PATH`.
    pub fn new(credentials: Credentials, connect_timeout: Duration) -> Self {
        Self {
            binary: "virtctl".to_string(),
            credentials,
            connect_timeout,
        }
    }

    /// Use a different virtctl binary.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Program and arguments for one invocation.
    pub fn command_line(&self, unit: &UnitRef, command: &str) -> (String, Vec<String>) {
        let mut ssh_opts = vec![
            "StrictHostKeyChecking=no".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "LogLevel=ERROR".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ];

        let mut virtctl = vec![
            "ssh".to_string(),
            "--namespace".to_string(),
            unit.namespace.clone(),
        ];

        match &self.credentials {
            Credentials::Key { key_path, .. } => {
                ssh_opts.push("BatchMode=yes".to_string());
                virtctl.push("--identity-file".to_string());
                virtctl.push(key_path.display().to_string());
            }
            Credentials::Password { .. } => {
                ssh_opts.push("PreferredAuthentications=password".to_string());
                ssh_opts.push("PubkeyAuthentication=no".to_string());
            }
        }

        for opt in ssh_opts {
            virtctl.push("--local-ssh-opts".to_string());
            virtctl.push(format!("-o {}", opt));
        }
        virtctl.push("--command".to_string());
        virtctl.push(command.to_string());
        virtctl.push(format!("{}@vmi/{}", self.credentials.user(), unit.name));

        match &self.credentials {
            Credentials::Key { .. } => (self.binary.clone(), virtctl),
            Credentials::Password { password, .. } => {
                let mut args = vec!["-p".to_string(), password.clone(), self.binary.clone()];
                args.extend(virtctl);
                ("sshpass".to_string(), args)
            }
        }
    }
}

#[async_trait]
impl RemoteExec for VirtctlSsh {
    async fn run(&self, unit: &UnitRef, command: &str) -> Result<String, RemoteError> {
        let (program, args) = self.command_line(unit, command);
        let bound = self.connect_timeout + COMMAND_GRACE;

        let child = tokio::process::Command::new(&program)
            .args(&args)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(bound, child).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(RemoteError::Timeout {
                    unit: unit.to_string(),
                    seconds: bound.as_secs(),
                })
            }
        };

        if !output.status.success() {
            return Err(RemoteError::CommandFailed {
                unit: unit.to_string(),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
