//! Suite configuration.
//!
//! Loaded from a mode-selected TOML file (`<config_dir>/sanity.toml` or
//! `<config_dir>/full.toml`), then overridden by environment variables.
//! Precedence: environment > file > built-in default.

use scale_core::{parse_quantity, RetryPolicy, SamplingConfig};
use scale_probe::Credentials;
use scale_types::Mode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Root configuration for a suite run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuiteConfig {
    /// Retry Controller policy.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Guest sampling.
    #[serde(default)]
    pub sampling: SamplingSection,
    /// Guest access.
    #[serde(default)]
    pub ssh: SshConfig,
    /// Provisioning engine and cluster tooling.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Results layout.
    #[serde(default)]
    pub results: ResultsConfig,
    /// Workload sizing handed to templates and validations.
    #[serde(default)]
    pub workload: WorkloadConfig,
    /// Post-test teardown.
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts before giving up (default: 130).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait after each of the first `early_wait_attempts` failures (default: 5).
    #[serde(default = "default_early_wait_secs")]
    pub early_wait_secs: u64,
    /// Number of attempts that use the early wait (default: 12).
    #[serde(default = "default_early_wait_attempts")]
    pub early_wait_attempts: u32,
    /// Wait after every later failure (default: 30).
    #[serde(default = "default_late_wait_secs")]
    pub late_wait_secs: u64,
}

/// Guest sampling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingSection {
    /// Percentage of units probed over SSH, 0 disables (default: 10).
    #[serde(default = "default_percentage")]
    pub percentage: u32,
    /// Connection attempts per sampled unit (default: 8).
    #[serde(default = "default_max_ssh_retries")]
    pub max_ssh_retries: u32,
    /// Seconds between connection attempts (default: 15).
    #[serde(default = "default_ssh_retry_interval_secs")]
    pub retry_interval_secs: u64,
}

/// Guest access configuration. Key auth wins over password auth.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SshConfig {
    /// Guest user (default: fedora).
    #[serde(default = "default_ssh_user")]
    pub user: String,
    /// Private key for key auth.
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    /// Password for password auth.
    #[serde(default)]
    pub password: Option<String>,
    /// Connection timeout in seconds (default: 10).
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// `virtctl` binary (default: virtctl).
    #[serde(default = "default_virtctl")]
    pub virtctl: String,
}

/// Provisioning engine and cluster tooling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine binary (default: kube-burner).
    #[serde(default = "default_engine_binary")]
    pub binary: String,
    /// Flags appended to every engine invocation.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// `kubectl` binary (default: kubectl).
    #[serde(default = "default_kubectl")]
    pub kubectl: String,
    /// Kubeconfig passed to `kubectl`; ambient config when unset.
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
    /// Bound on one `kubectl` call in seconds (default: 120).
    #[serde(default = "default_kubectl_timeout_secs")]
    pub kubectl_timeout_secs: u64,
}

/// Results layout configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsConfig {
    /// Root under which every run directory is created (default: results).
    #[serde(default = "default_results_root")]
    pub root: PathBuf,
}

/// Workload sizing. Unset values leave template defaults alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// VMs per test.
    #[serde(default)]
    pub vm_count: Option<usize>,
    /// vCPUs per VM.
    #[serde(default)]
    pub cpu_cores: Option<u32>,
    /// Guest memory quantity (e.g. `4Gi`).
    #[serde(default)]
    pub memory: Option<String>,
    /// Data disk quantity (e.g. `10Gi`).
    #[serde(default)]
    pub disk_size: Option<String>,
    /// Interfaces per VM.
    #[serde(default)]
    pub nic_count: Option<usize>,
}

/// Teardown configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Delete test objects after each test (default: true).
    #[serde(default = "default_cleanup_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_max_attempts() -> u32 {
    130
}

fn default_early_wait_secs() -> u64 {
    5
}

fn default_early_wait_attempts() -> u32 {
    12
}

fn default_late_wait_secs() -> u64 {
    30
}

fn default_percentage() -> u32 {
    10
}

fn default_max_ssh_retries() -> u32 {
    8
}

fn default_ssh_retry_interval_secs() -> u64 {
    15
}

fn default_ssh_user() -> String {
    "fedora".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_virtctl() -> String {
    "virtctl".to_string()
}

fn default_engine_binary() -> String {
    "kube-burner".to_string()
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

fn default_kubectl_timeout_secs() -> u64 {
    120
}

fn default_results_root() -> PathBuf {
    PathBuf::from("results")
}

fn default_cleanup_enabled() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            early_wait_secs: default_early_wait_secs(),
            early_wait_attempts: default_early_wait_attempts(),
            late_wait_secs: default_late_wait_secs(),
        }
    }
}

impl Default for SamplingSection {
    fn default() -> Self {
        Self {
            percentage: default_percentage(),
            max_ssh_retries: default_max_ssh_retries(),
            retry_interval_secs: default_ssh_retry_interval_secs(),
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            key_path: None,
            password: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            virtctl: default_virtctl(),
        }
    }
}

impl fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConfig")
            .field("user", &self.user)
            .field("key_path", &self.key_path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("virtctl", &self.virtctl)
            .finish()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_engine_binary(),
            extra_args: Vec::new(),
            kubectl: default_kubectl(),
            kubeconfig: None,
            kubectl_timeout_secs: default_kubectl_timeout_secs(),
        }
    }
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            root: default_results_root(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: default_cleanup_enabled(),
        }
    }
}

impl SuiteConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Path of the file selected by `mode`.
    pub fn mode_file(config_dir: &Path, mode: Mode) -> PathBuf {
        config_dir.join(format!("{}.toml", mode))
    }

    /// Load the file for `mode`, or `explicit` when given, then apply the
    /// process environment and validate.
    ///
    /// A missing mode file is an error; only an explicit `--config` replaces it.
    pub fn resolve(config_dir: &Path, mode: Mode, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Self::mode_file(config_dir, mode);
                if !path.exists() {
                    return Err(ConfigError::MissingModeFile { mode, path });
                }
                Self::from_file(&path)?
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults (or `explicit`) plus environment. Used by commands that run
    /// inside an engine hook, where no mode is known.
    pub fn from_env(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] for any value that does not
    /// parse into its field's type.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &'static str| lookup(var).map(|value| (var, value));

        if let Some((var, v)) = get("MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_var(var, &v)?;
        }
        if let Some((var, v)) = get("EARLY_WAIT_SECONDS") {
            self.retry.early_wait_secs = parse_var(var, &v)?;
        }
        if let Some((var, v)) = get("EARLY_WAIT_ATTEMPTS") {
            self.retry.early_wait_attempts = parse_var(var, &v)?;
        }
        if let Some((var, v)) = get("LATE_WAIT_SECONDS") {
            self.retry.late_wait_secs = parse_var(var, &v)?;
        }
        if let Some((var, v)) = get("SSH_VALIDATION_PERCENTAGE") {
            self.sampling.percentage = parse_var(var, &v)?;
        }
        if let Some((var, v)) = get("MAX_SSH_RETRIES") {
            self.sampling.max_ssh_retries = parse_var(var, &v)?;
        }
        if let Some((var, v)) = get("SSH_RETRY_INTERVAL_SECONDS") {
            self.sampling.retry_interval_secs = parse_var(var, &v)?;
        }
        if let Some((_, v)) = get("SSH_USER") {
            self.ssh.user = v;
        }
        if let Some((_, v)) = get("SSH_KEY_PATH") {
            self.ssh.key_path = Some(PathBuf::from(v));
        }
        if let Some((_, v)) = get("SSH_PASSWORD") {
            self.ssh.password = Some(v);
        }
        if let Some((var, v)) = get("SSH_CONNECT_TIMEOUT_SECONDS") {
            self.ssh.connect_timeout_secs = parse_var(var, &v)?;
        }
        if let Some((_, v)) = get("VIRTCTL") {
            self.ssh.virtctl = v;
        }
        if let Some((_, v)) = get("KUBECTL") {
            self.engine.kubectl = v;
        }
        if let Some((var, v)) = get("KUBECTL_TIMEOUT_SECONDS") {
            self.engine.kubectl_timeout_secs = parse_var(var, &v)?;
        }
        if let Some((_, v)) = get("ENGINE_BINARY") {
            self.engine.binary = v;
        }
        if let Some((_, v)) = get("RESULTS_ROOT") {
            self.results.root = PathBuf::from(v);
        }
        if let Some((var, v)) = get("VM_COUNT") {
            self.workload.vm_count = Some(parse_var(var, &v)?);
        }
        if let Some((var, v)) = get("VM_CPU_CORES") {
            self.workload.cpu_cores = Some(parse_var(var, &v)?);
        }
        if let Some((var, v)) = get("VM_MEMORY") {
            self.workload.memory = Some(parse_quantity_var(var, v)?);
        }
        if let Some((var, v)) = get("VM_DISK_SIZE") {
            self.workload.disk_size = Some(parse_quantity_var(var, v)?);
        }
        if let Some((var, v)) = get("VM_NIC_COUNT") {
            self.workload.nic_count = Some(parse_var(var, &v)?);
        }
        if let Some((var, v)) = get("CLEANUP") {
            self.cleanup.enabled = parse_bool(&v).ok_or_else(|| ConfigError::InvalidOverride {
                var,
                value: v.clone(),
                reason: "expected true/false/1/0/yes/no".to_string(),
            })?;
        }
        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry_policy()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.sampling()?;
        if self.engine.kubectl_timeout_secs == 0 {
            return Err(ConfigError::Invalid("engine.kubectl_timeout_secs must be > 0".to_string()));
        }
        for (field, value) in [
            ("workload.memory", &self.workload.memory),
            ("workload.disk_size", &self.workload.disk_size),
        ] {
            if let Some(value) = value {
                parse_quantity(value)
                    .map_err(|e| ConfigError::Invalid(format!("{} '{}': {}", field, value, e)))?;
            }
        }
        Ok(())
    }

    /// Typed retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            early_wait: Duration::from_secs(self.retry.early_wait_secs),
            early_wait_attempts: self.retry.early_wait_attempts,
            late_wait: Duration::from_secs(self.retry.late_wait_secs),
        }
    }

    /// Typed sampling parameters.
    pub fn sampling(&self) -> Result<SamplingConfig, ConfigError> {
        SamplingConfig::new(
            self.sampling.percentage,
            self.sampling.max_ssh_retries,
            Duration::from_secs(self.sampling.retry_interval_secs),
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Guest credentials, if any are configured.
    pub fn credentials(&self) -> Option<Credentials> {
        let user = self.ssh.user.clone();
        match (&self.ssh.key_path, &self.ssh.password) {
            (Some(key_path), _) => Some(Credentials::Key {
                user,
                key_path: key_path.clone(),
            }),
            (None, Some(password)) => Some(Credentials::Password {
                user,
                password: password.clone(),
            }),
            (None, None) => None,
        }
    }

    /// Resolved values exported to the engine, so validation hooks it
    /// launches see the same settings.
    pub fn to_env(&self) -> Vec<(&'static str, String)> {
        let mut env = vec![
            ("MAX_ATTEMPTS", self.retry.max_attempts.to_string()),
            ("EARLY_WAIT_SECONDS", self.retry.early_wait_secs.to_string()),
            ("EARLY_WAIT_ATTEMPTS", self.retry.early_wait_attempts.to_string()),
            ("LATE_WAIT_SECONDS", self.retry.late_wait_secs.to_string()),
            ("SSH_VALIDATION_PERCENTAGE", self.sampling.percentage.to_string()),
            ("MAX_SSH_RETRIES", self.sampling.max_ssh_retries.to_string()),
            ("SSH_RETRY_INTERVAL_SECONDS", self.sampling.retry_interval_secs.to_string()),
            ("SSH_USER", self.ssh.user.clone()),
            ("SSH_CONNECT_TIMEOUT_SECONDS", self.ssh.connect_timeout_secs.to_string()),
            ("VIRTCTL", self.ssh.virtctl.clone()),
            ("KUBECTL", self.engine.kubectl.clone()),
            ("KUBECTL_TIMEOUT_SECONDS", self.engine.kubectl_timeout_secs.to_string()),
            ("CLEANUP", self.cleanup.enabled.to_string()),
        ];
        if let Some(key_path) = &self.ssh.key_path {
            env.push(("SSH_KEY_PATH", key_path.display().to_string()));
        }
        if let Some(password) = &self.ssh.password {
            env.push(("SSH_PASSWORD", password.clone()));
        }
        // Read by kubectl itself, so hooks reach the same cluster.
        if let Some(kubeconfig) = &self.engine.kubeconfig {
            env.push(("KUBECONFIG", kubeconfig.display().to_string()));
        }
        let workload = &self.workload;
        let sizing = [
            ("VM_COUNT", workload.vm_count.map(|v| v.to_string())),
            ("VM_CPU_CORES", workload.cpu_cores.map(|v| v.to_string())),
            ("VM_MEMORY", workload.memory.clone()),
            ("VM_DISK_SIZE", workload.disk_size.clone()),
            ("VM_NIC_COUNT", workload.nic_count.map(|v| v.to_string())),
        ];
        env.extend(sizing.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))));
        env
    }
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidOverride {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_quantity_var(var: &'static str, value: String) -> Result<String, ConfigError> {
    match parse_quantity(&value) {
        Ok(_) => Ok(value),
        Err(e) => Err(ConfigError::InvalidOverride {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

/// `true/false/1/0/yes/no`, case-insensitive.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// The mode's file does not exist and no explicit file was given.
    #[error("no configuration for mode '{mode}': {path} not found (pass --config to use another file)")]
    MissingModeFile {
        /// Requested mode.
        mode: Mode,
        /// Expected path.
        path: PathBuf,
    },
    /// An environment override does not parse.
    #[error("invalid value '{value}' for {var}: {reason}")]
    InvalidOverride {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
        /// Parse failure.
        reason: String,
    },
    /// Values parse but are out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
