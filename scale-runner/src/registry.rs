//! Test registry (`<suite_dir>/registry.toml`).
//!
//! ```toml
//! [[test]]
//! name = "cpu-limits"
//! directory = "tests/cpu-limits"
//! config = "kube-burner.yml"
//! cleanup_selector = "scale-test=cpu-limits"
//!
//! [test.overrides]
//! sanity = "overrides-sanity.yml"
//! full = "overrides-full.yml"
//! ```

use scale_types::Mode;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Registry file name inside the suite directory.
pub const REGISTRY_FILE: &str = "registry.toml";

/// Per-mode variable-override files, relative to the test directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Overrides {
    /// Used in sanity mode.
    pub sanity: PathBuf,
    /// Used in full mode.
    pub full: PathBuf,
}

/// One registered test.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TestDefinition {
    /// Unique name.
    pub name: String,
    /// One-line description for listings.
    #[serde(default)]
    pub description: Option<String>,
    /// Test directory; relative entries are resolved against the suite directory on load.
    pub directory: PathBuf,
    /// Engine config file, relative to `directory`.
    pub config: PathBuf,
    /// Override files per mode.
    pub overrides: Overrides,
    /// Label selector for post-test teardown.
    #[serde(default)]
    pub cleanup_selector: Option<String>,
}

impl TestDefinition {
    /// Engine config file.
    pub fn config_path(&self) -> PathBuf {
        self.directory.join(&self.config)
    }

    /// Override file for `mode`.
    pub fn override_path(&self, mode: Mode) -> PathBuf {
        let file = match mode {
            Mode::Sanity => &self.overrides.sanity,
            Mode::Full => &self.overrides.full,
        };
        self.directory.join(file)
    }

    /// Fail unless the engine config and the `mode` override file both exist.
    pub fn check_inputs(&self, mode: Mode) -> Result<(), RegistryError> {
        for path in [self.config_path(), self.override_path(mode)] {
            if !path.is_file() {
                return Err(RegistryError::MissingInput {
                    test: self.name.clone(),
                    mode,
                    path,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default, rename = "test")]
    tests: Vec<TestDefinition>,
}

/// Registered tests in file order.
#[derive(Debug, Clone)]
pub struct Registry {
    tests: Vec<TestDefinition>,
}

impl Registry {
    /// Load `<suite_dir>/registry.toml`.
    pub fn load(suite_dir: &Path) -> Result<Self, RegistryError> {
        let path = suite_dir.join(REGISTRY_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| RegistryError::ReadError {
            path: path.clone(),
            source: e,
        })?;
        Self::parse(&content, suite_dir).map_err(|e| match e {
            RegistryError::ParseError { source, .. } => RegistryError::ParseError { path, source },
            other => other,
        })
    }

    /// Parse registry TOML, resolving test directories against `suite_dir`.
    pub fn parse(content: &str, suite_dir: &Path) -> Result<Self, RegistryError> {
        let file: RegistryFile = toml::from_str(content).map_err(|e| RegistryError::ParseError {
            path: PathBuf::from(REGISTRY_FILE),
            source: e,
        })?;

        let mut seen = HashSet::new();
        let mut tests = Vec::with_capacity(file.tests.len());
        for mut test in file.tests {
            if !seen.insert(test.name.clone()) {
                return Err(RegistryError::Duplicate(test.name));
            }
            if test.directory.is_relative() {
                test.directory = suite_dir.join(&test.directory);
            }
            tests.push(test);
        }
        Ok(Self { tests })
    }

    /// Every test, in file order.
    pub fn tests(&self) -> &[TestDefinition] {
        &self.tests
    }

    /// Look up one test.
    pub fn get(&self, name: &str) -> Result<&TestDefinition, RegistryError> {
        self.tests
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| RegistryError::UnknownTest {
                name: name.to_string(),
                known: self.names().join(", "),
            })
    }

    /// Registered names.
    pub fn names(&self) -> Vec<&str> {
        self.tests.iter().map(|t| t.name.as_str()).collect()
    }

    /// Resolve a selection: every test with `all`, otherwise the named ones
    /// in the given order. Any unknown name fails the whole selection.
    pub fn select(&self, names: &[String], all: bool) -> Result<Vec<TestDefinition>, RegistryError> {
        if all {
            return Ok(self.tests.clone());
        }
        if names.is_empty() {
            return Err(RegistryError::NothingSelected);
        }
        names
            .iter()
            .map(|name| self.get(name).cloned())
            .collect()
    }
}

/// Registry error types.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Failed to read the registry.
    #[error("failed to read registry {path}: {source}")]
    ReadError {
        /// Registry path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse the registry.
    #[error("failed to parse registry {path}: {source}")]
    ParseError {
        /// Registry path.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Two entries share a name.
    #[error("duplicate test name '{0}' in registry")]
    Duplicate(String),
    /// Requested test is not registered.
    #[error("unknown test '{name}' (available: {known})")]
    UnknownTest {
        /// Requested name.
        name: String,
        /// Registered names.
        known: String,
    },
    /// Neither names nor `--all` were given.
    #[error("no tests selected: pass test names or --all")]
    NothingSelected,
    /// A selected test lacks its engine config or override file.
    #[error("test '{test}' has no input file for mode '{mode}': {path}")]
    MissingInput {
        /// Test name.
        test: String,
        /// Selected mode.
        mode: Mode,
        /// Missing file.
        path: PathBuf,
    },
}
