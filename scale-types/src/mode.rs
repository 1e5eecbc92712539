//! Run mode selecting which configuration and override files are loaded.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Run mode. `Sanity` is a small-footprint smoke run, `Full` the real scale run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Small population, short timeouts.
    #[default]
    Sanity,
    /// Full-scale population.
    Full,
}

impl Mode {
    /// Lowercase name, used for file lookup (`sanity.toml`, `full.toml`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Sanity => "sanity",
            Mode::Full => "full",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sanity" => Ok(Mode::Sanity),
            "full" => Ok(Mode::Full),
            other => Err(TypesError::InvalidMode(other.to_string())),
        }
    }
}
