//! Session configuration.
//!
//! Stored as JSON; every field is optional and falls back to its default.

use crate::analysis::units::UnitRegistry;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Unit system used to resolve unit expressions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    #[default]
    Si,
}

impl UnitSystem {
    pub fn as_str(&self) -> &str {
        match self {
            UnitSystem::Si => "si",
        }
    }

    pub fn registry(&self) -> UnitRegistry {
        match self {
            UnitSystem::Si => UnitRegistry::si(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub unit_system: UnitSystem,

    /// Name of the fitting backend
    pub fit_module: String,

    /// Name of the plotting backend
    pub plot_module: String,

    /// Directory results are written to
    pub directory: PathBuf,

    /// File name of the automatic results file
    pub auto_results: String,

    /// Round values to the precision of their errors in tables
    pub rounding: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unit_system: UnitSystem::Si,
            fit_module: "levenberg-marquardt".to_string(),
            plot_module: "text".to_string(),
            directory: PathBuf::from("."),
            auto_results: "results.csv".to_string(),
            rounding: true,
        }
    }
}

impl Config {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn results_path(&self) -> PathBuf {
        self.directory.join(&self.auto_results)
    }
}
