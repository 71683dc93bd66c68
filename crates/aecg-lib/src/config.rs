use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables of the interval derivation engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivationConfig {
    /// An `RON` boundary only opens a new beat when it lies further than this
    /// (ms) past the last QRS onset of the lead.
    pub ron_retrigger_ms: f64,
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            ron_retrigger_ms: 400.0,
        }
    }
}

/// Settings for indexing one or many aECG documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub derivation: DerivationConfig,
    /// Emit every derived interval ahead of the COUNT/AVERAGE rows.
    pub keep_raw_intervals: bool,
    /// Worker threads used by the batch driver.
    pub workers: usize,
    /// Stop launching new files after the first file-level error.
    pub fail_fast: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            derivation: DerivationConfig::default(),
            keep_raw_intervals: false,
            workers: 4,
            fail_fast: false,
        }
    }
}

impl IndexConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing index configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }
}
