//! Loading pipeline configuration from TOML.
//!
//! ```toml
//! lowcut_hz = 5.0
//! highcut_hz = 15.0
//!
//! [threshold]
//! refractory_s = 0.25
//! ```
//!
//! Missing keys fall back to their defaults.

use crate::detectors::ecg::EcgPipelineConfig;
use anyhow::{Context, Result};
use std::path::Path;

impl EcgPipelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(text).context("parsing pipeline config")?;
        cfg.validate().context("validating pipeline config")?;
        Ok(cfg)
    }

    /// Read a TOML config file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }
}
