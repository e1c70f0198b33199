#![forbid(unsafe_code)]

//! Configuration document loading.

use anyhow::Context;
use hassdeck_core::config::Config;
use std::path::Path;

/// Load and validate the YAML configuration document.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let mut config: Config = serde_yml::from_str(&raw)
        .with_context(|| format!("parsing {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("validating {}", path.display()))?;
    Ok(config)
}
