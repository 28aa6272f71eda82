//! Region config loading for `check-config`

use anyhow::Context;
use std::path::Path;
use treesync_core::SyncConfig;

/// Read, parse and validate a region config, then apply `TREESYNC_*`
/// environment overrides
///
/// # Errors
/// If the file cannot be read, does not parse, or holds an out-of-range value
pub fn load_config(path: &Path) -> anyhow::Result<SyncConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config = SyncConfig::from_toml_str(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    config
        .with_env_overrides()
        .context("applying environment overrides")
}

/// Effective config as TOML
///
/// # Errors
/// If serialization fails
pub fn render_config(config: &SyncConfig) -> anyhow::Result<String> {
    toml::to_string_pretty(config).context("rendering config")
}
