//! Loading market configuration files.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use bazaar_core::MarketConfig;

/// Read and validate a TOML config. `None` gives the built-in market.
pub fn load_config(path: Option<&Path>) -> Result<MarketConfig> {
    let Some(path) = path else {
        return Ok(MarketConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    MarketConfig::from_toml(&text)
        .with_context(|| format!("invalid market config {}", path.display()))
}

/// Render the built-in market as TOML, as a starting point for edits.
pub fn default_config_toml() -> Result<String> {
    MarketConfig::default()
        .to_toml_string()
        .context("failed to render default config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_path_means_built_in_market() {
        let config = load_config(None).unwrap();
        assert_eq!(config, MarketConfig::default());
    }

    #[test]
    fn rendered_default_parses_back() {
        let text = default_config_toml().unwrap();
        assert_eq!(MarketConfig::from_toml(&text).unwrap(), MarketConfig::default());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_config(Some(Path::new("/nonexistent/market.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/market.toml"));
    }
}
