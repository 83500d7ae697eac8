//! Configuration loader
//!
//! Loads and validates the compiler's YAML configuration.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing::info;

use super::types::CeConfig;

/// Environment variable naming a YAML configuration file.
pub const CONFIG_ENV_VAR: &str = "DAP4_CE_CONFIG";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Parse configuration from YAML text. Missing keys take their defaults.
    pub fn from_yaml_str(content: &str) -> Result<CeConfig> {
        let config: CeConfig =
            serde_yaml::from_str(content).context("Failed to parse constraint configuration")?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<CeConfig> {
        let path = path.as_ref();
        info!("Loading constraint configuration from {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: CeConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Self::validate(&config)?;

        info!(
            "Loaded configuration: regex limit {} bytes, filter depth {}, projection cap {:?}",
            config.regex_size_limit, config.max_filter_depth, config.max_projection_elements
        );
        Ok(config)
    }

    /// Load from the file named by `DAP4_CE_CONFIG`, or use defaults.
    pub fn from_env() -> Result<CeConfig> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.is_empty() => Self::load(path),
            _ => {
                info!("{} not set, using default configuration", CONFIG_ENV_VAR);
                Ok(CeConfig::default())
            }
        }
    }

    fn validate(config: &CeConfig) -> Result<()> {
        if config.regex_size_limit == 0 {
            return Err(anyhow!("regex_size_limit must be positive"));
        }
        if config.max_filter_depth == 0 {
            return Err(anyhow!("max_filter_depth must be positive"));
        }
        if config.max_projection_elements == Some(0) {
            return Err(anyhow!("max_projection_elements must be positive when set"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_yaml_defaults() {
        let config = ConfigLoader::from_yaml_str("max_filter_depth: 8\n").unwrap();
        assert_eq!(config.max_filter_depth, 8);
        assert_eq!(config.regex_size_limit, CeConfig::default().regex_size_limit);
        assert_eq!(config.max_projection_elements, None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "regex_size_limit: 4096").unwrap();
        writeln!(file, "max_projection_elements: 1000").unwrap();
        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.regex_size_limit, 4096);
        assert_eq!(config.max_projection_elements, Some(1000));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(ConfigLoader::from_yaml_str("max_filter_depth: 0").is_err());
        assert!(ConfigLoader::from_yaml_str("regex_size_limit: nope").is_err());
        let err = ConfigLoader::load("/nonexistent/dap4.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
