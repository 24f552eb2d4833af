//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::RuntimeConfig;
use std::path::Path;

/// Name of the configuration file looked up in a project directory.
pub const CONFIG_FILE: &str = "kiln.toml";

/// Loads and validates `<dir>/kiln.toml`.
pub fn load_config(dir: &Path) -> Result<RuntimeConfig, ConfigError> {
    let content = std::fs::read_to_string(dir.join(CONFIG_FILE))?;
    load_config_from_str(&content)
}

/// Parses and validates a `kiln.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<RuntimeConfig, ConfigError> {
    let config: RuntimeConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks that reuse bounds are positive and that persistence has a directory.
pub fn validate_config(config: &RuntimeConfig) -> Result<(), ConfigError> {
    if config.installer.max_uses == 0 {
        return Err(ConfigError::ValidationError(
            "installer.max_uses must be positive".to_string(),
        ));
    }
    if config.installer.max_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "installer.max_bytes must be positive".to_string(),
        ));
    }
    if config.cache.persistent && config.cache.directory.as_os_str().is_empty() {
        return Err(ConfigError::MissingField("cache.directory".to_string()));
    }
    Ok(())
}
