//! Config loading (§6): an optional TOML file overridable by `FABRIC_`-
//! prefixed environment variables. Defaults are authoritative when no file
//! is given, matching `FabricConfig::default()` exactly.

use fabric_types::{FabricConfig, FabricError};
use std::path::Path;

pub fn load(path: Option<&Path>) -> Result<FabricConfig, FabricError> {
    let base = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| FabricError::Configuration {
                component: "config",
                message: format!("reading {}: {e}", path.display()),
            })?;
            toml::from_str(&text).map_err(|e| FabricError::Configuration {
                component: "config",
                message: format!("parsing {}: {e}", path.display()),
            })?
        }
        None => FabricConfig::default(),
    };

    let config = base
        .apply_env_overrides(|key| std::env::var(key).ok())
        .map_err(|message| FabricError::Configuration {
            component: "config",
            message,
        })?;

    config.validate().map_err(|message| FabricError::Configuration {
        component: "config",
        message,
    })?;

    Ok(config)
}
