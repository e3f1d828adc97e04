//! YAML load/save for any serde settings type

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load settings from a YAML file
///
/// A missing file yields the defaults. An unreadable or invalid file is
/// logged and also yields the defaults, so a broken settings file never
/// prevents a project from opening.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("No settings at {:?}, using defaults", path);
        return T::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("Failed to read {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };
    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("Loaded settings from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("Failed to parse {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Write settings as YAML, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create settings directory {:?}", parent))?;
    }
    let yaml = serde_yaml::to_string(config).context("Failed to serialize settings to YAML")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write {:?}", path))?;
    log::info!("Saved settings to {:?}", path);
    Ok(())
}
