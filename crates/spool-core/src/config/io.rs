//! Generic configuration I/O
//!
//! YAML loading and saving for any serializable configuration type. Loading
//! never fails: a missing or unparseable file falls back to `Default` with a
//! log line, so a bad config can't keep the instrument from starting.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load configuration from a YAML file, falling back to defaults
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("load_config: {:?} doesn't exist, using defaults", path);
        return T::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<T>(&contents) {
            Ok(config) => {
                log::info!("load_config: loaded {:?}", path);
                config
            }
            Err(e) => {
                log::warn!("load_config: failed to parse {:?}: {}, using defaults", path, e);
                T::default()
            }
        },
        Err(e) => {
            log::warn!("load_config: failed to read {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Save configuration to a YAML file, creating parent directories as needed
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_config: saved {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ToneMode, TransportConfig};

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: TransportConfig = load_config(Path::new("/nonexistent/spool/config.yaml"));
        assert_eq!(config, TransportConfig::default());
    }

    #[test]
    fn test_transport_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transport.yaml");

        let config = TransportConfig {
            drag_sensitivity: 0.0005,
            tone_mode: ToneMode::Radio,
            ..Default::default()
        };

        save_config(&config, &path).unwrap();
        let loaded: TransportConfig = load_config(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.yaml");
        std::fs::write(&path, "friction: 0.9\n").unwrap();

        let loaded: TransportConfig = load_config(&path);
        assert_eq!(loaded.friction, 0.9);
        assert_eq!(loaded.grain_size, TransportConfig::default().grain_size);
    }
}
