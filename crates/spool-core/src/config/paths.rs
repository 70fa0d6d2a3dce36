//! Path utilities for spool configuration files

use std::path::PathBuf;

/// Get the spool configuration directory
///
/// Returns: `~/.config/spool` (or the platform equivalent)
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("spool")
}

/// Get the default path for a named config file
///
/// Returns: `~/.config/spool/{filename}`
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}
