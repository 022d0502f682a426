pub mod config;
pub mod contacts;
pub mod database;

pub use config::Config;
pub use contacts::ContactStore;
pub use database::{Database, OutboxRecord};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// `$SAFEHER_DATA_DIR` wins when set. Otherwise `~/.config/safeher`, or
/// `~/.config/safeher-dev` when `SAFEHER_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("SAFEHER_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("SAFEHER_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("safeher-dev")
            } else {
                base_dir.join("safeher")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
