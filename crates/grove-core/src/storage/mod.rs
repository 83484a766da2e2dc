mod config;
pub mod counter;
pub mod database;

pub use config::{Config, NotificationsConfig, TimerConfig};
pub use counter::{CounterStore, KvCounterStore, MemoryCounterStore, COMPLETED_COUNT_KEY};
pub use database::Database;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the data directory, creating it if needed.
///
/// `GROVE_DATA_DIR` wins when set. Otherwise `~/.config/grove[-dev]/`,
/// where `GROVE_ENV=dev` selects the development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("GROVE_DATA_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("GROVE_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("grove-dev")
            } else {
                base_dir.join("grove")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|source| ConfigError::DataDir {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}
