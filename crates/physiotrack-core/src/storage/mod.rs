mod config;
pub mod database;
mod writer;

pub use config::{
    AudioConfig, BrokerConfig, Config, ModesConfig, SessionConfig, TimerConfig, TopicConfig,
};
pub use database::{Database, PatientRecord, SessionRecord};
pub use writer::SampleWriter;

use std::path::PathBuf;

/// Returns `~/.config/physiotrack[-dev]/` based on PHYSIOTRACK_ENV.
///
/// Set PHYSIOTRACK_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("PHYSIOTRACK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("physiotrack-dev")
    } else {
        base_dir.join("physiotrack")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
