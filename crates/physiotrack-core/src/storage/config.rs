//! TOML-based application configuration.
//!
//! Stores:
//! - Broker connection settings
//! - Topic prefixes for the device protocol
//! - Session loop tuning (tick interval, baseline pressure, gating)
//! - Audio cue sources
//! - Custom pressure band and default timer preset
//!
//! Configuration is stored at `~/.config/physiotrack/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::audio::RestCue;
use crate::error::ConfigError;
use crate::session::SessionGating;
use crate::timer::TimerPreset;

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

/// Topic prefixes. Per-device topics are `<prefix>/<device id>`; `pair` and
/// `device` are used as-is for discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    #[serde(default = "default_data_topic")]
    pub data: String,
    #[serde(default = "default_command_topic")]
    pub command: String,
    #[serde(default = "default_start_topic")]
    pub start: String,
    #[serde(default = "default_pair_topic")]
    pub pair: String,
    #[serde(default = "default_device_topic")]
    pub device: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Pressure shown when no session is recording.
    #[serde(default = "default_baseline_pressure")]
    pub baseline_pressure: f64,
    #[serde(default)]
    pub gating: SessionGating,
    /// Added to the mode minimum when commanding the device.
    #[serde(default = "default_command_offset")]
    pub command_offset: f64,
}

/// Sound sources for each cue. Values are file paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_start_sound")]
    pub start: String,
    #[serde(default = "default_rest_sound")]
    pub rest: String,
    #[serde(default = "default_cat_sound")]
    pub cat: String,
    /// Cue played when a rest phase begins: `rest` or `cat`.
    #[serde(default)]
    pub rest_cue: RestCue,
    #[serde(default = "default_finish_sound")]
    pub finish: String,
    #[serde(default = "default_warning_sound")]
    pub warning: String,
    /// How long a cue counts as "playing" for rate limiting.
    #[serde(default = "default_cue_duration")]
    pub cue_duration_ms: u64,
}

/// Operator-editable custom pressure band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModesConfig {
    #[serde(default = "default_custom_min")]
    pub custom_min: f64,
    #[serde(default = "default_custom_max")]
    pub custom_max: f64,
}

/// Preset used when the preset store has nothing saved yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_work_secs")]
    pub work_secs: f64,
    #[serde(default = "default_rest_secs")]
    pub rest_secs: f64,
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/physiotrack/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub topics: TopicConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub modes: ModesConfig,
    #[serde(default)]
    pub timer: TimerConfig,
}

// Default functions
fn default_host() -> String {
    "broker.emqx.io".into()
}
fn default_port() -> u16 {
    1883
}
fn default_client_id_prefix() -> String {
    "physiotrack-".into()
}
fn default_keep_alive() -> u64 {
    30
}
fn default_reconnect_delay() -> u64 {
    2000
}
fn default_data_topic() -> String {
    "physiotrack/data".into()
}
fn default_command_topic() -> String {
    "physiotrack/cmd".into()
}
fn default_start_topic() -> String {
    "physiotrack/start".into()
}
fn default_pair_topic() -> String {
    "physiotrack/pair".into()
}
fn default_device_topic() -> String {
    "physiotrack/device".into()
}
fn default_tick_interval() -> u64 {
    10
}
fn default_baseline_pressure() -> f64 {
    25.0
}
fn default_command_offset() -> f64 {
    2.0
}
fn default_true() -> bool {
    true
}
fn default_start_sound() -> String {
    "sounds/start.wav".into()
}
fn default_rest_sound() -> String {
    "sounds/rest.wav".into()
}
fn default_cat_sound() -> String {
    "sounds/cat.wav".into()
}
fn default_finish_sound() -> String {
    "sounds/finish.wav".into()
}
fn default_warning_sound() -> String {
    "sounds/warning.wav".into()
}
fn default_cue_duration() -> u64 {
    1500
}
fn default_custom_min() -> f64 {
    38.0
}
fn default_custom_max() -> f64 {
    52.0
}
fn default_work_secs() -> f64 {
    20.0
}
fn default_rest_secs() -> f64 {
    10.0
}
fn default_repetitions() -> u32 {
    3
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id_prefix: default_client_id_prefix(),
            keep_alive_secs: default_keep_alive(),
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            data: default_data_topic(),
            command: default_command_topic(),
            start: default_start_topic(),
            pair: default_pair_topic(),
            device: default_device_topic(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            baseline_pressure: default_baseline_pressure(),
            gating: SessionGating::default(),
            command_offset: default_command_offset(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start: default_start_sound(),
            rest: default_rest_sound(),
            cat: default_cat_sound(),
            rest_cue: RestCue::default(),
            finish: default_finish_sound(),
            warning: default_warning_sound(),
            cue_duration_ms: default_cue_duration(),
        }
    }
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            custom_min: default_custom_min(),
            custom_max: default_custom_max(),
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            work_secs: default_work_secs(),
            rest_secs: default_rest_secs(),
            repetitions: default_repetitions(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<u64>() {
                            serde_json::Value::Number(n.into())
                        } else if let Ok(n) = value.parse::<f64>() {
                            serde_json::Number::from_f64(n)
                                .map(serde_json::Value::Number)
                                .ok_or_else(|| {
                                    invalid(format!("cannot parse '{value}' as number"))
                                })?
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        }

        Err(ConfigError::UnknownKey(key.to_string()))
    }

    fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("config.toml"))
            .map_err(|e| ConfigError::LoadFailed {
                path: PathBuf::from("config.toml"),
                message: e.to_string(),
            })
    }

    /// Load from disk, writing the defaults out on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Update a value by dot-separated key without saving.
    ///
    /// The whole tree is re-validated; on error `self` is left untouched.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Set a config value by key and save. Returns error if key is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Default preset from the `[timer]` section. Falls back to the built-in
    /// preset if the file holds non-positive values.
    pub fn default_preset(&self) -> TimerPreset {
        TimerPreset::new(
            self.timer.work_secs,
            self.timer.rest_secs,
            self.timer.repetitions,
        )
        .unwrap_or_default()
    }
}
