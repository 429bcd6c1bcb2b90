use clap::Subcommand;
use physiotrack_core::storage::{
    AudioConfig, BrokerConfig, ModesConfig, SessionConfig, TimerConfig, TopicConfig,
};
use physiotrack_core::{Config, ConfigError};

const SECTIONS: [&str; 6] = ["broker", "topics", "session", "audio", "modes", "timer"];

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value (e.g. "broker.host", "session.gating", "audio.rest_cue")
    Get { key: String },
    /// Validate and store one value
    Set { key: String, value: String },
    /// Print the whole config, or one section, as JSON
    List {
        /// broker, topics, session, audio, modes or timer
        section: Option<String>,
    },
    /// Restore defaults for one section, or for everything
    Reset {
        #[arg(long)]
        section: Option<String>,
    },
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load()?;
    match action {
        ConfigAction::Get { key } => {
            let value = config
                .get(&key)
                .ok_or_else(|| ConfigError::UnknownKey(key.clone()))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            // Echo what was stored, after type coercion.
            println!("{key} = {}", config.get(&key).unwrap_or(value));
        }
        ConfigAction::List { section: None } => super::print_json(&config)?,
        ConfigAction::List {
            section: Some(section),
        } => {
            let tree = serde_json::to_value(&config)?;
            let part = tree
                .get(section_name(&section)?)
                .ok_or_else(|| ConfigError::UnknownKey(section.clone()))?;
            super::print_json(part)?;
        }
        ConfigAction::Reset { section: None } => {
            Config::default().save()?;
            println!("config reset to defaults");
        }
        ConfigAction::Reset {
            section: Some(section),
        } => {
            match section_name(&section)? {
                "broker" => config.broker = BrokerConfig::default(),
                "topics" => config.topics = TopicConfig::default(),
                "session" => config.session = SessionConfig::default(),
                "audio" => config.audio = AudioConfig::default(),
                "modes" => config.modes = ModesConfig::default(),
                _ => config.timer = TimerConfig::default(),
            }
            config.save()?;
            println!("[{section}] reset to defaults");
        }
    }
    Ok(())
}

fn section_name(section: &str) -> Result<&'static str, ConfigError> {
    SECTIONS
        .iter()
        .copied()
        .find(|s| *s == section)
        .ok_or_else(|| ConfigError::UnknownKey(section.to_string()))
}
