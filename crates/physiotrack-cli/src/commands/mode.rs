use clap::Subcommand;
use physiotrack_core::presentation::band_angles;
use physiotrack_core::{Config, ModeTable};
use serde_json::json;

#[derive(Subcommand)]
pub enum ModeAction {
    /// List exercise modes and their pressure bands
    List,
    /// Set the custom band. Both bounds are required.
    Custom {
        #[arg(long)]
        min: Option<f64>,
        #[arg(long)]
        max: Option<f64>,
    },
}

pub fn run(action: ModeAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load()?;
    let mut modes = ModeTable::new(config.modes.custom_min, config.modes.custom_max);
    match action {
        ModeAction::List => {
            let rows: Vec<_> = modes
                .iter()
                .map(|m| {
                    let (min_angle, max_angle) = band_angles(m);
                    json!({
                        "label": m.label,
                        "min_pressure": m.min_pressure,
                        "max_pressure": m.max_pressure,
                        "band_angles": [min_angle, max_angle],
                    })
                })
                .collect();
            super::print_json(&rows)?;
        }
        ModeAction::Custom { min, max } => {
            modes.set_custom(min, max)?;
            if let Some(custom) = modes.custom() {
                config.modes.custom_min = custom.min_pressure;
                config.modes.custom_max = custom.max_pressure;
                config.save()?;
                super::print_json(custom)?;
            }
        }
    }
    Ok(())
}
