use clap::Subcommand;
use physiotrack_core::session::PresetStore;
use physiotrack_core::storage::Database;
use physiotrack_core::{Config, TimerPreset};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Print the active timer preset as JSON
    Show,
    /// Replace the timer preset. All three values are required.
    Set {
        /// Work phase length in seconds
        #[arg(long)]
        work: Option<f64>,
        /// Rest phase length in seconds
        #[arg(long)]
        rest: Option<f64>,
        /// Number of work phases
        #[arg(long)]
        reps: Option<u32>,
    },
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut db = Database::open()?;
    match action {
        TimerAction::Show => {
            let preset = match db.timer_preset()? {
                Some(preset) => preset,
                None => Config::load()?.default_preset(),
            };
            super::print_json(&preset)?;
        }
        TimerAction::Set { work, rest, reps } => {
            let preset = TimerPreset::from_input(work, rest, reps)?;
            db.set_timer_preset(&preset)?;
            super::print_json(&preset)?;
        }
    }
    Ok(())
}
