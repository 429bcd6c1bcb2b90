use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "physiotrack-cli", version, about = "PhysioTrack CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run and review exercise sessions
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Paired device management
    Device {
        #[command(subcommand)]
        action: commands::device::DeviceAction,
    },
    /// Timer preset management
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Exercise modes and the custom pressure band
    Mode {
        #[command(subcommand)]
        action: commands::mode::ModeAction,
    },
    /// Patient records
    Patient {
        #[command(subcommand)]
        action: commands::patient::PatientAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// Logs go to stderr so stdout stays machine readable.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("PHYSIOTRACK_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Session { action } => commands::session::run(action),
        Commands::Device { action } => commands::device::run(action),
        Commands::Timer { action } => commands::timer::run(action),
        Commands::Mode { action } => commands::mode::run(action),
        Commands::Patient { action } => commands::patient::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
