use std::time::Duration;

use clap::Subcommand;
use physiotrack_core::audio::player_for;
use physiotrack_core::session::Services;
use physiotrack_core::storage::Database;
use physiotrack_core::telemetry::mqtt;
use physiotrack_core::{
    Config, ModeTable, OperatorCommand, RuntimeOutput, SampleWriter, SessionController,
    SessionGating, SessionRuntime, SessionSettings, TelemetryLink,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Run an interactive session. Reads operator commands from stdin
    /// (start, stop, pair, devices, select <n|id>, custom <min> <max>,
    /// timer <work> <rest> <reps>, status, quit) and prints JSON lines.
    Run {
        /// Registered patient id
        #[arg(long)]
        patient: String,
        /// Exercise mode label (e.g. "lumbar", "cervical", "custom")
        #[arg(long)]
        mode: String,
        /// Who starts the exercise: therapist or client
        #[arg(long)]
        gating: Option<SessionGating>,
    },
    /// List recorded sessions for a patient
    History {
        #[arg(long)]
        patient: String,
    },
    /// Print the samples of one recorded session
    Show {
        /// Session key as printed by `history`
        key: String,
    },
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SessionAction::Run {
            patient,
            mode,
            gating,
        } => run_interactive(&patient, &mode, gating),
        SessionAction::History { patient } => {
            let db = Database::open()?;
            super::print_json(&db.sessions_for_patient(&patient)?)
        }
        SessionAction::Show { key } => {
            let db = Database::open()?;
            let samples = db.samples_for_session(&key)?;
            if samples.is_empty() {
                return Err(format!("no samples recorded for {key}").into());
            }
            super::print_json(&samples)
        }
    }
}

fn run_interactive(
    patient: &str,
    mode: &str,
    gating: Option<SessionGating>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load()?;
    if let Some(gating) = gating {
        config.session.gating = gating;
    }

    let store = Database::open()?;
    let writer = SampleWriter::spawn(&Database::default_path()?)?;
    let services = Services {
        store: Box::new(store),
        samples: Box::new(writer),
        cues: player_for(&config.audio),
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = rt.block_on(async {
        let (broker_tx, broker_rx) = mpsc::channel(256);
        let (transport, pump) = mqtt::connect(&config.broker, broker_tx);
        tokio::spawn(pump.run());

        let link = TelemetryLink::new(transport, config.topics.clone());
        let modes = ModeTable::new(config.modes.custom_min, config.modes.custom_max);
        let mut controller =
            SessionController::new(link, services, SessionSettings::from_config(&config), modes);
        controller.configure_session(patient, mode)?;
        info!(
            patient,
            mode,
            gating = ?config.session.gating,
            host = %config.broker.host,
            "session ready"
        );

        let (command_tx, command_rx) = mpsc::channel(32);
        let (output_tx, mut output_rx) = mpsc::channel::<RuntimeOutput>(256);

        let reader_output = output_tx.clone();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<OperatorCommand>() {
                    Ok(command) => {
                        if command_tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    Err(message) => {
                        let _ = reader_output
                            .send(RuntimeOutput::Rejected { message })
                            .await;
                    }
                }
            }
        });

        let printer = tokio::spawn(async move {
            while let Some(out) = output_rx.recv().await {
                match serde_json::to_string(&out) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!(error = %e, "failed to encode output"),
                }
            }
        });

        let tick = Duration::from_millis(config.session.tick_interval_ms);
        let controller = SessionRuntime::new(controller, tick)
            .run(broker_rx, command_rx, output_tx)
            .await;

        reader.abort();
        let _ = printer.await;

        if let Some(custom) = controller.modes().custom() {
            if custom.min_pressure != config.modes.custom_min
                || custom.max_pressure != config.modes.custom_max
            {
                config.modes.custom_min = custom.min_pressure;
                config.modes.custom_max = custom.max_pressure;
                if let Err(e) = config.save() {
                    warn!(error = %e, "failed to persist custom mode bounds");
                }
            }
        }
        controller.link().transport().disconnect();
        Ok::<(), Box<dyn std::error::Error>>(())
    });
    // The stdin reader may still be parked on a blocking read.
    rt.shutdown_background();
    result
}
