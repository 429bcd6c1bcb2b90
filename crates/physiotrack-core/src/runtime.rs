//! Event loop that owns a [`SessionController`].
//!
//! One task `select!`s over the tick interval, broker events forwarded by the
//! MQTT pump and operator commands, so every state change happens in arrival
//! order on a single owner. Events are forwarded to the front-end after each
//! step.

use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::events::Event;
use crate::presentation::{gauge_view, ring_view, GaugeView, RingView};
use crate::session::{SessionController, SessionSnapshot};
use crate::telemetry::{BrokerEvent, Transport};
use crate::timer::now_ms;

#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    Start,
    Stop,
    /// Begin a pairing scan.
    Pair,
    /// List pairing candidates.
    Devices,
    /// Confirm a candidate by 1-based index or id.
    Select(String),
    Custom {
        min: Option<f64>,
        max: Option<f64>,
    },
    Timer {
        work_secs: Option<f64>,
        rest_secs: Option<f64>,
        repetitions: Option<u32>,
    },
    Status,
    Quit,
}

impl FromStr for OperatorCommand {
    type Err = String;

    /// Parse one line of operator input. Missing or unparsable numbers become
    /// `None` so the controller's validation reports them.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            return Err("empty command".into());
        };
        let args: Vec<&str> = parts.collect();
        let number = |i: usize| args.get(i).and_then(|v| v.parse::<f64>().ok());

        let command = match verb.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "stop" => Self::Stop,
            "pair" => Self::Pair,
            "devices" => Self::Devices,
            "select" => {
                let target = args.first().ok_or("usage: select <n|device id>")?;
                Self::Select(target.to_string())
            }
            "custom" => Self::Custom {
                min: number(0),
                max: number(1),
            },
            "timer" => {
                let work_secs = number(0);
                let rest_secs = number(1);
                let repetitions = number(2)
                    .filter(|r| r.fract() == 0.0 && *r >= 0.0 && *r <= u32::MAX as f64)
                    .map(|r| r as u32);
                Self::Timer {
                    work_secs,
                    rest_secs,
                    repetitions,
                }
            }
            "status" => Self::Status,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{other}'")),
        };
        Ok(command)
    }
}

/// What the loop reports to the front-end.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuntimeOutput {
    Event { event: Event },
    Status {
        snapshot: SessionSnapshot,
        gauge: GaugeView,
        ring: RingView,
    },
    Devices { candidates: Vec<String> },
    Rejected { message: String },
}

pub struct SessionRuntime<T: Transport> {
    controller: SessionController<T>,
    tick_interval: Duration,
}

impl<T: Transport> SessionRuntime<T> {
    pub fn new(controller: SessionController<T>, tick_interval: Duration) -> Self {
        Self {
            controller,
            tick_interval: tick_interval.max(Duration::from_millis(1)),
        }
    }

    /// Run until the operator quits, the command channel closes or the
    /// front-end stops listening. An active session is stopped on the way out.
    /// Returns the controller so callers can persist edits.
    pub async fn run(
        mut self,
        mut broker: mpsc::Receiver<BrokerEvent>,
        mut commands: mpsc::Receiver<OperatorCommand>,
        output: mpsc::Sender<RuntimeOutput>,
    ) -> SessionController<T> {
        let mut interval = time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.controller.tick();
                }
                Some(event) = broker.recv() => {
                    self.on_broker(event);
                }
                command = commands.recv() => {
                    match command {
                        None | Some(OperatorCommand::Quit) => break,
                        Some(command) => {
                            if let Some(out) = self.apply(command) {
                                if output.send(out).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            if !self.flush(&output).await {
                debug!("front-end closed, leaving session loop");
                return self.controller;
            }
        }

        if self.controller.phase().is_active() {
            self.controller.operator_stop();
        }
        self.flush(&output).await;
        info!("session loop finished");
        self.controller
    }

    fn on_broker(&mut self, event: BrokerEvent) {
        let now = now_ms();
        match event {
            BrokerEvent::Connected => self.controller.on_broker_connected_at(now),
            BrokerEvent::Disconnected(reason) => {
                self.controller.on_broker_disconnected_at(&reason, now)
            }
            BrokerEvent::Message { topic, payload } => {
                self.controller.handle_message_at(&topic, &payload, now)
            }
        }
    }

    /// Apply one operator command. Rejections are returned to the operator;
    /// everything else surfaces through controller events.
    pub fn apply(&mut self, command: OperatorCommand) -> Option<RuntimeOutput> {
        let result = match command {
            OperatorCommand::Start => self.controller.operator_start(),
            OperatorCommand::Stop => {
                self.controller.operator_stop();
                Ok(())
            }
            OperatorCommand::Pair => self.controller.request_pairing().map_err(Into::into),
            OperatorCommand::Devices => {
                return Some(RuntimeOutput::Devices {
                    candidates: self.controller.candidates().to_vec(),
                });
            }
            OperatorCommand::Select(target) => {
                let device = self.resolve_candidate(&target);
                self.controller.confirm_pairing(&device)
            }
            OperatorCommand::Custom { min, max } => self
                .controller
                .set_custom_mode(min, max)
                .map_err(Into::into),
            OperatorCommand::Timer {
                work_secs,
                rest_secs,
                repetitions,
            } => self
                .controller
                .configure_timer(work_secs, rest_secs, repetitions),
            OperatorCommand::Status => {
                let snapshot = self.controller.snapshot();
                return Some(RuntimeOutput::Status {
                    gauge: gauge_view(&snapshot),
                    ring: ring_view(&snapshot),
                    snapshot,
                });
            }
            OperatorCommand::Quit => Ok(()),
        };

        result.err().map(|e| RuntimeOutput::Rejected {
            message: e.to_string(),
        })
    }

    pub fn controller(&self) -> &SessionController<T> {
        &self.controller
    }

    fn resolve_candidate(&self, target: &str) -> String {
        let candidates = self.controller.candidates();
        target
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| candidates.get(i))
            .cloned()
            .unwrap_or_else(|| target.to_string())
    }

    async fn flush(&mut self, output: &mpsc::Sender<RuntimeOutput>) -> bool {
        for event in self.controller.take_events() {
            if output.send(RuntimeOutput::Event { event }).await.is_err() {
                return false;
            }
        }
        true
    }
}
