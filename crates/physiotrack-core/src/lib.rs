//! # PhysioTrack Core Library
//!
//! Core logic for running timed physiotherapy exercise sessions against a
//! pressure-sensing device that reports over an MQTT broker. The CLI binary
//! is a thin front-end over this crate.
//!
//! ## Architecture
//!
//! - **Telemetry Link**: topic derivation, device binding and inbound message
//!   decoding on top of a fire-and-forget [`Transport`]
//! - **Session Controller**: the session state machine; decides what to
//!   record, which cues to play and when the timer moves between phases
//! - **Timer Engine**: a wall-clock countdown for alternating work/rest phases
//! - **Storage**: TOML configuration and SQLite-backed collaborators
//! - **Presentation**: pure mapping from controller state to gauge and ring
//!   primitives
//!
//! ## Key Components
//!
//! - [`SessionController`]: owns all session state
//! - [`SessionRuntime`]: tokio loop feeding the controller ticks, broker
//!   events and operator commands
//! - [`TimerEngine`]: countdown state machine
//! - [`Config`]: application configuration management

pub mod audio;
pub mod error;
pub mod events;
pub mod presentation;
pub mod runtime;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod timer;

pub use audio::{CueId, CuePlayer, PlayOptions, RestCue};
pub use error::{ConfigError, CoreError, DatabaseError, TransportError, ValidationError};
pub use events::{Event, NotificationLevel};
pub use runtime::{OperatorCommand, RuntimeOutput, SessionRuntime};
pub use session::{
    ExerciseMode, ModeTable, Sample, SessionController, SessionGating, SessionPhase,
    SessionSettings, SessionSnapshot, SessionSummary,
};
pub use storage::{Config, Database, SampleWriter};
pub use telemetry::{InboundEvent, TelemetryLink, Transport};
pub use timer::{TimerEngine, TimerPreset, TimerState};
