//! Session state machine and the collaborators it drives.

mod controller;
mod modes;
mod sample;
mod services;
mod state;

pub use controller::{SessionController, SessionSettings, SessionSnapshot};
pub use modes::{ExerciseMode, ModeTable, CUSTOM_LABEL};
pub use sample::{timestamp, Sample, SessionSummary};
pub use services::{
    DeviceRegistry, MemoryStore, PatientDirectory, PresetStore, SampleStore, Services,
    SessionStore,
};
pub use state::{RepetitionState, RestState, SessionGating, SessionPhase};
