mod engine;
mod preset;

pub use engine::{now_ms, PhaseKind, TimerEngine, TimerReading, TimerState};
pub use preset::TimerPreset;
