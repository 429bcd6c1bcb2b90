use serde::{Deserialize, Serialize};

/// Lifecycle of one session screen.
///
/// ```text
/// Stopped -> WaitingForDevice -> Running <-> Resting -> Finished
///                                   \___________________/
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Stopped,
    WaitingForDevice,
    Running,
    Resting,
    Finished,
}

impl SessionPhase {
    /// Armed or counting. Pairing and configuration edits are refused.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionPhase::WaitingForDevice | SessionPhase::Running | SessionPhase::Resting
        )
    }
}

/// Who starts the countdown once the operator has pressed start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionGating {
    /// Operator arms the session, the device's start signal begins it.
    #[default]
    Therapist,
    /// Operator start begins the countdown immediately.
    Client,
}

impl std::str::FromStr for SessionGating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "therapist" => Ok(Self::Therapist),
            "client" => Ok(Self::Client),
            other => Err(format!("unknown gating '{other}', expected therapist or client")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepetitionState {
    remaining: u32,
    total: u32,
}

impl RepetitionState {
    pub fn new(total: u32) -> Self {
        let total = total.max(1);
        Self {
            remaining: total,
            total,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn reset(&mut self) {
        self.remaining = self.total;
    }

    /// Another work phase follows the one that just expired.
    pub fn has_more(&self) -> bool {
        self.remaining > 1
    }

    /// One repetition done. Saturates at zero.
    pub fn complete(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestState {
    pub duration_secs: f64,
    pub is_resting: bool,
}

impl RestState {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            is_resting: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_phases() {
        assert!(!SessionPhase::Stopped.is_active());
        assert!(SessionPhase::WaitingForDevice.is_active());
        assert!(SessionPhase::Running.is_active());
        assert!(SessionPhase::Resting.is_active());
        assert!(!SessionPhase::Finished.is_active());
    }

    #[test]
    fn repetitions_count_down_and_saturate() {
        let mut reps = RepetitionState::new(2);
        assert!(reps.has_more());
        reps.complete();
        assert_eq!(reps.remaining(), 1);
        assert!(!reps.has_more());
        reps.complete();
        reps.complete();
        assert_eq!(reps.remaining(), 0);
        reps.reset();
        assert_eq!(reps.remaining(), 2);
    }

    #[test]
    fn zero_total_is_lifted_to_one() {
        assert_eq!(RepetitionState::new(0).total(), 1);
    }

    #[test]
    fn gating_parses_case_insensitively() {
        assert_eq!("Client".parse::<SessionGating>(), Ok(SessionGating::Client));
        assert!("robot".parse::<SessionGating>().is_err());
    }
}
