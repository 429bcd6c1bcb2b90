//! Exercise modes and their target pressure bands.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const CUSTOM_LABEL: &str = "custom";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseMode {
    pub label: String,
    pub min_pressure: f64,
    pub max_pressure: f64,
}

impl ExerciseMode {
    pub fn new(label: &str, min_pressure: f64, max_pressure: f64) -> Self {
        Self {
            label: label.to_string(),
            min_pressure,
            max_pressure,
        }
    }

    pub fn is_over(&self, pressure: f64) -> bool {
        pressure > self.max_pressure
    }

    pub fn contains(&self, pressure: f64) -> bool {
        pressure >= self.min_pressure && pressure <= self.max_pressure
    }
}

/// Ordered band table. Order matters: "lumbar extension" must be tried
/// before "lumbar".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeTable {
    modes: Vec<ExerciseMode>,
}

impl ModeTable {
    pub fn new(custom_min: f64, custom_max: f64) -> Self {
        Self {
            modes: vec![
                ExerciseMode::new("cervical", 18.0, 32.0),
                ExerciseMode::new("thoracic", 28.0, 42.0),
                ExerciseMode::new("lumbar extension", 28.0, 42.0),
                ExerciseMode::new("lumbar", 38.0, 52.0),
                ExerciseMode::new(CUSTOM_LABEL, custom_min, custom_max),
            ],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExerciseMode> {
        self.modes.iter()
    }

    /// First band whose label occurs in the lower-cased `active_label`.
    pub fn find(&self, active_label: &str) -> Option<&ExerciseMode> {
        let active = active_label.to_lowercase();
        self.modes.iter().find(|m| active.contains(&m.label))
    }

    pub fn resolve(&self, active_label: &str) -> Result<&ExerciseMode, ValidationError> {
        self.find(active_label)
            .ok_or_else(|| ValidationError::UnknownMode(active_label.to_string()))
    }

    pub fn custom(&self) -> Option<&ExerciseMode> {
        self.modes.iter().find(|m| m.label == CUSTOM_LABEL)
    }

    /// Overwrite the custom band. Both bounds are required and the update is
    /// all-or-nothing.
    pub fn set_custom(
        &mut self,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Result<(), ValidationError> {
        let min = min.ok_or(ValidationError::MissingField("min"))?;
        let max = max.ok_or(ValidationError::MissingField("max"))?;
        for (field, value) in [("min", min), ("max", max)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::NotPositive { field, value });
            }
        }
        if min > max {
            return Err(ValidationError::InvalidRange { min, max });
        }

        match self.modes.iter_mut().find(|m| m.label == CUSTOM_LABEL) {
            Some(custom) => {
                custom.min_pressure = min;
                custom.max_pressure = max;
            }
            None => self.modes.push(ExerciseMode::new(CUSTOM_LABEL, min, max)),
        }
        Ok(())
    }
}

impl Default for ModeTable {
    fn default() -> Self {
        Self::new(38.0, 52.0)
    }
}
