use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Work/rest/repetition settings for one session.
///
/// Only constructed through [`TimerPreset::new`] or [`TimerPreset::from_input`],
/// so every live preset has strictly positive values. Deserialization goes
/// through the same validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredPreset")]
pub struct TimerPreset {
    /// Work phase length in seconds.
    pub work_secs: f64,
    /// Rest phase length in seconds.
    pub rest_secs: f64,
    pub repetitions: u32,
}

impl TimerPreset {
    pub fn new(work_secs: f64, rest_secs: f64, repetitions: u32) -> Result<Self, ValidationError> {
        Self::from_input(Some(work_secs), Some(rest_secs), Some(repetitions))
    }

    /// Validate raw operator input. All three values are required; the
    /// preset is either fully accepted or rejected.
    pub fn from_input(
        work_secs: Option<f64>,
        rest_secs: Option<f64>,
        repetitions: Option<u32>,
    ) -> Result<Self, ValidationError> {
        let work_secs = work_secs.ok_or(ValidationError::MissingField("work"))?;
        let rest_secs = rest_secs.ok_or(ValidationError::MissingField("rest"))?;
        let repetitions = repetitions.ok_or(ValidationError::MissingField("repetitions"))?;

        positive("work", work_secs)?;
        positive("rest", rest_secs)?;
        if repetitions == 0 {
            return Err(ValidationError::NotPositive {
                field: "repetitions",
                value: 0.0,
            });
        }

        Ok(Self {
            work_secs,
            rest_secs,
            repetitions,
        })
    }

    pub fn work_ms(&self) -> u64 {
        secs_to_ms(self.work_secs)
    }

    pub fn rest_ms(&self) -> u64 {
        secs_to_ms(self.rest_secs)
    }
}

impl Default for TimerPreset {
    fn default() -> Self {
        Self {
            work_secs: 20.0,
            rest_secs: 10.0,
            repetitions: 3,
        }
    }
}

#[derive(Deserialize)]
struct StoredPreset {
    work_secs: f64,
    rest_secs: f64,
    repetitions: u32,
}

impl TryFrom<StoredPreset> for TimerPreset {
    type Error = ValidationError;

    fn try_from(raw: StoredPreset) -> Result<Self, Self::Error> {
        Self::new(raw.work_secs, raw.rest_secs, raw.repetitions)
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::NotPositive { field, value })
    }
}

fn secs_to_ms(secs: f64) -> u64 {
    (secs * 1000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_positive_values() {
        let preset = TimerPreset::new(20.0, 10.0, 2).unwrap();
        assert_eq!(preset.work_ms(), 20_000);
        assert_eq!(preset.rest_ms(), 10_000);
        assert_eq!(preset.repetitions, 2);
    }

    #[test]
    fn missing_field_is_rejected() {
        assert_eq!(
            TimerPreset::from_input(Some(20.0), None, Some(3)),
            Err(ValidationError::MissingField("rest"))
        );
        assert_eq!(
            TimerPreset::from_input(None, Some(5.0), Some(3)),
            Err(ValidationError::MissingField("work"))
        );
        assert_eq!(
            TimerPreset::from_input(Some(20.0), Some(5.0), None),
            Err(ValidationError::MissingField("repetitions"))
        );
    }

    #[test]
    fn zero_and_negative_durations_are_rejected() {
        assert!(TimerPreset::new(0.0, 10.0, 3).is_err());
        assert!(TimerPreset::new(20.0, -1.0, 3).is_err());
        assert!(TimerPreset::new(20.0, 10.0, 0).is_err());
        assert!(TimerPreset::new(f64::NAN, 10.0, 3).is_err());
    }

    #[test]
    fn deserializing_validates_values() {
        let parse = serde_json::from_str::<TimerPreset>;
        assert_eq!(
            parse(r#"{"work_secs":30.0,"rest_secs":5.0,"repetitions":2}"#).unwrap(),
            TimerPreset::new(30.0, 5.0, 2).unwrap()
        );
        assert!(parse(r#"{"work_secs":0,"rest_secs":5.0,"repetitions":2}"#).is_err());
        assert!(parse(r#"{"work_secs":3,"rest_secs":5.0,"repetitions":0}"#).is_err());
    }

    #[test]
    fn fractional_seconds_round_to_millis() {
        let preset = TimerPreset::new(1.5, 0.25, 1).unwrap();
        assert_eq!(preset.work_ms(), 1_500);
        assert_eq!(preset.rest_ms(), 250);
    }
}
