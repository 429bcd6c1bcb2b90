use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One accepted pressure reading. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub pressure: f64,
    pub captured_at: DateTime<Utc>,
    pub session_start: Option<DateTime<Utc>>,
    pub patient_id: Option<String>,
    pub exercise_mode: Option<String>,
}

/// Figures reported when a session finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub sample_count: usize,
    pub average: Option<f64>,
    pub maximum: Option<f64>,
    pub minimum: Option<f64>,
}

impl SessionSummary {
    /// The average covers every sample; min and max skip zero readings.
    /// All three are `None` when nothing non-zero was recorded.
    pub fn from_samples(
        samples: &[Sample],
        started_at: Option<DateTime<Utc>>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let non_zero: Vec<f64> = samples
            .iter()
            .map(|s| s.pressure)
            .filter(|p| *p != 0.0)
            .collect();

        let (average, maximum, minimum) = if non_zero.is_empty() {
            (None, None, None)
        } else {
            let sum: f64 = samples.iter().map(|s| s.pressure).sum();
            (
                Some(sum / samples.len() as f64),
                non_zero.iter().copied().reduce(f64::max),
                non_zero.iter().copied().reduce(f64::min),
            )
        };

        let elapsed_secs = started_at
            .map(|start| (finished_at - start).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0);

        Self {
            started_at,
            finished_at,
            elapsed_secs,
            sample_count: samples.len(),
            average,
            maximum,
            minimum,
        }
    }
}

/// Millisecond epoch to a UTC timestamp.
pub fn timestamp(ms: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms as i64).unwrap_or_default()
}
