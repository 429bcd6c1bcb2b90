//! Collaborators the controller depends on.
//!
//! The controller only sees these traits. `storage::Database` and
//! `storage::SampleWriter` back them in the CLI; [`MemoryStore`] backs them in
//! tests and offline runs.

use std::sync::{Arc, Mutex, MutexGuard};

use super::sample::Sample;
use crate::audio::CuePlayer;
use crate::error::{CoreError, Result};
use crate::timer::TimerPreset;

pub trait DeviceRegistry {
    fn paired_device(&self) -> Result<Option<String>>;
    fn set_paired_device(&mut self, device_id: &str) -> Result<()>;
}

/// Background persistence. Callers never act on the result beyond logging.
pub trait SampleStore {
    fn append_sample(&mut self, sample: &Sample) -> Result<()>;
}

pub trait PatientDirectory {
    fn patient_exists(&self, patient_id: &str) -> Result<bool>;
}

pub trait PresetStore {
    fn timer_preset(&self) -> Result<Option<TimerPreset>>;
    fn set_timer_preset(&mut self, preset: &TimerPreset) -> Result<()>;
}

/// Registry, presets and patients usually live in the same store.
pub trait SessionStore: DeviceRegistry + PresetStore + PatientDirectory {}

impl<T: DeviceRegistry + PresetStore + PatientDirectory> SessionStore for T {}

/// Everything a controller needs besides the broker link.
pub struct Services {
    pub store: Box<dyn SessionStore + Send>,
    pub samples: Box<dyn SampleStore + Send>,
    pub cues: Box<dyn CuePlayer + Send>,
}

#[derive(Debug, Default)]
struct MemoryState {
    paired_device: Option<String>,
    preset: Option<TimerPreset>,
    patients: Vec<String>,
    samples: Vec<Sample>,
    fail_device_save: bool,
    fail_sample_append: bool,
}

/// Shared in-memory store. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_patient(self, patient_id: &str) -> Self {
        self.lock().patients.push(patient_id.to_lowercase());
        self
    }

    pub fn with_device(self, device_id: &str) -> Self {
        self.lock().paired_device = Some(device_id.to_string());
        self
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.lock().samples.clone()
    }

    pub fn stored_preset(&self) -> Option<TimerPreset> {
        self.lock().preset
    }

    pub fn fail_device_save(&self, fail: bool) {
        self.lock().fail_device_save = fail;
    }

    pub fn fail_sample_append(&self, fail: bool) {
        self.lock().fail_sample_append = fail;
    }
}

impl DeviceRegistry for MemoryStore {
    fn paired_device(&self) -> Result<Option<String>> {
        Ok(self.lock().paired_device.clone())
    }

    fn set_paired_device(&mut self, device_id: &str) -> Result<()> {
        let mut state = self.lock();
        if state.fail_device_save {
            return Err(CoreError::Collaborator {
                collaborator: "device registry",
                message: "save rejected".into(),
            });
        }
        state.paired_device = Some(device_id.to_string());
        Ok(())
    }
}

impl SampleStore for MemoryStore {
    fn append_sample(&mut self, sample: &Sample) -> Result<()> {
        let mut state = self.lock();
        if state.fail_sample_append {
            return Err(CoreError::Collaborator {
                collaborator: "sample store",
                message: "append rejected".into(),
            });
        }
        state.samples.push(sample.clone());
        Ok(())
    }
}

impl PatientDirectory for MemoryStore {
    fn patient_exists(&self, patient_id: &str) -> Result<bool> {
        let id = patient_id.to_lowercase();
        Ok(self.lock().patients.iter().any(|p| *p == id))
    }
}

impl PresetStore for MemoryStore {
    fn timer_preset(&self) -> Result<Option<TimerPreset>> {
        Ok(self.lock().preset)
    }

    fn set_timer_preset(&mut self, preset: &TimerPreset) -> Result<()> {
        self.lock().preset = Some(*preset);
        Ok(())
    }
}
