use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::database::Database;
use crate::error::{CoreError, Result};
use crate::session::{Sample, SampleStore};

/// Background sample persistence.
///
/// Owns its own connection on a dedicated thread; `append_sample` only queues.
/// Dropping the writer flushes the queue before returning.
pub struct SampleWriter {
    tx: Option<Sender<Sample>>,
    handle: Option<JoinHandle<()>>,
}

impl SampleWriter {
    pub fn spawn(path: &Path) -> Result<Self> {
        Self::with_database(Database::open_at(path)?)
    }

    pub fn with_database(db: Database) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Sample>();
        let handle = thread::Builder::new()
            .name("physiotrack-samples".to_string())
            .spawn(move || {
                while let Ok(sample) = rx.recv() {
                    if let Err(e) = db.insert_sample(&sample) {
                        warn!(pressure = sample.pressure, error = %e, "failed to store sample");
                    }
                }
                debug!("sample writer stopped");
            })?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }
}

impl SampleStore for SampleWriter {
    fn append_sample(&mut self, sample: &Sample) -> Result<()> {
        let tx = self.tx.as_ref().ok_or_else(writer_gone)?;
        tx.send(sample.clone()).map_err(|_| writer_gone())
    }
}

impl Drop for SampleWriter {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("sample writer thread panicked");
            }
        }
    }
}

fn writer_gone() -> CoreError {
    CoreError::Collaborator {
        collaborator: "sample writer",
        message: "writer thread is not running".into(),
    }
}
