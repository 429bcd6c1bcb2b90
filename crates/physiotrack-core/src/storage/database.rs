//! SQLite-based local stores.
//!
//! Provides persistent storage for:
//! - Patients (existence checks before a session)
//! - Recorded pressure samples, grouped by patient, session start and mode
//! - Key-value store for the paired device and timer preset

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::data_dir;
use crate::error::{DatabaseError, Result};
use crate::session::{DeviceRegistry, PatientDirectory, PresetStore, Sample, SampleStore};
use crate::timer::TimerPreset;

const KEY_PAIRED_DEVICE: &str = "paired_device";
const KEY_TIMER_PRESET: &str = "timer_preset";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One recorded session as stored: samples share a session key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_key: String,
    pub exercise_mode: String,
    pub session_start: Option<DateTime<Utc>>,
    pub sample_count: u64,
}

/// `<patient>/<mode>_<session start>`, patient lower-cased.
pub fn session_key(sample: &Sample) -> String {
    let patient = sample
        .patient_id
        .as_deref()
        .unwrap_or("unknown")
        .to_lowercase();
    let mode = sample.exercise_mode.as_deref().unwrap_or("unknown");
    let start = sample
        .session_start
        .map(|s| s.timestamp_millis())
        .unwrap_or_default();
    format!("{patient}/{mode}_{start}")
}

/// SQLite database for the CLI's collaborators.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Default location: `~/.config/physiotrack/physiotrack.db`.
    pub fn default_path() -> Result<PathBuf> {
        Ok(data_dir()?.join("physiotrack.db"))
    }

    /// Open the database at the default location.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        Self::open_at(&Self::default_path()?)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        // The sample writer holds a second connection to the same file.
        if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
            warn!(error = %e, "failed to enable WAL mode");
        }
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> std::result::Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS patients (
                id         TEXT PRIMARY KEY,
                name       TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS samples (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                session_key   TEXT NOT NULL,
                patient_id    TEXT,
                exercise_mode TEXT,
                session_start TEXT,
                pressure      REAL NOT NULL,
                captured_at   TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_samples_session_key ON samples(session_key);
            CREATE INDEX IF NOT EXISTS idx_samples_patient ON samples(patient_id);",
        )?;
        Ok(())
    }

    // ── kv ───────────────────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> std::result::Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> std::result::Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // ── patients ─────────────────────────────────────────────────────

    /// Register a patient. Ids are stored lower-cased. Returns false if the
    /// patient already existed.
    pub fn add_patient(&self, id: &str, name: Option<&str>) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO patients (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![id.trim().to_lowercase(), name, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    pub fn list_patients(&self) -> Result<Vec<PatientRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM patients ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut patients = Vec::new();
        for row in rows {
            let (id, name, created_at) = row?;
            patients.push(PatientRecord {
                id,
                name,
                created_at: parse_time(&created_at),
            });
        }
        Ok(patients)
    }

    // ── samples ──────────────────────────────────────────────────────

    pub fn insert_sample(&self, sample: &Sample) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO samples
                (session_key, patient_id, exercise_mode, session_start, pressure, captured_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_key(sample),
                sample.patient_id.as_deref().map(str::to_lowercase),
                sample.exercise_mode,
                sample.session_start.map(|s| s.to_rfc3339()),
                sample.pressure,
                sample.captured_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Samples stored under `key`, in arrival order.
    pub fn samples_for_session(&self, key: &str) -> Result<Vec<Sample>> {
        let mut stmt = self.conn.prepare(
            "SELECT pressure, captured_at, session_start, patient_id, exercise_mode
             FROM samples WHERE session_key = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![key], |row| {
            Ok((
                row.get::<_, f64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut samples = Vec::new();
        for row in rows {
            let (pressure, captured_at, session_start, patient_id, exercise_mode) = row?;
            samples.push(Sample {
                pressure,
                captured_at: parse_time(&captured_at),
                session_start: session_start.as_deref().map(parse_time),
                patient_id,
                exercise_mode,
            });
        }
        Ok(samples)
    }

    /// Recorded sessions for a patient, newest first.
    pub fn sessions_for_patient(&self, patient_id: &str) -> Result<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_key, COALESCE(exercise_mode, ''), session_start, COUNT(*)
             FROM samples
             WHERE patient_id = ?1
             GROUP BY session_key
             ORDER BY MIN(id) DESC",
        )?;
        let rows = stmt.query_map(params![patient_id.to_lowercase()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, u64>(3)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (session_key, exercise_mode, session_start, sample_count) = row?;
            sessions.push(SessionRecord {
                session_key,
                exercise_mode,
                session_start: session_start.as_deref().map(parse_time),
                sample_count,
            });
        }
        Ok(sessions)
    }
}

fn parse_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

impl DeviceRegistry for Database {
    fn paired_device(&self) -> Result<Option<String>> {
        Ok(self.kv_get(KEY_PAIRED_DEVICE)?)
    }

    fn set_paired_device(&mut self, device_id: &str) -> Result<()> {
        Ok(self.kv_set(KEY_PAIRED_DEVICE, device_id)?)
    }
}

impl PresetStore for Database {
    fn timer_preset(&self) -> Result<Option<TimerPreset>> {
        match self.kv_get(KEY_TIMER_PRESET)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn set_timer_preset(&mut self, preset: &TimerPreset) -> Result<()> {
        let json = serde_json::to_string(preset)?;
        Ok(self.kv_set(KEY_TIMER_PRESET, &json)?)
    }
}

impl PatientDirectory for Database {
    fn patient_exists(&self, patient_id: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM patients WHERE id = ?1",
                params![patient_id.trim().to_lowercase()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl SampleStore for Database {
    fn append_sample(&mut self, sample: &Sample) -> Result<()> {
        self.insert_sample(sample).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::timestamp;

    fn sample(pressure: f64, at: u64) -> Sample {
        Sample {
            pressure,
            captured_at: timestamp(at),
            session_start: Some(timestamp(1_000)),
            patient_id: Some("Alice".into()),
            exercise_mode: Some("Lumbar Flexion".into()),
        }
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
    }

    #[test]
    fn paired_device_and_preset_roundtrip() {
        let mut db = Database::open_memory().unwrap();
        assert_eq!(db.paired_device().unwrap(), None);
        assert_eq!(db.timer_preset().unwrap(), None);
        db.set_paired_device("esp-7").unwrap();
        let preset = TimerPreset::new(30.0, 15.0, 4).unwrap();
        db.set_timer_preset(&preset).unwrap();
        assert_eq!(db.paired_device().unwrap().as_deref(), Some("esp-7"));
        assert_eq!(db.timer_preset().unwrap(), Some(preset));
    }

    #[test]
    fn corrupt_stored_preset_is_rejected() {
        let db = Database::open_memory().unwrap();
        db.kv_set(
            KEY_TIMER_PRESET,
            r#"{"work_secs":0.0,"rest_secs":10.0,"repetitions":3}"#,
        )
        .unwrap();
        assert!(db.timer_preset().is_err());
    }

    #[test]
    fn file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("physiotrack.db")).unwrap();
        let mode: String = db
            .conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn patients_are_case_insensitive() {
        let db = Database::open_memory().unwrap();
        assert!(db.add_patient("Alice", Some("Alice Smith")).unwrap());
        assert!(!db.add_patient("alice", None).unwrap());
        assert!(db.patient_exists("ALICE").unwrap());
        assert!(!db.patient_exists("bob").unwrap());
        let patients = db.list_patients().unwrap();
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].name.as_deref(), Some("Alice Smith"));
    }

    #[test]
    fn samples_are_grouped_by_session_key() {
        let mut db = Database::open_memory().unwrap();
        db.append_sample(&sample(25.0, 1_010)).unwrap();
        db.append_sample(&sample(45.0, 1_020)).unwrap();
        let key = session_key(&sample(0.0, 0));
        assert_eq!(key, "alice/Lumbar Flexion_1000");

        let stored = db.samples_for_session(&key).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].pressure, 45.0);
        assert_eq!(stored[1].captured_at, timestamp(1_020));

        let sessions = db.sessions_for_patient("Alice").unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].sample_count, 2);
    }

    #[test]
    fn open_at_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("physiotrack.db");
        {
            let mut db = Database::open_at(&path).unwrap();
            db.set_paired_device("esp-1").unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.paired_device().unwrap().as_deref(), Some("esp-1"));
    }
}
