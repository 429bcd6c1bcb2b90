//! Audio cues.
//!
//! The controller asks for cues through [`CuePlayer`] and never waits on them.
//! [`LogCuePlayer`] is the default player; building with the `sound` feature
//! adds [`RodioCuePlayer`], which plays the configured files on a dedicated
//! audio thread.

#[cfg(feature = "sound")]
mod rodio_player;

#[cfg(feature = "sound")]
pub use rodio_player::RodioCuePlayer;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::AudioConfig;
use crate::timer::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueId {
    /// Session start and every work phase after a rest.
    Start,
    Rest,
    /// Alternative rest cue.
    Cat,
    Finish,
    /// Over-pressure warning.
    Warning,
}

/// Cues allowed at the start of a rest phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestCue {
    #[default]
    Rest,
    Cat,
}

impl From<RestCue> for CueId {
    fn from(cue: RestCue) -> Self {
        match cue {
            RestCue::Rest => CueId::Rest,
            RestCue::Cat => CueId::Cat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayOptions {
    pub skip_if_playing: bool,
}

impl PlayOptions {
    pub fn skip_if_playing() -> Self {
        Self {
            skip_if_playing: true,
        }
    }
}

/// Fire-and-forget playback.
pub trait CuePlayer {
    fn play(&mut self, cue: CueId, options: PlayOptions);
}

/// Tracks which cues are still sounding, assuming each plays for a fixed
/// duration.
#[derive(Debug, Clone)]
pub struct CueTracker {
    duration_ms: u64,
    playing_until: HashMap<CueId, u64>,
}

impl CueTracker {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            playing_until: HashMap::new(),
        }
    }

    pub fn is_playing_at(&self, cue: CueId, now_ms: u64) -> bool {
        self.playing_until
            .get(&cue)
            .is_some_and(|until| now_ms < *until)
    }

    /// Record a play request. Returns false when the request should be dropped.
    pub fn begin_at(&mut self, cue: CueId, options: PlayOptions, now_ms: u64) -> bool {
        if options.skip_if_playing && self.is_playing_at(cue, now_ms) {
            return false;
        }
        self.playing_until
            .insert(cue, now_ms.saturating_add(self.duration_ms));
        true
    }
}

/// File path per cue.
#[derive(Debug, Clone)]
pub struct CueSources {
    start: String,
    rest: String,
    cat: String,
    finish: String,
    warning: String,
}

impl CueSources {
    pub fn from_config(audio: &AudioConfig) -> Self {
        Self {
            start: audio.start.clone(),
            rest: audio.rest.clone(),
            cat: audio.cat.clone(),
            finish: audio.finish.clone(),
            warning: audio.warning.clone(),
        }
    }

    pub fn path(&self, cue: CueId) -> &str {
        match cue {
            CueId::Start => &self.start,
            CueId::Rest => &self.rest,
            CueId::Cat => &self.cat,
            CueId::Finish => &self.finish,
            CueId::Warning => &self.warning,
        }
    }
}

/// Logs cues instead of playing them.
pub struct LogCuePlayer {
    tracker: CueTracker,
    sources: CueSources,
}

impl LogCuePlayer {
    pub fn new(audio: &AudioConfig) -> Self {
        Self {
            tracker: CueTracker::new(audio.cue_duration_ms),
            sources: CueSources::from_config(audio),
        }
    }
}

impl CuePlayer for LogCuePlayer {
    fn play(&mut self, cue: CueId, options: PlayOptions) {
        if self.tracker.begin_at(cue, options, now_ms()) {
            info!(cue = ?cue, source = self.sources.path(cue), "cue");
        } else {
            debug!(cue = ?cue, "cue already playing, skipped");
        }
    }
}

/// Player that drops everything. Used when audio is disabled.
pub struct SilentCuePlayer;

impl CuePlayer for SilentCuePlayer {
    fn play(&mut self, _cue: CueId, _options: PlayOptions) {}
}

/// Records every request. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingCuePlayer {
    requests: Arc<Mutex<Vec<(CueId, PlayOptions)>>>,
}

impl RecordingCuePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<(CueId, PlayOptions)> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn count(&self, cue: CueId) -> usize {
        self.requests().iter().filter(|(c, _)| *c == cue).count()
    }
}

impl CuePlayer for RecordingCuePlayer {
    fn play(&mut self, cue: CueId, options: PlayOptions) {
        let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
        requests.push((cue, options));
    }
}

/// Pick the player for this build and config.
pub fn player_for(audio: &AudioConfig) -> Box<dyn CuePlayer + Send> {
    if !audio.enabled {
        return Box::new(SilentCuePlayer);
    }
    #[cfg(feature = "sound")]
    {
        match RodioCuePlayer::spawn(audio) {
            Ok(player) => return Box::new(player),
            Err(e) => tracing::warn!(error = %e, "audio output unavailable, logging cues"),
        }
    }
    Box::new(LogCuePlayer::new(audio))
}
