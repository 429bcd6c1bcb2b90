use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::sync::mpsc::{self, Sender};
use std::thread;

use rodio::{Decoder, OutputStream, Sink};
use tracing::{debug, warn};

use super::{CueId, CuePlayer, CueSources, PlayOptions};
use crate::error::{CoreError, Result};
use crate::storage::AudioConfig;

enum AudioCommand {
    Play(CueId, PlayOptions),
}

/// Plays cue files through the default output device.
///
/// The output stream is not `Send`, so it lives on its own thread and the
/// player only holds the command sender.
pub struct RodioCuePlayer {
    tx: Sender<AudioCommand>,
}

impl RodioCuePlayer {
    pub fn spawn(audio: &AudioConfig) -> Result<Self> {
        let sources = CueSources::from_config(audio);
        let (tx, rx) = mpsc::channel::<AudioCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<(), String>>();

        thread::Builder::new()
            .name("physiotrack-audio".to_string())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => {
                        let _ = ready_tx.send(Ok(()));
                        pair
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let mut sinks: HashMap<CueId, Sink> = HashMap::new();

                while let Ok(AudioCommand::Play(cue, options)) = rx.recv() {
                    if options.skip_if_playing && sinks.get(&cue).is_some_and(|s| !s.empty()) {
                        debug!(cue = ?cue, "cue already playing, skipped");
                        continue;
                    }
                    let path = sources.path(cue);
                    let source = match File::open(path)
                        .map_err(|e| e.to_string())
                        .and_then(|f| Decoder::new(BufReader::new(f)).map_err(|e| e.to_string()))
                    {
                        Ok(source) => source,
                        Err(e) => {
                            warn!(cue = ?cue, path, error = %e, "failed to load cue");
                            continue;
                        }
                    };
                    match Sink::try_new(&handle) {
                        Ok(sink) => {
                            sink.append(source);
                            if let Some(old) = sinks.insert(cue, sink) {
                                old.stop();
                            }
                        }
                        Err(e) => warn!(cue = ?cue, error = %e, "failed to create audio sink"),
                    }
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { tx }),
            Ok(Err(e)) => Err(CoreError::Custom(format!("audio output: {e}"))),
            Err(e) => Err(CoreError::Custom(format!("audio thread exited: {e}"))),
        }
    }
}

impl CuePlayer for RodioCuePlayer {
    fn play(&mut self, cue: CueId, options: PlayOptions) {
        if self.tx.send(AudioCommand::Play(cue, options)).is_err() {
            warn!(cue = ?cue, "audio thread gone, cue dropped");
        }
    }
}
