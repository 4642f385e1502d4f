/// Core sequencer - the transport that plays a pattern on an output sink
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

use crate::error::{ConfigurationError, InitializationError, OutputError, ValidationError};
use crate::midi::OutputSink;

pub mod pattern;
pub mod playback;
pub mod timeline;

use pattern::Pattern;
use playback::{lock, Observers, PlaybackContext, PlaybackEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Running,
}

/// Plays one pattern at a time on one output sink.
///
/// The pattern can be swapped at any time; a running sequencer picks the new
/// one up on its next tick. Tempo is read once, when playback starts.
pub struct Sequencer {
    pattern: Arc<ArcSwap<Pattern>>,
    sink: Arc<Mutex<Box<dyn OutputSink>>>,
    observers: Arc<Mutex<Observers>>,
    engine: PlaybackEngine,
}

impl Sequencer {
    pub fn new(
        pattern: Pattern,
        sink: impl OutputSink + 'static,
    ) -> Result<Self, InitializationError> {
        if !sink.is_ready() {
            return Err(InitializationError::NoOutput(
                "output sink is not ready".to_string(),
            ));
        }
        pattern.validate()?;
        let sink: Box<dyn OutputSink> = Box::new(sink);

        Ok(Self {
            pattern: Arc::new(ArcSwap::from_pointee(pattern)),
            sink: Arc::new(Mutex::new(sink)),
            observers: Arc::new(Mutex::new(Observers::default())),
            engine: PlaybackEngine::new(),
        })
    }

    /// Sequencer on the first MIDI output port found
    #[cfg(feature = "midi")]
    pub fn with_default_output(pattern: Pattern) -> Result<Self, InitializationError> {
        let mut device = crate::midi::MidiOutputDevice::new();
        device.connect_first()?;
        Self::new(pattern, device)
    }

    pub fn state(&self) -> TransportState {
        if self.engine.is_running() {
            TransportState::Running
        } else {
            TransportState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == TransportState::Running
    }

    /// Snapshot of the pattern the next tick will play
    pub fn pattern(&self) -> Arc<Pattern> {
        self.pattern.load_full()
    }

    /// Replace the pattern. An invalid pattern is rejected and the current
    /// one stays in effect.
    pub fn set_pattern(&self, pattern: Pattern) -> Result<(), ValidationError> {
        pattern.validate()?;
        log::debug!(
            target: "sequencer",
            "Pattern '{}' swapped in ({} notes, {} steps)",
            pattern.name,
            pattern.notes.len(),
            pattern.length
        );
        self.pattern.store(Arc::new(pattern));
        Ok(())
    }

    /// Called with the new step index after every tick that advances.
    ///
    /// Runs on the playback thread with the sink and observer locks held, so
    /// calling back into this `Sequencer` from inside it deadlocks.
    pub fn set_step_observer(&self, observer: impl FnMut(usize) + Send + 'static) {
        lock(&self.observers).step = Some(Box::new(observer));
    }

    pub fn clear_step_observer(&self) {
        lock(&self.observers).step = None;
    }

    /// Called for every note event the sink failed to deliver.
    ///
    /// Runs on the playback thread with the sink and observer locks held, so
    /// calling back into this `Sequencer` from inside it deadlocks.
    pub fn set_error_observer(&self, observer: impl FnMut(&OutputError) + Send + 'static) {
        lock(&self.observers).error = Some(Box::new(observer));
    }

    pub fn start(&mut self) -> Result<(), ConfigurationError> {
        if self.is_running() {
            return Ok(());
        }

        let pattern = self.pattern.load();
        let interval = pattern.tick_interval()?;
        log::info!(
            target: "sequencer",
            "Starting '{}' at {} BPM ({:?} per step)",
            pattern.name,
            pattern.tempo_bpm,
            interval
        );

        self.engine.start(
            interval,
            PlaybackContext {
                pattern: Arc::clone(&self.pattern),
                sink: Arc::clone(&self.sink),
                observers: Arc::clone(&self.observers),
            },
        )
    }

    /// Stop ticking and release every note still held.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        self.engine.stop();
        log::info!(target: "sequencer", "Stopped");
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.stop();
    }
}
