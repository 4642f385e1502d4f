/// Playback engine - runs a timeline against the wall clock
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use super::pattern::Pattern;
use super::timeline::Timeline;
use crate::error::{ConfigurationError, OutputError};
use crate::midi::{midi_note_name, OutputSink};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEvent {
    StepAdvanced(usize),
    NoteOn(u8, f32, u8), // pitch, velocity 0.0-1.0, channel
    NoteOff(u8, u8),     // pitch, channel
}

pub(crate) type StepObserver = Box<dyn FnMut(usize) + Send>;
pub(crate) type ErrorObserver = Box<dyn FnMut(&OutputError) + Send>;

#[derive(Default)]
pub(crate) struct Observers {
    pub step: Option<StepObserver>,
    pub error: Option<ErrorObserver>,
}

/// Everything the playback thread shares with its `Sequencer`
#[derive(Clone)]
pub(crate) struct PlaybackContext {
    pub pattern: Arc<ArcSwap<Pattern>>,
    pub sink: Arc<Mutex<Box<dyn OutputSink>>>,
    pub observers: Arc<Mutex<Observers>>,
}

/// The state behind these locks is valid between calls, so a panic
/// elsewhere must not take playback down with it.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run a sink or observer call, turning a panic into a reportable error
fn guarded<T>(what: &str, call: impl FnOnce() -> T) -> Result<T, OutputError> {
    panic::catch_unwind(AssertUnwindSafe(call)).map_err(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        OutputError::Send(format!("{} panicked: {}", what, reason))
    })
}

impl PlaybackContext {
    /// Hand events to the sink and observers in timeline order
    fn dispatch(&self, events: Vec<PlaybackEvent>) {
        if events.is_empty() {
            return;
        }

        let mut sink = lock(&self.sink);
        let mut observers = lock(&self.observers);

        for event in events {
            let result = match event {
                PlaybackEvent::StepAdvanced(step) => match observers.step.as_mut() {
                    Some(on_step) => guarded("step observer", || on_step(step)),
                    None => Ok(()),
                },
                PlaybackEvent::NoteOn(pitch, velocity, channel) => {
                    log::trace!(
                        target: "sequencer::playback",
                        "note on {} ch{} vel {:.2}",
                        midi_note_name(pitch),
                        channel,
                        velocity
                    );
                    guarded("output sink", || sink.note_on(pitch, velocity, channel))
                        .and_then(|sent| sent)
                }
                PlaybackEvent::NoteOff(pitch, channel) => {
                    log::trace!(
                        target: "sequencer::playback",
                        "note off {} ch{}",
                        midi_note_name(pitch),
                        channel
                    );
                    guarded("output sink", || sink.note_off(pitch, channel)).and_then(|sent| sent)
                }
            };

            if let Err(err) = result {
                log::warn!(target: "sequencer::playback", "Dropped {:?}: {}", event, err);
                if let Some(on_error) = observers.error.as_mut() {
                    if let Err(panicked) = guarded("error observer", || on_error(&err)) {
                        log::warn!(target: "sequencer::playback", "{}", panicked);
                    }
                }
            }
        }
    }
}

enum Control {
    Stop,
}

/// Owns the playback thread of a running sequencer
pub(crate) struct PlaybackEngine {
    control: Option<Sender<Control>>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    pub fn new() -> Self {
        Self {
            control: None,
            handle: None,
        }
    }

    /// False once the thread has exited, even if `stop` was never called
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn start(
        &mut self,
        interval: Duration,
        context: PlaybackContext,
    ) -> Result<(), ConfigurationError> {
        if self.is_running() {
            return Ok(());
        }
        // Reap a thread that ended on its own
        self.stop();

        let (sender, receiver) = bounded(1);

        let handle = thread::Builder::new()
            .name("stepline-playback".into())
            .spawn(move || {
                let started = Instant::now();
                let mut timeline = Timeline::new(interval);

                while let Some(due) = timeline.next_deadline() {
                    let woken = match started.checked_add(due) {
                        Some(deadline) => receiver.recv_deadline(deadline),
                        None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
                    };
                    match woken {
                        Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {}
                    }

                    let pattern = context.pattern.load();
                    let events = timeline.fire_due(started.elapsed(), &pattern);
                    context.dispatch(events);
                }

                context.dispatch(timeline.stop());
            })
            .map_err(|e| ConfigurationError::ThreadSpawn(e.to_string()))?;

        self.control = Some(sender);
        self.handle = Some(handle);
        Ok(())
    }

    /// Stop the thread and wait until held notes are released
    pub fn stop(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(Control::Stop);
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!(target: "sequencer::playback", "Playback thread panicked");
            }
        }
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
