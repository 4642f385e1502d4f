/// Stepline - a step sequencer playback engine
///
/// This library turns grid patterns into timed note events:
/// - Pattern model with per-note step grids, velocity and sustain length
/// - A transport that ticks every sixteenth note and schedules note-offs
/// - An output sink trait, with a MIDI implementation for production use

pub mod error;
pub mod midi;
pub mod sequencer;

// Re-export commonly used types
pub use error::{
    ConfigurationError, InitializationError, OutputError, SequencerError, ValidationError,
};
pub use midi::{midi_note_name, OutputSink};
#[cfg(feature = "midi")]
pub use midi::MidiOutputDevice;
pub use sequencer::pattern::{Note, Pattern, Step};
pub use sequencer::playback::PlaybackEvent;
pub use sequencer::timeline::Timeline;
pub use sequencer::{Sequencer, TransportState};
