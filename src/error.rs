/// Error types for the sequencer and its output sinks
use thiserror::Error;

/// The scheduler could not be constructed.
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("No usable output: {0}")]
    NoOutput(String),

    #[error("Initial pattern is invalid: {0}")]
    InvalidPattern(#[from] ValidationError),
}

/// Playback could not start with the current pattern.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("Tempo must be a positive number of BPM, got {0}")]
    NonPositiveTempo(f64),

    #[error("Tempo of {0} BPM gives a step longer than the clock can represent")]
    TempoOutOfRange(f64),

    #[error("Could not start the playback thread: {0}")]
    ThreadSpawn(String),
}

/// A pattern broke one of its structural invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Pattern length must be at least one step")]
    EmptyPattern,

    #[error("MIDI channel {0} is outside 1-16")]
    ChannelOutOfRange(u8),

    #[error("Note id '{0}' is used more than once")]
    DuplicateNoteId(String),

    #[error("Note '{note_id}' has pitch {pitch}, expected 0-127")]
    PitchOutOfRange { note_id: String, pitch: u8 },

    #[error("Note '{note_id}' has velocity {velocity}, expected 0-127")]
    VelocityOutOfRange { note_id: String, velocity: u8 },

    #[error("Note '{note_id}' must hold for at least one step")]
    ZeroLength { note_id: String },

    #[error("Note '{note_id}' has {actual} steps but the pattern has {expected}")]
    StepCountMismatch {
        note_id: String,
        expected: usize,
        actual: usize,
    },
}

/// A sink failed to deliver a note event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputError {
    #[error("Output is not connected")]
    NotConnected,

    #[error("Failed to send: {0}")]
    Send(String),
}

/// Umbrella error for hosts driving the whole lifecycle.
#[derive(Debug, Error)]
pub enum SequencerError {
    #[error(transparent)]
    Initialization(#[from] InitializationError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Output(#[from] OutputError),
}
