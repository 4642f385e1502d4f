/// Pattern model - what the sequencer plays
///
/// Patterns are plain values. Hosts edit a copy and hand the whole thing to
/// `Sequencer::set_pattern`, so the playback thread never sees a half-edited one.
use std::collections::HashSet;
use std::time::Duration;

use crate::error::{ConfigurationError, ValidationError};

/// Sixteenth-note ticks per beat
pub const TICKS_PER_BEAT: f64 = 4.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Step {
    pub active: bool,
}

impl Step {
    pub fn on() -> Self {
        Self { active: true }
    }

    pub fn off() -> Self {
        Self { active: false }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: String,
    pub pitch: u8,
    pub velocity: u8,
    /// Ticks the note is held before its note-off
    pub length_in_steps: u32,
    pub steps: Vec<Step>,
}

impl Note {
    /// A note with `step_count` inactive steps
    pub fn new(
        id: impl Into<String>,
        pitch: u8,
        velocity: u8,
        length_in_steps: u32,
        step_count: usize,
    ) -> Self {
        Self {
            id: id.into(),
            pitch,
            velocity,
            length_in_steps,
            steps: vec![Step::off(); step_count],
        }
    }

    /// Builder-style variant of [`Note::set`]
    pub fn with_active_steps(mut self, indices: &[usize]) -> Self {
        for &i in indices {
            self.set(i, true);
        }
        self
    }

    pub fn is_active(&self, step: usize) -> bool {
        self.steps.get(step).map(|s| s.active).unwrap_or(false)
    }

    pub fn set(&mut self, step: usize, active: bool) {
        if let Some(s) = self.steps.get_mut(step) {
            s.active = active;
        }
    }

    pub fn toggle(&mut self, step: usize) {
        let current = self.is_active(step);
        self.set(step, !current);
    }

    pub fn clear(&mut self) {
        for step in &mut self.steps {
            step.active = false;
        }
    }

    pub fn fill(&mut self) {
        for step in &mut self.steps {
            step.active = true;
        }
    }

    /// Velocity scaled to 0.0-1.0 for the output sink
    pub fn normalized_velocity(&self) -> f32 {
        f32::from(self.velocity.min(127)) / 127.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub id: String,
    pub name: String,
    pub tempo_bpm: f64,
    /// Number of steps every note carries
    pub length: usize,
    /// MIDI channel, 1-16
    pub channel: u8,
    pub notes: Vec<Note>,
}

impl Pattern {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        tempo_bpm: f64,
        length: usize,
        channel: u8,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tempo_bpm,
            length,
            channel,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: Note) -> Self {
        self.notes.push(note);
        self
    }

    pub fn note(&self, id: &str) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    /// Check every structural invariant playback relies on.
    ///
    /// Tempo is deliberately left out: it only matters once playback starts,
    /// see [`Pattern::tick_interval`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.length == 0 {
            return Err(ValidationError::EmptyPattern);
        }
        if !(1..=16).contains(&self.channel) {
            return Err(ValidationError::ChannelOutOfRange(self.channel));
        }

        let mut seen = HashSet::new();
        for note in &self.notes {
            if !seen.insert(note.id.as_str()) {
                return Err(ValidationError::DuplicateNoteId(note.id.clone()));
            }
            if note.pitch > 127 {
                return Err(ValidationError::PitchOutOfRange {
                    note_id: note.id.clone(),
                    pitch: note.pitch,
                });
            }
            if note.velocity > 127 {
                return Err(ValidationError::VelocityOutOfRange {
                    note_id: note.id.clone(),
                    velocity: note.velocity,
                });
            }
            if note.length_in_steps == 0 {
                return Err(ValidationError::ZeroLength {
                    note_id: note.id.clone(),
                });
            }
            if note.steps.len() != self.length {
                return Err(ValidationError::StepCountMismatch {
                    note_id: note.id.clone(),
                    expected: self.length,
                    actual: note.steps.len(),
                });
            }
        }
        Ok(())
    }

    /// Time between ticks: one sixteenth note at the pattern's tempo
    pub fn tick_interval(&self) -> Result<Duration, ConfigurationError> {
        if !self.tempo_bpm.is_finite() || self.tempo_bpm <= 0.0 {
            return Err(ConfigurationError::NonPositiveTempo(self.tempo_bpm));
        }
        Duration::try_from_secs_f64(60.0 / self.tempo_bpm / TICKS_PER_BEAT)
            .map_err(|_| ConfigurationError::TempoOutOfRange(self.tempo_bpm))
    }

    /// Copy of this pattern with one step of one note flipped
    pub fn with_step_toggled(&self, note_id: &str, step: usize) -> Self {
        self.with_note_updated(note_id, |note| note.toggle(step))
    }

    /// Copy of this pattern with `update` applied to the note `note_id`
    pub fn with_note_updated(&self, note_id: &str, update: impl FnOnce(&mut Note)) -> Self {
        let mut next = self.clone();
        if let Some(note) = next.notes.iter_mut().find(|n| n.id == note_id) {
            update(note);
        }
        next
    }

    /// Copy of this pattern resized to `length` steps.
    ///
    /// Every note is truncated or padded with inactive steps so the step
    /// counts keep matching.
    pub fn with_length(&self, length: usize) -> Self {
        let mut next = self.clone();
        next.length = length;
        for note in &mut next.notes {
            note.steps.resize(length, Step::off());
        }
        next
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern::new("p1", "My Pattern", 120.0, 16, 1).with_note(Note::new("n1", 60, 100, 1, 16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pattern_is_valid() {
        let pattern = Pattern::default();
        assert_eq!(pattern.length, 16);
        assert_eq!(pattern.notes.len(), 1);
        assert!(pattern.notes[0].steps.iter().all(|s| !s.active));
        assert!(pattern.validate().is_ok());
    }

    #[test]
    fn test_tick_interval_at_120_bpm() {
        let pattern = Pattern::default();
        assert_eq!(pattern.tick_interval().unwrap(), Duration::from_millis(125));
    }

    #[test]
    fn test_tick_interval_rejects_non_positive_tempo() {
        for tempo in [0.0, -10.0, f64::NAN] {
            let mut pattern = Pattern::default();
            pattern.tempo_bpm = tempo;
            assert!(matches!(
                pattern.tick_interval(),
                Err(ConfigurationError::NonPositiveTempo(_))
            ));
        }
    }

    #[test]
    fn test_tick_interval_rejects_unrepresentable_tempo() {
        for tempo in [f64::MIN_POSITIVE, 1e-20] {
            let mut pattern = Pattern::default();
            pattern.tempo_bpm = tempo;
            assert_eq!(
                pattern.tick_interval(),
                Err(ConfigurationError::TempoOutOfRange(tempo))
            );
        }
    }

    #[test]
    fn test_step_count_mismatch() {
        let pattern =
            Pattern::new("p", "short", 120.0, 4, 1).with_note(Note::new("a", 60, 100, 1, 3));
        assert_eq!(
            pattern.validate(),
            Err(ValidationError::StepCountMismatch {
                note_id: "a".into(),
                expected: 4,
                actual: 3,
            })
        );
    }

    #[test]
    fn test_validation_catches_bad_fields() {
        let base = Pattern::new("p", "x", 120.0, 4, 1);

        let mut bad_channel = base.clone();
        bad_channel.channel = 17;
        assert_eq!(bad_channel.validate(), Err(ValidationError::ChannelOutOfRange(17)));

        let dupes = base
            .clone()
            .with_note(Note::new("a", 60, 100, 1, 4))
            .with_note(Note::new("a", 62, 100, 1, 4));
        assert_eq!(dupes.validate(), Err(ValidationError::DuplicateNoteId("a".into())));

        let zero_len = base.clone().with_note(Note::new("a", 60, 100, 0, 4));
        assert!(matches!(zero_len.validate(), Err(ValidationError::ZeroLength { .. })));

        let loud = base.clone().with_note(Note::new("a", 60, 200, 1, 4));
        assert!(matches!(loud.validate(), Err(ValidationError::VelocityOutOfRange { .. })));

        assert_eq!(base.with_length(0).validate(), Err(ValidationError::EmptyPattern));
    }

    #[test]
    fn test_note_toggle() {
        let mut note = Note::new("a", 60, 100, 1, 4);
        assert!(!note.is_active(0));
        note.toggle(0);
        assert!(note.is_active(0));
        note.toggle(9);
        assert!(!note.is_active(9));
        note.fill();
        assert!(note.steps.iter().all(|s| s.active));
        note.clear();
        assert!(note.steps.iter().all(|s| !s.active));
    }

    #[test]
    fn test_with_step_toggled_leaves_original() {
        let original = Pattern::default();
        let edited = original.with_step_toggled("n1", 3);
        assert!(!original.notes[0].is_active(3));
        assert!(edited.notes[0].is_active(3));
    }

    #[test]
    fn test_with_length_keeps_notes_consistent() {
        let pattern = Pattern::default().with_step_toggled("n1", 15);
        let short = pattern.with_length(8);
        assert!(short.validate().is_ok());
        assert_eq!(short.notes[0].steps.len(), 8);

        let long = short.with_length(32);
        assert!(long.validate().is_ok());
        assert!(!long.notes[0].is_active(15));
    }

    #[test]
    fn test_normalized_velocity() {
        let note = Note::new("a", 60, 127, 1, 1);
        assert_eq!(note.normalized_velocity(), 1.0);
        let note = Note::new("a", 60, 0, 1, 1);
        assert_eq!(note.normalized_velocity(), 0.0);
    }
}
