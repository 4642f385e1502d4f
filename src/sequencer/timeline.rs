/// Timeline - the task schedule behind one playback run
///
/// Holds the recurring tick task and every pending note-off as owned data,
/// measured in time since playback started. Nothing here touches a real
/// clock, so the playback thread decides when to call in and tests can step
/// through virtual time.
use std::time::Duration;

use super::pattern::Pattern;
use super::playback::PlaybackEvent;

/// Shortest tick interval the timeline will run at
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq)]
struct NoteOffTask {
    due: Duration,
    pitch: u8,
    channel: u8,
}

#[derive(Debug)]
pub struct Timeline {
    interval: Duration,
    next_tick: Option<Duration>,
    ticks_fired: u64,
    cursor: usize,
    pending: Vec<NoteOffTask>,
}

impl Timeline {
    /// A timeline whose first tick is due immediately
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_TICK_INTERVAL),
            next_tick: Some(Duration::ZERO),
            ticks_fired: 0,
            cursor: 0,
            pending: Vec::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Step played by the most recent tick
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_stopped(&self) -> bool {
        self.next_tick.is_none()
    }

    pub fn pending_note_offs(&self) -> usize {
        self.pending.len()
    }

    /// Earliest time any task wants to run, `None` once stopped and drained
    pub fn next_deadline(&self) -> Option<Duration> {
        let note_off = self.pending.iter().map(|t| t.due).min();
        match (self.next_tick, note_off) {
            (Some(tick), Some(off)) => Some(tick.min(off)),
            (tick, off) => tick.or(off),
        }
    }

    /// Run every task due at or before `now`, in deadline order.
    ///
    /// Note-offs due at the same instant as a tick run first, so a note
    /// retriggered on consecutive steps is released before it sounds again.
    pub fn fire_due(&mut self, now: Duration, pattern: &Pattern) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();

        while let Some(deadline) = self.next_deadline() {
            if deadline > now {
                break;
            }

            if let Some(index) = self.note_off_due_at(deadline) {
                let task = self.pending.remove(index);
                events.push(PlaybackEvent::NoteOff(task.pitch, task.channel));
            } else {
                self.tick(deadline, pattern, &mut events);
            }
        }

        events
    }

    /// Cancel the tick task and release everything still held.
    ///
    /// Each sounding pitch/channel pair gets exactly one note-off.
    pub fn stop(&mut self) -> Vec<PlaybackEvent> {
        self.next_tick = None;

        let mut released: Vec<(u8, u8)> = Vec::new();
        for task in self.pending.drain(..) {
            if !released.contains(&(task.pitch, task.channel)) {
                released.push((task.pitch, task.channel));
            }
        }

        released
            .into_iter()
            .map(|(pitch, channel)| PlaybackEvent::NoteOff(pitch, channel))
            .collect()
    }

    fn note_off_due_at(&self, deadline: Duration) -> Option<usize> {
        self.pending
            .iter()
            .enumerate()
            .filter(|(_, task)| task.due <= deadline)
            .min_by_key(|(_, task)| task.due)
            .map(|(index, _)| index)
    }

    fn tick(&mut self, at: Duration, pattern: &Pattern, events: &mut Vec<PlaybackEvent>) {
        // The first tick plays the step `start` reset to; later ones advance first
        if self.ticks_fired > 0 {
            self.cursor = (self.cursor + 1) % pattern.length.max(1);
            events.push(PlaybackEvent::StepAdvanced(self.cursor));
        }
        self.ticks_fired += 1;
        self.next_tick = Some(at.saturating_add(self.interval));

        for note in &pattern.notes {
            if !note.is_active(self.cursor) {
                continue;
            }
            events.push(PlaybackEvent::NoteOn(
                note.pitch,
                note.normalized_velocity(),
                pattern.channel,
            ));
            self.pending.push(NoteOffTask {
                due: at.saturating_add(self.interval.saturating_mul(note.length_in_steps)),
                pitch: note.pitch,
                channel: pattern.channel,
            });
        }
    }
}
