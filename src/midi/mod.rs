/// Output sinks - where note events end up
#[cfg(feature = "midi")]
use midir::{MidiOutput, MidiOutputConnection};

use crate::error::OutputError;
#[cfg(feature = "midi")]
use crate::error::InitializationError;

const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;

/// Something that can sound a note.
///
/// Channels are 1-16 and velocity is scaled to 0.0-1.0. Errors are reported
/// back to the sequencer, which logs them and keeps playing.
pub trait OutputSink: Send {
    fn note_on(&mut self, pitch: u8, velocity: f32, channel: u8) -> Result<(), OutputError>;

    fn note_off(&mut self, pitch: u8, channel: u8) -> Result<(), OutputError>;

    /// Whether the sink can take events right now
    fn is_ready(&self) -> bool {
        true
    }
}

/// Raw note-on message for a 1-based channel
pub fn note_on_message(pitch: u8, velocity: f32, channel: u8) -> [u8; 3] {
    let velocity = (velocity.clamp(0.0, 1.0) * 127.0).round() as u8;
    [NOTE_ON | channel_nibble(channel), pitch & 0x7F, velocity]
}

/// Raw note-off message for a 1-based channel
pub fn note_off_message(pitch: u8, channel: u8) -> [u8; 3] {
    [NOTE_OFF | channel_nibble(channel), pitch & 0x7F, 0]
}

fn channel_nibble(channel: u8) -> u8 {
    channel.saturating_sub(1) & 0x0F
}

#[cfg(feature = "midi")]
pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
}

#[cfg(feature = "midi")]
impl MidiOutputDevice {
    const CLIENT_NAME: &'static str = "Stepline MIDI Output";

    pub fn new() -> Self {
        Self { connection: None }
    }

    pub fn available_ports() -> Vec<String> {
        if let Ok(midi_out) = MidiOutput::new(Self::CLIENT_NAME) {
            midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect()
        } else {
            vec![]
        }
    }

    pub fn connect(&mut self, port_index: usize) -> Result<(), InitializationError> {
        let midi_out = MidiOutput::new(Self::CLIENT_NAME).map_err(|e| {
            InitializationError::NoOutput(format!("Failed to create MIDI output: {}", e))
        })?;

        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| {
                InitializationError::NoOutput(format!("No MIDI output port {}", port_index))
            })?;
        let name = midi_out.port_name(port).unwrap_or_default();

        let connection = midi_out
            .connect(port, "stepline")
            .map_err(|e| InitializationError::NoOutput(format!("Failed to connect: {}", e)))?;

        log::info!(target: "midi", "Connected to MIDI output '{}'", name);
        self.connection = Some(connection);
        Ok(())
    }

    /// Connect to the first port the system lists
    pub fn connect_first(&mut self) -> Result<(), InitializationError> {
        self.connect(0)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
            log::info!(target: "midi", "Disconnected MIDI output");
        }
    }

    fn send(&mut self, message: &[u8]) -> Result<(), OutputError> {
        let conn = self.connection.as_mut().ok_or(OutputError::NotConnected)?;
        conn.send(message)
            .map_err(|e| OutputError::Send(e.to_string()))
    }
}

#[cfg(feature = "midi")]
impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "midi")]
impl OutputSink for MidiOutputDevice {
    fn note_on(&mut self, pitch: u8, velocity: f32, channel: u8) -> Result<(), OutputError> {
        self.send(&note_on_message(pitch, velocity, channel))
    }

    fn note_off(&mut self, pitch: u8, channel: u8) -> Result<(), OutputError> {
        self.send(&note_off_message(pitch, channel))
    }

    fn is_ready(&self) -> bool {
        self.is_connected()
    }
}

pub fn midi_note_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_names() {
        assert_eq!(midi_note_name(60), "C4");
        assert_eq!(midi_note_name(69), "A4");
        assert_eq!(midi_note_name(0), "C-1");
        assert_eq!(midi_note_name(127), "G9");
    }

    #[test]
    fn test_note_on_message() {
        assert_eq!(note_on_message(60, 100.0 / 127.0, 1), [0x90, 60, 100]);
        assert_eq!(note_on_message(64, 1.0, 16), [0x9F, 64, 127]);
        assert_eq!(note_on_message(64, 2.0, 10), [0x99, 64, 127]);
    }

    #[test]
    fn test_note_off_message() {
        assert_eq!(note_off_message(60, 1), [0x80, 60, 0]);
        assert_eq!(note_off_message(36, 10), [0x89, 36, 0]);
    }
}
