use std::io::Write;
use std::thread;
use std::time::Duration;

use stepline::{
    midi_note_name, MidiOutputDevice, Note, Pattern, Sequencer, SequencerError,
};

const DEFAULT_SECONDS: u64 = 8;

fn main() -> Result<(), SequencerError> {
    env_logger::init(); // RUST_LOG=debug for pattern and transport logging

    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.first().map(String::as_str) == Some("--list") {
        let ports = MidiOutputDevice::available_ports();
        if ports.is_empty() {
            println!("No MIDI ports available");
        }
        for (i, name) in ports.iter().enumerate() {
            println!("{}: {}", i, name);
        }
        return Ok(());
    }

    let port = args.first().and_then(|s| s.parse().ok()).unwrap_or(0);
    let seconds = args
        .get(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_SECONDS);

    let mut device = MidiOutputDevice::new();
    device.connect(port)?;

    let pattern = demo_pattern();
    for note in &pattern.notes {
        let active = note.steps.iter().filter(|s| s.active).count();
        log::info!("{} ({}) plays {} steps", note.id, midi_note_name(note.pitch), active);
    }

    let mut sequencer = Sequencer::new(pattern, device)?;
    sequencer.set_step_observer(|step| {
        print!("\rstep {:2}", step + 1);
        let _ = std::io::stdout().flush();
    });
    sequencer.set_error_observer(|err| eprintln!("\nMIDI error: {}", err));

    sequencer.start()?;
    thread::sleep(Duration::from_secs(seconds));
    sequencer.stop();
    println!();

    Ok(())
}

/// The default pattern with middle C on every beat and an off-beat stab
fn demo_pattern() -> Pattern {
    let pattern = Pattern::default().with_note_updated("n1", |n| {
        for step in [0, 4, 8, 12] {
            n.set(step, true);
        }
    });
    let length = pattern.length;

    pattern
        .with_note(Note::new("n2", 64, 80, 2, length).with_active_steps(&[2, 6, 10, 14]))
        .with_note(Note::new("n3", 67, 80, 2, length).with_active_steps(&[2, 6, 10, 14]))
}
