// Note events extracted from a MIDI track

use serde::{Deserialize, Serialize};

/// A single note of a track, in absolute time
///
/// Produced by the MIDI parser; consumed by the sequence builder and the
/// visualizer. Times are in seconds from the start of the file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// MIDI note number (0-127, where 60 = C4)
    pub pitch: u8,
    /// Start time in seconds
    pub start_time: f64,
    /// Duration in seconds
    pub duration: f64,
}

impl NoteEvent {
    pub fn new(pitch: u8, start_time: f64, duration: f64) -> Self {
        Self {
            pitch,
            start_time,
            duration,
        }
    }

    /// End of the note in seconds
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Get the note name (e.g., "C4", "A#5")
    pub fn note_name(&self) -> String {
        const NOTE_NAMES: [&str; 12] = [
            "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
        ];

        let octave = (self.pitch / 12) as i32 - 1;
        let note_index = (self.pitch % 12) as usize;

        format!("{}{}", NOTE_NAMES[note_index], octave)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_time() {
        let note = NoteEvent::new(60, 1.5, 0.25);
        assert_eq!(note.end_time(), 1.75);
    }

    #[test]
    fn test_note_names() {
        assert_eq!(NoteEvent::new(60, 0.0, 1.0).note_name(), "C4");
        assert_eq!(NoteEvent::new(69, 0.0, 1.0).note_name(), "A4");
        assert_eq!(NoteEvent::new(70, 0.0, 1.0).note_name(), "A#4");
        assert_eq!(NoteEvent::new(0, 0.0, 1.0).note_name(), "C-1");
    }
}
