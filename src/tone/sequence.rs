// Tone sequences: monophonic (frequency, duration) pairs sent to the device

use crate::midi::event::NoteEvent;
use crate::tone::frequency::midi_note_to_frequency;
use serde::{Deserialize, Serialize};

/// One tone (or rest) of a sequence
///
/// `frequency_hz == 0` is a silence of `duration_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TonePair {
    pub frequency_hz: u32,
    pub duration_ms: u32,
}

impl TonePair {
    pub const fn new(frequency_hz: u32, duration_ms: u32) -> Self {
        Self {
            frequency_hz,
            duration_ms,
        }
    }

    pub const fn silence(duration_ms: u32) -> Self {
        Self::new(0, duration_ms)
    }

    pub fn is_silence(&self) -> bool {
        self.frequency_hz == 0
    }
}

impl From<(u32, u32)> for TonePair {
    fn from((frequency_hz, duration_ms): (u32, u32)) -> Self {
        Self::new(frequency_hz, duration_ms)
    }
}

/// Super Mario Bros. intro, played when no MIDI file has been loaded
pub const MARIO_THEME: [TonePair; 14] = [
    TonePair::new(659, 80), // E5
    TonePair::silence(40),
    TonePair::new(659, 80), // E5
    TonePair::silence(160),
    TonePair::new(659, 80), // E5
    TonePair::silence(160),
    TonePair::new(523, 80), // C5
    TonePair::silence(39),
    TonePair::new(659, 80), // E5
    TonePair::silence(160),
    TonePair::new(784, 80), // G5
    TonePair::silence(400),
    TonePair::new(392, 80), // G4
    TonePair::silence(400),
];

/// Ordered list of tone pairs; insertion order is playback order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToneSequence {
    pairs: Vec<TonePair>,
}

impl ToneSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mario_theme() -> Self {
        Self::from(MARIO_THEME.to_vec())
    }

    pub fn push(&mut self, pair: TonePair) {
        self.pairs.push(pair);
    }

    pub fn pairs(&self) -> &[TonePair] {
        &self.pairs
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TonePair> {
        self.pairs.iter()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Sum of all durations, in milliseconds
    pub fn total_duration_ms(&self) -> u64 {
        self.pairs.iter().map(|p| p.duration_ms as u64).sum()
    }

    /// Copy of the sequence without degenerate zero-length pairs
    pub fn without_zero_durations(&self) -> Self {
        self.pairs
            .iter()
            .copied()
            .filter(|p| p.duration_ms > 0)
            .collect()
    }

    /// Copy of the sequence with the rests removed
    pub fn without_silent_gaps(&self) -> Self {
        self.pairs
            .iter()
            .copied()
            .filter(|p| !p.is_silence())
            .collect()
    }
}

impl From<Vec<TonePair>> for ToneSequence {
    fn from(pairs: Vec<TonePair>) -> Self {
        Self { pairs }
    }
}

impl FromIterator<TonePair> for ToneSequence {
    fn from_iter<I: IntoIterator<Item = TonePair>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ToneSequence {
    type Item = &'a TonePair;
    type IntoIter = std::slice::Iter<'a, TonePair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

fn seconds_to_ms(seconds: f64) -> u32 {
    // Negative values saturate to 0
    (seconds * 1000.0).floor() as u32
}

/// Flatten the notes of one track into a monophonic tone sequence.
///
/// Notes are stably sorted by start time. Idle time between the end of the
/// previous note and the start of the next becomes a silence pair; overlapping
/// notes are played back to back (a negative gap emits nothing).
pub fn build_sequence(notes: &[NoteEvent]) -> ToneSequence {
    let mut ordered: Vec<&NoteEvent> = notes.iter().collect();
    ordered.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    let mut sequence = ToneSequence::new();
    let mut cursor = 0.0_f64;

    for note in ordered {
        if note.start_time > cursor {
            sequence.push(TonePair::silence(seconds_to_ms(note.start_time - cursor)));
        }

        sequence.push(TonePair::new(
            midi_note_to_frequency(note.pitch as i32),
            seconds_to_ms(note.duration),
        ));

        cursor = note.end_time();
    }

    sequence
}
