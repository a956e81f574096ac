// Tone generation: MIDI notes -> tone sequences -> device commands

pub mod encoder;
pub mod frequency;
pub mod sequence;

pub use encoder::{CommandEncoder, CommandEncoding};
pub use frequency::{midi_note_to_frequency, note_frequency_hz};
pub use sequence::{MARIO_THEME, TonePair, ToneSequence, build_sequence};
