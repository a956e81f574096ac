// MIDI file intake

pub mod event;
pub mod library;
pub mod parser;

pub use event::NoteEvent;
pub use library::DemoLibrary;
pub use parser::{MidiFile, MidiTrack, parse_midi};

/// MIDI intake error types
#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    #[error("Malformed MIDI file: {0}")]
    Malformed(String),

    #[error("Track {index} does not exist (file has {count} tracks)")]
    TrackOutOfRange { index: usize, count: usize },

    #[error("No MIDI file loaded")]
    NoFileLoaded,

    #[error("Demo file not found: {0}")]
    DemoNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
