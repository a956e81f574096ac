// Presentation adapters: file intake, visualizer and terminal

pub mod selection;
pub mod terminal;
pub mod visualizer;

pub use selection::MidiSelection;
pub use terminal::run_terminal;
pub use visualizer::{NoteRect, layout_notes, playhead_x, render_ascii};
