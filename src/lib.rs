// adbeeper - Library exports for the CLI, tests and benchmarks

pub mod config;
pub mod connection;
pub mod messaging;
pub mod midi;
pub mod tone;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::{AppConfig, ConfigError};
pub use connection::{
    AdbCliProvider, DeviceLink, DeviceLinkProvider, DeviceSession, LinkError, SessionError,
    SessionPhase, SessionView,
};
pub use messaging::{ChannelNotifier, Notification, NotificationFeed, Notifier};
pub use midi::{MidiError, MidiFile, NoteEvent, parse_midi};
pub use tone::{
    CommandEncoder, CommandEncoding, MARIO_THEME, TonePair, ToneSequence, build_sequence,
};
pub use ui::MidiSelection;
