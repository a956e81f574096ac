// Phases de la session device et vue observable

use std::fmt;

/// Lifecycle phase of a device session
///
/// A link is bound exactly when the phase is `Connected` or `Sending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Sending,
}

impl SessionPhase {
    pub fn has_link(self) -> bool {
        matches!(self, SessionPhase::Connected | SessionPhase::Sending)
    }

    /// "Select Device" is only useful from a clean state
    pub fn can_connect(self) -> bool {
        self == SessionPhase::Disconnected
    }

    /// "Send Sequence" button state
    pub fn can_send(self) -> bool {
        self == SessionPhase::Connected
    }

    /// "Open Terminal" button state
    pub fn terminal_available(self) -> bool {
        self.has_link()
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Disconnected => write!(f, "Disconnected"),
            SessionPhase::Connecting => write!(f, "Connecting"),
            SessionPhase::Connected => write!(f, "Connected"),
            SessionPhase::Sending => write!(f, "Sending"),
        }
    }
}

/// Snapshot published to the front end on every change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    pub phase: SessionPhase,
    /// Serial of the bound device
    pub serial: Option<String>,
    /// Output of the last command sent to the device
    pub last_output: String,
    /// Estimated playback progress of the current send
    pub elapsed_ms: u64,
    /// Duration of the current (or last) sequence
    pub total_ms: u64,
}

impl SessionView {
    /// Playback progress in [0, 1]
    pub fn progress(&self) -> f32 {
        if self.total_ms == 0 {
            return 0.0;
        }
        (self.elapsed_ms as f64 / self.total_ms as f64).min(1.0) as f32
    }

    /// Elapsed playback time in seconds, as consumed by the visualizer
    pub fn current_time(&self) -> f64 {
        self.elapsed_ms as f64 / 1000.0
    }
}
