// Tone sequence -> device command encodings

use crate::tone::sequence::ToneSequence;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

pub const DEFAULT_MODE_TOKEN: &str = "v";
pub const DEFAULT_BROADCAST_ACTION: &str = "io.hammerhead.action.CMD_LINE_AUDIO_ALERT";
pub const DEFAULT_BROADCAST_EXTRA: &str = "tones";

/// Wire format understood by the device's command interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CommandEncoding {
    /// Newline-delimited script fed to the interactive tone app
    LineProtocol,
    /// Single `am broadcast` invocation carrying the whole sequence
    #[default]
    BroadcastIntent,
}

impl fmt::Display for CommandEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandEncoding::LineProtocol => write!(f, "line"),
            CommandEncoding::BroadcastIntent => write!(f, "broadcast"),
        }
    }
}

impl FromStr for CommandEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "line" | "line-protocol" => Ok(CommandEncoding::LineProtocol),
            "broadcast" | "broadcast-intent" => Ok(CommandEncoding::BroadcastIntent),
            other => Err(format!(
                "unknown encoding '{}' (expected 'line' or 'broadcast')",
                other
            )),
        }
    }
}

/// Builds device commands from tone sequences
///
/// Encoders never reorder, merge or drop pairs, zero-length ones included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEncoder {
    mode_token: String,
    broadcast_action: String,
    broadcast_extra: String,
}

impl CommandEncoder {
    pub fn new(
        mode_token: impl Into<String>,
        broadcast_action: impl Into<String>,
        broadcast_extra: impl Into<String>,
    ) -> Self {
        Self {
            mode_token: mode_token.into(),
            broadcast_action: broadcast_action.into(),
            broadcast_extra: broadcast_extra.into(),
        }
    }

    pub fn encode(&self, sequence: &ToneSequence, encoding: CommandEncoding) -> String {
        match encoding {
            CommandEncoding::LineProtocol => self.encode_line_protocol(sequence),
            CommandEncoding::BroadcastIntent => self.encode_broadcast(sequence),
        }
    }

    /// `v` then one `b`/frequency/duration triple per pair, one token per line
    pub fn encode_line_protocol(&self, sequence: &ToneSequence) -> String {
        let mut script = String::with_capacity(self.mode_token.len() + 1 + sequence.len() * 12);
        script.push_str(&self.mode_token);
        script.push('\n');

        for pair in sequence {
            // Writing into a String cannot fail
            let _ = write!(script, "b\n{}\n{}\n", pair.frequency_hz, pair.duration_ms);
        }

        script
    }

    /// `am broadcast` with an int-array extra of alternating duration,frequency
    pub fn encode_broadcast(&self, sequence: &ToneSequence) -> String {
        let tones = sequence
            .iter()
            .flat_map(|pair| [pair.duration_ms, pair.frequency_hz])
            .map(|value| value.to_string())
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "am broadcast -a {} --eia {} {}",
            self.broadcast_action, self.broadcast_extra, tones
        )
    }
}

impl Default for CommandEncoder {
    fn default() -> Self {
        Self::new(
            DEFAULT_MODE_TOKEN,
            DEFAULT_BROADCAST_ACTION,
            DEFAULT_BROADCAST_EXTRA,
        )
    }
}
