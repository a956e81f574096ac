// MIDI file intake controller - dropped files, track selection and demos

use crate::messaging::notification::{Notification, NotificationCategory, Notifier};
use crate::midi::{DemoLibrary, MidiError, MidiFile, parse_midi};
use crate::tone::{ToneSequence, build_sequence};
use std::sync::Arc;

/// Currently loaded file, selected track and the sequence built from it
///
/// Starts out with the Mario theme so there is always something to send.
pub struct MidiSelection {
    notifier: Arc<dyn Notifier>,
    file_name: Option<String>,
    file: Option<MidiFile>,
    selected_track: Option<usize>,
    sequence: ToneSequence,
}

impl MidiSelection {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            file_name: None,
            file: None,
            selected_track: None,
            sequence: ToneSequence::mario_theme(),
        }
    }

    pub fn sequence(&self) -> &ToneSequence {
        &self.sequence
    }

    pub fn file(&self) -> Option<&MidiFile> {
        self.file.as_ref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn selected_track(&self) -> Option<usize> {
        self.selected_track
    }

    /// Labels for a track picker, in track order
    pub fn track_labels(&self) -> Vec<String> {
        self.file
            .iter()
            .flat_map(|file| file.tracks.iter().enumerate())
            .map(|(index, track)| track.label(index))
            .collect()
    }

    /// Parses `bytes` and selects the first track with notes
    ///
    /// On a decode failure the previous file and sequence stay active.
    pub fn on_file_dropped(
        &mut self,
        name: &str,
        bytes: &[u8],
    ) -> Result<&ToneSequence, MidiError> {
        let file = match parse_midi(bytes) {
            Ok(file) => file,
            Err(err) => {
                self.notifier.notify(Notification::error(
                    NotificationCategory::Midi,
                    format!("Failed to load {}: {}", name, err),
                ));
                return Err(err);
            }
        };

        self.selected_track = file.first_non_empty_track();
        self.sequence = self
            .selected_track
            .and_then(|index| file.track(index))
            .map(|track| build_sequence(&track.notes))
            .unwrap_or_default();

        let notification = match self.selected_track {
            Some(index) => Notification::info(
                NotificationCategory::Midi,
                format!(
                    "Loaded {} ({} tracks, playing track {})",
                    name,
                    file.tracks.len(),
                    index
                ),
            ),
            None => Notification::warning(
                NotificationCategory::Midi,
                format!("{} contains no notes", name),
            ),
        };
        self.notifier.notify(notification);

        self.file_name = Some(name.to_string());
        self.file = Some(file);
        Ok(&self.sequence)
    }

    /// Rebuilds the sequence from another track of the loaded file
    pub fn select_track(&mut self, index: usize) -> Result<&ToneSequence, MidiError> {
        let file = self.file.as_ref().ok_or(MidiError::NoFileLoaded)?;
        let track = file.track(index).ok_or(MidiError::TrackOutOfRange {
            index,
            count: file.tracks.len(),
        })?;

        tracing::debug!(index, notes = track.notes.len(), "Track selected");
        self.sequence = build_sequence(&track.notes);
        self.selected_track = Some(index);
        Ok(&self.sequence)
    }

    /// Loads a demo file from `library` as if it had been dropped
    pub fn load_demo(
        &mut self,
        library: &DemoLibrary,
        name: &str,
    ) -> Result<&ToneSequence, MidiError> {
        let bytes = match library.load(name) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.notifier.notify(Notification::error(
                    NotificationCategory::Midi,
                    err.to_string(),
                ));
                return Err(err);
            }
        };

        self.on_file_dropped(name, &bytes)
    }
}
