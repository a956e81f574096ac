// Standard MIDI File decoding into per-track note lists

use crate::midi::MidiError;
use crate::midi::event::NoteEvent;
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{HashMap, VecDeque};

/// Tempo assumed until the first Set Tempo event (120 BPM)
pub const DEFAULT_TEMPO_US_PER_QUARTER: u32 = 500_000;

/// One track of a decoded file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MidiTrack {
    /// Track Name meta event, if any
    pub name: Option<String>,
    /// Channel of the first channel message in the track
    pub channel: Option<u8>,
    /// Notes in the order their Note On was seen
    pub notes: Vec<NoteEvent>,
}

impl MidiTrack {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Human readable label, "Track 2 (Lead)" / "Track 0 (Empty)"
    pub fn label(&self, index: usize) -> String {
        match (&self.name, self.notes.is_empty()) {
            (_, true) => format!("Track {} (Empty)", index),
            (Some(name), false) if !name.trim().is_empty() => {
                format!("Track {} ({})", index, name.trim())
            }
            _ => format!("Track {}", index),
        }
    }
}

/// A decoded MIDI file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MidiFile {
    pub tracks: Vec<MidiTrack>,
    /// End of the last note, in seconds
    pub duration: f64,
}

impl MidiFile {
    /// Index of the first track that has at least one note
    pub fn first_non_empty_track(&self) -> Option<usize> {
        self.tracks.iter().position(|t| !t.is_empty())
    }

    pub fn track(&self, index: usize) -> Option<&MidiTrack> {
        self.tracks.get(index)
    }

    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }
}

/// Converts absolute ticks to seconds, honoring every tempo change
struct TickClock {
    /// (tick, seconds at tick, microseconds per quarter from tick on)
    segments: Vec<(u64, f64, u32)>,
    ticks_per_quarter: f64,
    /// Set for SMPTE timecode files, where tempo is irrelevant
    ticks_per_second: Option<f64>,
}

impl TickClock {
    fn new(timing: Timing, mut tempo_changes: Vec<(u64, u32)>) -> Self {
        let (ticks_per_quarter, ticks_per_second) = match timing {
            Timing::Metrical(tpq) => (tpq.as_int().max(1) as f64, None),
            Timing::Timecode(fps, subframes) => {
                (1.0, Some((fps.as_f32() as f64) * (subframes.max(1) as f64)))
            }
        };

        tempo_changes.sort_by_key(|(tick, _)| *tick);

        let mut segments = vec![(0_u64, 0.0_f64, DEFAULT_TEMPO_US_PER_QUARTER)];
        for (tick, tempo) in tempo_changes {
            let Some(&(last_tick, last_seconds, last_tempo)) = segments.last() else {
                continue;
            };
            let seconds = last_seconds
                + Self::span_seconds(tick - last_tick, last_tempo, ticks_per_quarter);

            if tick == last_tick {
                // Later events at the same tick win
                segments.pop();
            }
            segments.push((tick, seconds, tempo));
        }

        Self {
            segments,
            ticks_per_quarter,
            ticks_per_second,
        }
    }

    fn span_seconds(ticks: u64, us_per_quarter: u32, ticks_per_quarter: f64) -> f64 {
        ticks as f64 / ticks_per_quarter * us_per_quarter as f64 / 1_000_000.0
    }

    fn seconds(&self, tick: u64) -> f64 {
        if let Some(tps) = self.ticks_per_second {
            return tick as f64 / tps;
        }

        let index = self
            .segments
            .partition_point(|(start, _, _)| *start <= tick)
            .saturating_sub(1);
        let (start, seconds, tempo) = self.segments[index];

        seconds + Self::span_seconds(tick - start, tempo, self.ticks_per_quarter)
    }
}

/// Decode a Standard MIDI File.
///
/// Note On with velocity 0 counts as Note Off. Repeated Note On events for the
/// same channel and key are closed first-in first-out; notes still sounding
/// when their track ends are closed at the last event of that track.
pub fn parse_midi(bytes: &[u8]) -> Result<MidiFile, MidiError> {
    let smf = Smf::parse(bytes).map_err(|e| MidiError::Malformed(e.to_string()))?;

    // Tempo events apply file-wide, whatever track carries them
    let mut tempo_changes = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0_u64;
        for event in track {
            tick += event.delta.as_int() as u64;
            if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
                tempo_changes.push((tick, tempo.as_int()));
            }
        }
    }
    let clock = TickClock::new(smf.header.timing, tempo_changes);

    let mut tracks = Vec::with_capacity(smf.tracks.len());
    let mut duration = 0.0_f64;

    for track in &smf.tracks {
        let mut decoded = MidiTrack::default();
        // (canal, note) -> (index du Note On, tick de début) des notes en cours
        let mut sounding: HashMap<(u8, u8), VecDeque<(usize, u64)>> = HashMap::new();
        let mut closed: Vec<(usize, u8, u64, u64)> = Vec::new();
        let mut note_ons = 0_usize;
        let mut tick = 0_u64;

        for event in track {
            tick += event.delta.as_int() as u64;

            match event.kind {
                TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
                    if decoded.name.is_none() {
                        decoded.name = Some(String::from_utf8_lossy(name).into_owned());
                    }
                }
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    decoded.channel.get_or_insert(channel);

                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            sounding
                                .entry((channel, key.as_int()))
                                .or_default()
                                .push_back((note_ons, tick));
                            note_ons += 1;
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            let started = sounding
                                .get_mut(&(channel, key.as_int()))
                                .and_then(|queue| queue.pop_front());
                            if let Some((index, start)) = started {
                                closed.push((index, key.as_int(), start, tick));
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        let end_tick = tick;
        closed.extend(sounding.into_iter().flat_map(|((_, key), starts)| {
            starts
                .into_iter()
                .map(move |(index, start)| (index, key, start, end_tick))
        }));
        closed.sort_by_key(|(index, ..)| *index);

        decoded.notes = closed
            .into_iter()
            .map(|(_, pitch, start, end)| {
                let start_time = clock.seconds(start);
                NoteEvent::new(pitch, start_time, clock.seconds(end) - start_time)
            })
            .collect();

        for note in &decoded.notes {
            duration = duration.max(note.end_time());
        }

        tracks.push(decoded);
    }

    tracing::debug!(
        tracks = tracks.len(),
        duration_secs = duration,
        "Decoded MIDI file"
    );

    Ok(MidiFile { tracks, duration })
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u4, u7, u15, u24, u28};
    use midly::{Format, Header, TrackEvent};

    fn event(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind,
        }
    }

    fn note_on(delta: u32, key: u8, vel: u8) -> TrackEvent<'static> {
        event(
            delta,
            TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(vel),
                },
            },
        )
    }

    fn note_off(delta: u32, key: u8) -> TrackEvent<'static> {
        event(
            delta,
            TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOff {
                    key: u7::new(key),
                    vel: u7::new(0),
                },
            },
        )
    }

    fn end() -> TrackEvent<'static> {
        event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack))
    }

    fn write(tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(480)),
        ));
        smf.tracks = tracks;

        let mut bytes = Vec::new();
        smf.write_std(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_default_tempo() {
        // 480 ticks = one quarter = 0.5 s at 120 BPM
        let bytes = write(vec![vec![
            note_on(0, 69, 100),
            note_off(480, 69),
            note_on(480, 72, 100),
            note_off(240, 72),
            end(),
        ]]);
        let file = parse_midi(&bytes).unwrap();

        assert_eq!(file.tracks.len(), 1);
        assert_eq!(
            file.tracks[0].notes,
            vec![NoteEvent::new(69, 0.0, 0.5), NoteEvent::new(72, 1.0, 0.25)]
        );
        assert_eq!(file.duration, 1.25);
    }

    #[test]
    fn test_tempo_track_applies_to_other_tracks() {
        let conductor = vec![
            event(0, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(1_000_000)))),
            event(960, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(250_000)))),
            end(),
        ];
        let melody = vec![
            event(0, TrackEventKind::Meta(MetaMessage::TrackName(b"Lead"))),
            note_on(0, 60, 90),
            note_off(480, 60),
            note_on(480, 62, 90),
            note_off(480, 62),
            end(),
        ];
        let file = parse_midi(&write(vec![conductor, melody])).unwrap();

        assert!(file.tracks[0].is_empty());
        assert_eq!(file.first_non_empty_track(), Some(1));

        let lead = &file.tracks[1];
        assert_eq!(lead.name.as_deref(), Some("Lead"));
        assert_eq!(lead.channel, Some(0));
        // 60 BPM for the first two quarters, 240 BPM afterwards
        assert_eq!(lead.notes[0], NoteEvent::new(60, 0.0, 1.0));
        assert_eq!(lead.notes[1], NoteEvent::new(62, 2.0, 0.25));
    }

    #[test]
    fn test_velocity_zero_is_note_off() {
        let bytes = write(vec![vec![note_on(0, 64, 80), note_on(960, 64, 0), end()]]);
        let file = parse_midi(&bytes).unwrap();

        assert_eq!(file.tracks[0].notes, vec![NoteEvent::new(64, 0.0, 1.0)]);
    }

    #[test]
    fn test_dangling_note_closed_at_track_end() {
        let bytes = write(vec![vec![
            note_on(0, 64, 80),
            event(480, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ]]);
        let file = parse_midi(&bytes).unwrap();

        assert_eq!(file.tracks[0].notes, vec![NoteEvent::new(64, 0.0, 0.5)]);
    }

    #[test]
    fn test_chord_keeps_strike_order() {
        // C-E-G struck together, released in reverse
        let bytes = write(vec![vec![
            note_on(0, 60, 90),
            note_on(0, 64, 90),
            note_on(0, 67, 90),
            note_off(480, 67),
            note_off(0, 64),
            note_off(0, 60),
            end(),
        ]]);
        let file = parse_midi(&bytes).unwrap();

        let pitches: Vec<u8> = file.tracks[0].notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60, 64, 67]);

        let sequence = crate::tone::build_sequence(&file.tracks[0].notes);
        let pairs: Vec<(u32, u32)> = sequence
            .iter()
            .map(|p| (p.frequency_hz, p.duration_ms))
            .collect();
        assert_eq!(pairs, vec![(261, 500), (329, 500), (391, 500)]);
    }

    #[test]
    fn test_dangling_notes_interleave_by_strike_order() {
        let bytes = write(vec![vec![
            note_on(0, 48, 80),
            note_on(240, 72, 80),
            note_off(240, 72),
            event(480, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ]]);
        let file = parse_midi(&bytes).unwrap();

        assert_eq!(
            file.tracks[0].notes,
            vec![NoteEvent::new(48, 0.0, 1.0), NoteEvent::new(72, 0.25, 0.25)]
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        let result = parse_midi(b"definitely not a midi file");
        assert!(matches!(result, Err(MidiError::Malformed(_))));
    }

    #[test]
    fn test_track_labels() {
        let mut track = MidiTrack::default();
        assert_eq!(track.label(0), "Track 0 (Empty)");

        track.notes.push(NoteEvent::new(60, 0.0, 1.0));
        assert_eq!(track.label(3), "Track 3");

        track.name = Some("Bass".to_string());
        assert_eq!(track.label(3), "Track 3 (Bass)");
    }
}
