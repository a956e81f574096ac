//! Fuzzing tests for the MIDI file parser
//!
//! Random and damaged input must come back as `MidiError::Malformed` (or a
//! partial file), never as a panic.

use adbeeper::midi::{MidiError, parse_midi};
use adbeeper::tone::build_sequence;
use midly::num::{u4, u7, u15, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use rand::Rng;

fn valid_file() -> Vec<u8> {
    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(96)),
    ));

    let mut track = Vec::new();
    for (i, key) in [60u8, 64, 67, 72].iter().enumerate() {
        track.push(TrackEvent {
            delta: u28::new(if i == 0 { 0 } else { 24 }),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOn {
                    key: u7::new(*key),
                    vel: u7::new(100),
                },
            },
        });
        track.push(TrackEvent {
            delta: u28::new(48),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message: MidiMessage::NoteOff {
                    key: u7::new(*key),
                    vel: u7::new(0),
                },
            },
        });
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes).unwrap();
    bytes
}

/// Fuzz the parser with random byte sequences
#[test]
fn fuzz_midi_parser_random_bytes() {
    let mut rng = rand::thread_rng();

    for _ in 0..1000 {
        let length = rng.gen_range(0..=256);
        let random_bytes: Vec<u8> = (0..length).map(|_| rng.gen_range(0..=255)).collect();

        // Skip the odd input that happens to carry a chunk tag
        if random_bytes
            .windows(4)
            .any(|tag| tag == b"MThd" || tag == b"RIFF")
        {
            continue;
        }
        assert!(matches!(
            parse_midi(&random_bytes),
            Err(MidiError::Malformed(_))
        ));
    }
}

/// A valid header followed by random track data
#[test]
fn fuzz_midi_parser_random_tracks() {
    let mut rng = rand::thread_rng();
    let valid = valid_file();
    // MThd chunk: 4 byte tag, 4 byte length, 6 byte body
    let header = &valid[..14];

    for _ in 0..500 {
        let mut bytes = header.to_vec();
        bytes.extend_from_slice(b"MTrk");
        let body_len = rng.gen_range(0..64u32);
        bytes.extend_from_slice(&body_len.to_be_bytes());
        bytes.extend((0..body_len).map(|_| rng.gen_range(0..=255u8)));

        // Either outcome is fine, as long as the notes are usable
        if let Ok(file) = parse_midi(&bytes) {
            for track in &file.tracks {
                for note in &track.notes {
                    assert!(note.start_time >= 0.0);
                    assert!(note.duration >= 0.0);
                    assert!(note.pitch <= 127);
                }
                let _ = build_sequence(&track.notes);
            }
        }
    }
}

/// Truncated and bit-flipped copies of a valid file
#[test]
fn fuzz_midi_parser_damaged_file() {
    let mut rng = rand::thread_rng();
    let valid = valid_file();
    assert_eq!(parse_midi(&valid).unwrap().note_count(), 4);

    for cut in 0..valid.len() {
        let _ = parse_midi(&valid[..cut]);
    }

    for _ in 0..500 {
        let mut bytes = valid.clone();
        let flips = rng.gen_range(1..=4);
        for _ in 0..flips {
            let index = rng.gen_range(0..bytes.len());
            bytes[index] ^= 1 << rng.gen_range(0..8);
        }

        if let Ok(file) = parse_midi(&bytes) {
            assert!(file.duration >= 0.0);
            assert!(file.duration.is_finite());
        }
    }
}
