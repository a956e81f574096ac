// Note visualizer - piano roll geometry and a text renderer

use crate::midi::MidiFile;

/// Number of MIDI pitches mapped onto the vertical axis
const PITCH_RANGE: f32 = 128.0;

const NOTE_CELL: char = '-';
const HIGHLIGHT_CELL: char = '#';
const PLAYHEAD_CELL: char = '|';

/// Screen rectangle of one note
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub track: usize,
    pub pitch: u8,
    /// Note belongs to the selected track
    pub highlighted: bool,
}

/// Horizontal scale that fits the whole file into `width`
fn pixels_per_second(file: &MidiFile, width: f32) -> f32 {
    if file.duration > 0.0 {
        width / file.duration as f32
    } else {
        0.0
    }
}

/// Lays out every note of every track; time runs left to right, pitch bottom to top
pub fn layout_notes(
    file: &MidiFile,
    width: f32,
    height: f32,
    highlight: Option<usize>,
) -> Vec<NoteRect> {
    let pps = pixels_per_second(file, width);
    let note_height = height / PITCH_RANGE;

    file.tracks
        .iter()
        .enumerate()
        .flat_map(|(track_index, track)| {
            track.notes.iter().map(move |note| NoteRect {
                x: note.start_time as f32 * pps,
                y: height - note.pitch as f32 * height / PITCH_RANGE,
                width: note.duration as f32 * pps,
                height: note_height,
                track: track_index,
                pitch: note.pitch,
                highlighted: highlight == Some(track_index),
            })
        })
        .collect()
}

/// X coordinate of the playback cursor at `current_time` seconds
pub fn playhead_x(file: &MidiFile, width: f32, current_time: f64) -> f32 {
    current_time as f32 * pixels_per_second(file, width)
}

/// Text piano roll of `columns` x `rows` cells
///
/// Selected-track notes are drawn over the others; the playhead only
/// occupies empty cells.
pub fn render_ascii(
    file: &MidiFile,
    columns: usize,
    rows: usize,
    highlight: Option<usize>,
    current_time: Option<f64>,
) -> String {
    if columns == 0 || rows == 0 {
        return String::new();
    }

    let mut grid = vec![vec![' '; columns]; rows];
    let mut rects = layout_notes(file, columns as f32, rows as f32, highlight);
    // Highlighted notes last so they win shared cells
    rects.sort_by_key(|rect| rect.highlighted);

    for rect in &rects {
        let row = (rect.y.floor().max(0.0) as usize).min(rows - 1);
        let start = (rect.x.floor().max(0.0) as usize).min(columns - 1);
        let end = ((rect.x + rect.width).ceil() as usize).clamp(start + 1, columns);

        let cell = if rect.highlighted {
            HIGHLIGHT_CELL
        } else {
            NOTE_CELL
        };
        for column in &mut grid[row][start..end] {
            *column = cell;
        }
    }

    if let Some(time) = current_time {
        let x = playhead_x(file, columns as f32, time).floor();
        if x >= 0.0 && (x as usize) < columns {
            let column = x as usize;
            for row in &mut grid {
                if row[column] == ' ' {
                    row[column] = PLAYHEAD_CELL;
                }
            }
        }
    }

    grid.into_iter()
        .map(|row| row.into_iter().collect::<String>().trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{MidiTrack, NoteEvent};

    fn file() -> MidiFile {
        MidiFile {
            tracks: vec![
                MidiTrack {
                    name: Some("Lead".to_string()),
                    channel: Some(0),
                    notes: vec![NoteEvent::new(64, 0.0, 1.0), NoteEvent::new(96, 1.0, 1.0)],
                },
                MidiTrack {
                    name: Some("Bass".to_string()),
                    channel: Some(1),
                    notes: vec![NoteEvent::new(32, 2.0, 2.0)],
                },
            ],
            duration: 4.0,
        }
    }

    #[test]
    fn test_layout_geometry() {
        let rects = layout_notes(&file(), 400.0, 128.0, Some(1));
        assert_eq!(rects.len(), 3);

        // 100 px per second, one pixel per pitch
        let lead = rects[0];
        assert_eq!(lead.x, 0.0);
        assert_eq!(lead.width, 100.0);
        assert_eq!(lead.y, 64.0);
        assert_eq!(lead.height, 1.0);
        assert!(!lead.highlighted);

        let bass = rects[2];
        assert_eq!(bass.x, 200.0);
        assert_eq!(bass.width, 200.0);
        assert_eq!(bass.y, 96.0);
        assert_eq!(bass.track, 1);
        assert!(bass.highlighted);
    }

    #[test]
    fn test_playhead() {
        assert_eq!(playhead_x(&file(), 400.0, 1.5), 150.0);
        assert_eq!(playhead_x(&MidiFile::default(), 400.0, 1.5), 0.0);
    }

    #[test]
    fn test_empty_file_layout() {
        assert!(layout_notes(&MidiFile::default(), 100.0, 100.0, None).is_empty());
        assert_eq!(render_ascii(&MidiFile::default(), 0, 10, None, None), "");
    }

    #[test]
    fn test_render_ascii() {
        let text = render_ascii(&file(), 8, 4, Some(1), Some(1.0));
        let rows: Vec<&str> = text.split('\n').collect();
        assert_eq!(rows.len(), 4);

        // pitch 96 -> row 1, pitch 64 -> row 2, pitch 32 -> row 3
        assert_eq!(rows[0], "  |");
        assert_eq!(rows[1], "  --");
        assert_eq!(rows[2], "--|");
        assert_eq!(rows[3], "  | ####");
    }
}
