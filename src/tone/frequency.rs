// MIDI note number -> tone frequency

/// Reference pitch (A4) in Hz
pub const A4_FREQUENCY_HZ: f64 = 440.0;

/// MIDI note number of A4
pub const A4_NOTE: i32 = 69;

/// Equal-tempered frequency of a MIDI note, in Hz.
///
/// Defined for every integer, not only the 0-127 MIDI range.
pub fn note_frequency_hz(note: i32) -> f64 {
    A4_FREQUENCY_HZ * 2.0_f64.powf((note - A4_NOTE) as f64 / 12.0)
}

/// Frequency of a MIDI note truncated toward zero, as sent to the device.
///
/// Values that do not fit a `u32` saturate.
pub fn midi_note_to_frequency(note: i32) -> u32 {
    note_frequency_hz(note).trunc() as u32
}
