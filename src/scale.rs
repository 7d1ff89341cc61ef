//! Pitch-class tables: note names, black keys, diatonic membership and
//! intonation bands.
//!
//! The scale masks and precision thresholds are fixed. Arbitrary scales or
//! temperaments would slot in here.

use crate::types::{DetectedKey, KeyMode};

pub const PITCH_CLASS_NAMES: [&str; 12] =
    ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Pitch classes that fall on black piano keys.
pub const BLACK_KEYS: [u8; 5] = [1, 3, 6, 8, 10];

/// Semitone offsets from the tonic, natural major / natural minor.
pub const MAJOR_SCALE: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];
pub const MINOR_SCALE: [u8; 7] = [0, 2, 3, 5, 7, 8, 10];

/// |error| below this is "tight".
pub const TIGHT_CENTS: f32 = 10.0;
/// |error| below this (and not tight) is "acceptable"; anything else is poor.
pub const ACCEPTABLE_CENTS: f32 = 25.0;

/// Three-tier intonation classification used by precision mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntonationBand {
    Tight,
    Acceptable,
    Poor,
}

impl IntonationBand {
    pub fn classify(error_cents: f32) -> Self {
        let e = error_cents.abs();
        if e < TIGHT_CENTS {
            IntonationBand::Tight
        } else if e < ACCEPTABLE_CENTS {
            IntonationBand::Acceptable
        } else {
            IntonationBand::Poor
        }
    }
}

/// Pitch class (0..12) of a fractional MIDI note, rounded to the nearest note.
pub fn pitch_class(midi: f32) -> u8 {
    (midi.round() as i32).rem_euclid(12) as u8
}

pub fn is_black_key(pc: u8) -> bool {
    BLACK_KEYS.contains(&(pc % 12))
}

/// Whether `midi` is a scale tone of `key`. With no key detected every note
/// counts as in key, so nothing is flagged before the estimator has settled.
pub fn is_diatonic(midi: f32, key: DetectedKey) -> bool {
    match key {
        DetectedKey::Unknown => true,
        DetectedKey::Known { pitch_class: tonic, mode } => {
            let degree = (pitch_class(midi) + 12 - tonic % 12) % 12;
            let scale = match mode {
                KeyMode::Major => &MAJOR_SCALE,
                KeyMode::Minor => &MINOR_SCALE,
            };
            scale.contains(&degree)
        }
    }
}

/// Scientific pitch name, e.g. 60.2 → "C4".
pub fn note_name(midi: f32) -> String {
    let n = midi.round() as i32;
    let pc = n.rem_euclid(12) as usize;
    let octave = n.div_euclid(12) - 1;
    format!("{}{}", PITCH_CLASS_NAMES[pc], octave)
}
