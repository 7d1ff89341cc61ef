use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::scale::{note_name, PITCH_CLASS_NAMES};

// ─── Analysis output ────────────────────────────────────────────────────────

/// Major or minor, as reported by the key estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyMode {
    Major,
    Minor,
}

/// The musical key currently inferred by the analysis engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectedKey {
    Unknown,
    Known { pitch_class: u8, mode: KeyMode },
}

impl DetectedKey {
    /// Build from the engine's raw encoding, where `-1` (or anything outside
    /// 0..=11) means "no key yet".
    pub fn from_raw(pitch_class: i32, mode: KeyMode) -> Self {
        if (0..12).contains(&pitch_class) {
            DetectedKey::Known {
                pitch_class: pitch_class as u8,
                mode,
            }
        } else {
            DetectedKey::Unknown
        }
    }

    pub fn pitch_class(&self) -> Option<u8> {
        match self {
            DetectedKey::Known { pitch_class, .. } => Some(*pitch_class),
            DetectedKey::Unknown => None,
        }
    }
}

impl Default for DetectedKey {
    fn default() -> Self {
        DetectedKey::Unknown
    }
}

impl fmt::Display for DetectedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DetectedKey::Unknown => "--".to_string(),
            DetectedKey::Known { pitch_class, mode } => {
                let name = PITCH_CLASS_NAMES[*pitch_class as usize % 12];
                match mode {
                    KeyMode::Major => format!("{} major", name),
                    KeyMode::Minor => format!("{} minor", name),
                }
            }
        };
        f.pad(&text)
    }
}

/// Result of analysing one block of audio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Smoothed fundamental in Hz. 0.0 when unvoiced or undetected.
    pub frequency_hz: f32,
    /// Unsmoothed detector output, for diagnostics.
    pub raw_frequency_hz: f32,
    /// Fractional MIDI note number (69.0 = A4).
    pub midi_note: f32,
    /// Deviation from the nearest equal-tempered note, in cents.
    pub pitch_error_cents: f32,
    /// 0.0 (erratic) to 1.0 (steady tone).
    pub stability: f32,
    pub rms_amplitude: f32,
    pub key: DetectedKey,
}

impl AnalysisResult {
    pub fn silent(rms_amplitude: f32, key: DetectedKey) -> Self {
        Self {
            frequency_hz: 0.0,
            raw_frequency_hz: 0.0,
            midi_note: 0.0,
            pitch_error_cents: 0.0,
            stability: 0.0,
            rms_amplitude,
            key,
        }
    }

    pub fn is_voiced(&self) -> bool {
        self.frequency_hz > 0.0
    }
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_voiced() {
            write!(
                f,
                "{:>7.1} Hz  {:<4} {:+4.0}¢  rms={:.3}  key={}",
                self.frequency_hz,
                note_name(self.midi_note),
                self.pitch_error_cents,
                self.rms_amplitude,
                self.key,
            )
        } else {
            write!(f, "    --- Hz  ---        rms={:.3}  key={}", self.rms_amplitude, self.key)
        }
    }
}

// ─── History ────────────────────────────────────────────────────────────────

/// One entry in the pitch history, one per processed block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// MIDI pitch; 0.0 marks silence and breaks the drawn trace.
    pub pitch: f32,
    /// Whether the pitch was diatonic to the key detected at capture time.
    pub in_key: bool,
    pub error_cents: f32,
}

impl HistoryPoint {
    pub fn gap() -> Self {
        Self {
            pitch: 0.0,
            in_key: false,
            error_cents: 0.0,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.pitch <= 0.0
    }
}

/// Visible pitch range in MIDI note numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportRange {
    pub min: f32,
    pub max: f32,
}

impl ViewportRange {
    pub fn span(&self) -> f32 {
        self.max - self.min
    }

    pub fn contains(&self, pitch: f32) -> bool {
        pitch >= self.min && pitch <= self.max
    }
}

impl Default for ViewportRange {
    /// C3 to C5.
    fn default() -> Self {
        Self {
            min: 48.0,
            max: 72.0,
        }
    }
}

// ─── Rendering ──────────────────────────────────────────────────────────────

/// How the pitch trace is colored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// In-key vs out-of-key against the detected key.
    #[default]
    Standard,
    /// Banded by absolute intonation error.
    Precision,
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            RenderMode::Standard => "standard",
            RenderMode::Precision => "precision",
        })
    }
}

impl RenderMode {
    pub fn toggled(self) -> Self {
        match self {
            RenderMode::Standard => RenderMode::Precision,
            RenderMode::Precision => RenderMode::Standard,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

// ─── Devices ────────────────────────────────────────────────────────────────

/// An audio input the user can pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock for a capture session.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Constants ──────────────────────────────────────────────────────────────

/// Samples per analysis block.
pub const DEFAULT_BLOCK_SIZE: usize = 2048;
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
