use crate::scale::pitch_class;
use crate::types::{DetectedKey, KeyMode};

/// Krumhansl–Kessler key profiles, index 0 = tonic.
const MAJOR_PROFILE: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Per-observation decay; ~0.99 forgets a phrase over a few seconds of blocks.
const DECAY: f32 = 0.99;
/// Histogram mass needed before a key is reported.
const MIN_EVIDENCE: f32 = 8.0;
/// Distinct pitch classes needed before a key is reported.
const MIN_CLASSES: usize = 3;

/// Running key estimate from the pitch classes of voiced blocks.
///
/// Keeps a decaying pitch-class histogram and picks the root/mode whose
/// rotated profile correlates best with it.
pub struct KeyEstimator {
    histogram: [f32; 12],
    current: DetectedKey,
}

impl KeyEstimator {
    pub fn new() -> Self {
        Self {
            histogram: [0.0; 12],
            current: DetectedKey::Unknown,
        }
    }

    pub fn current(&self) -> DetectedKey {
        self.current
    }

    pub fn reset(&mut self) {
        self.histogram = [0.0; 12];
        self.current = DetectedKey::Unknown;
    }

    /// Fold one voiced note into the histogram and re-estimate.
    pub fn observe(&mut self, midi: f32, weight: f32) -> DetectedKey {
        for h in self.histogram.iter_mut() {
            *h *= DECAY;
        }
        self.histogram[pitch_class(midi) as usize] += weight.max(0.0);
        self.current = self.estimate();
        self.current
    }

    fn estimate(&self) -> DetectedKey {
        let total: f32 = self.histogram.iter().sum();
        let classes = self.histogram.iter().filter(|&&h| h > 1e-3).count();
        if total < MIN_EVIDENCE || classes < MIN_CLASSES {
            return DetectedKey::Unknown;
        }

        let mut best = (f32::MIN, DetectedKey::Unknown);
        for root in 0..12u8 {
            for (mode, profile) in [(KeyMode::Major, &MAJOR_PROFILE), (KeyMode::Minor, &MINOR_PROFILE)] {
                let r = correlation(&self.histogram, profile, root as usize);
                if r > best.0 {
                    best = (r, DetectedKey::Known { pitch_class: root, mode });
                }
            }
        }
        best.1
    }
}

impl Default for KeyEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Pearson correlation between the histogram and a profile rotated to `root`.
fn correlation(hist: &[f32; 12], profile: &[f32; 12], root: usize) -> f32 {
    let rotated: Vec<f32> = (0..12).map(|pc| profile[(pc + 12 - root) % 12]).collect();
    let mean_h = hist.iter().sum::<f32>() / 12.0;
    let mean_p = rotated.iter().sum::<f32>() / 12.0;
    let mut num = 0.0;
    let mut den_h = 0.0;
    let mut den_p = 0.0;
    for (h, p) in hist.iter().zip(&rotated) {
        let dh = h - mean_h;
        let dp = p - mean_p;
        num += dh * dp;
        den_h += dh * dh;
        den_p += dp * dp;
    }
    let den = (den_h * den_p).sqrt();
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}
