use crate::dsp::{autocorrelation_fundamental, compute_rms, hz_to_midi, remove_dc_offset};
use crate::key::KeyEstimator;
use crate::types::AnalysisResult;
use log::debug;
use std::sync::Arc;

/// A pitch analyser fed one fixed-size block at a time.
///
/// Implementations may keep state across calls (smoothing, key evidence),
/// but the pipeline treats each call as a plain function from block to
/// result. `block` is always exactly the block size the engine was built for.
pub trait PitchEngine: Send {
    fn process(&mut self, block: &mut [f32]) -> AnalysisResult;

    /// Forget state carried over from an earlier session. Called when the
    /// engine is reused for a new one.
    fn reset(&mut self) {}
}

/// Builds an engine for a given `(sample_rate, block_size)`.
pub type EngineFactory = Arc<dyn Fn(u32, usize) -> Box<dyn PitchEngine> + Send + Sync>;

/// Blocks quieter than this are treated as silence.
pub const NOISE_THRESHOLD: f32 = 0.005;
/// Search range for the autocorrelation.
const SEARCH_MIN_HZ: f32 = 50.0;
const SEARCH_MAX_HZ: f32 = 1000.0;
/// Raw detections outside (50, 1400) Hz are discarded.
const VALID_MIN_HZ: f32 = 50.0;
const VALID_MAX_HZ: f32 = 1400.0;
/// EWMA weight of the newest detection.
const SMOOTHING: f32 = 0.4;
/// A jump bigger than this re-seeds the filter instead of gliding.
const SNAP_HZ: f32 = 50.0;
/// Raw/smoothed deviation at which stability reaches zero.
const STABILITY_SPAN_HZ: f32 = 5.0;

/// Autocorrelation pitch tracker with EWMA smoothing and key estimation.
pub struct AutocorrelationEngine {
    sample_rate: u32,
    block_size: usize,
    smoothed_hz: f32,
    keys: KeyEstimator,
}

impl AutocorrelationEngine {
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        debug!("Autocorrelation engine: {} Hz, {} samples/block", sample_rate, block_size);
        Self {
            sample_rate,
            block_size,
            smoothed_hz: 0.0,
            keys: KeyEstimator::new(),
        }
    }

    pub fn factory() -> EngineFactory {
        Arc::new(|sr, block| Box::new(AutocorrelationEngine::new(sr, block)) as Box<dyn PitchEngine>)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    fn smooth(&mut self, raw: f32) -> f32 {
        if self.smoothed_hz == 0.0 || (raw - self.smoothed_hz).abs() > SNAP_HZ {
            // Coming out of silence or an octave leap: no glide.
            self.smoothed_hz = raw;
        } else {
            self.smoothed_hz = SMOOTHING * raw + (1.0 - SMOOTHING) * self.smoothed_hz;
        }
        self.smoothed_hz
    }
}

impl PitchEngine for AutocorrelationEngine {
    fn process(&mut self, block: &mut [f32]) -> AnalysisResult {
        remove_dc_offset(block);
        let rms = compute_rms(block);

        if rms <= NOISE_THRESHOLD {
            // Silence: the next phrase starts clean.
            self.smoothed_hz = 0.0;
            return AnalysisResult::silent(rms, self.keys.current());
        }

        let raw = autocorrelation_fundamental(block, self.sample_rate, SEARCH_MIN_HZ, SEARCH_MAX_HZ)
            .unwrap_or(0.0);
        if raw <= VALID_MIN_HZ || raw >= VALID_MAX_HZ {
            // Keep the filter state: a single dropout shouldn't reset the glide.
            let mut res = AnalysisResult::silent(rms, self.keys.current());
            res.raw_frequency_hz = raw;
            return res;
        }

        let frequency = self.smooth(raw);
        let stability = (1.0 - (raw - frequency).abs() / STABILITY_SPAN_HZ).clamp(0.0, 1.0);
        let midi = hz_to_midi(frequency);
        let error = (midi - midi.round()) * 100.0;
        let key = self.keys.observe(midi, 1.0);

        AnalysisResult {
            frequency_hz: frequency,
            raw_frequency_hz: raw,
            midi_note: midi,
            pitch_error_cents: error,
            stability,
            rms_amplitude: rms,
            key,
        }
    }

    fn reset(&mut self) {
        self.smoothed_hz = 0.0;
        self.keys.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::test_helpers::sine_wave;
    use crate::types::DetectedKey;

    #[test]
    fn test_detects_a4() {
        let mut engine = AutocorrelationEngine::new(44100, 2048);
        let mut block = sine_wave(440.0, 0.5, 44100, 2048);
        let res = engine.process(&mut block);
        assert!(res.is_voiced());
        assert!((res.frequency_hz - 440.0).abs() < 5.0, "f={}", res.frequency_hz);
        assert!((res.midi_note - 69.0).abs() < 0.2);
        assert!(res.pitch_error_cents.abs() < 20.0);
        assert!(res.rms_amplitude > 0.3);
    }

    #[test]
    fn test_silence_is_unvoiced() {
        let mut engine = AutocorrelationEngine::new(44100, 2048);
        let mut block = vec![0.001f32; 2048];
        let res = engine.process(&mut block);
        assert!(!res.is_voiced());
        assert_eq!(res.midi_note, 0.0);
        assert_eq!(res.key, DetectedKey::Unknown);
    }

    #[test]
    fn test_smoothing_glides_and_snaps() {
        let mut engine = AutocorrelationEngine::new(44100, 2048);
        assert_eq!(engine.smooth(220.0), 220.0);
        // Small move: glides 40% of the way
        let f = engine.smooth(230.0);
        assert!((f - 224.0).abs() < 1e-3, "f={}", f);
        // Large jump: snaps
        assert_eq!(engine.smooth(440.0), 440.0);
    }

    #[test]
    fn test_reset_forgets_key_and_glide() {
        let mut engine = AutocorrelationEngine::new(44100, 2048);
        for hz in [261.63, 329.63, 392.0] {
            for _ in 0..4 {
                let mut block = sine_wave(hz, 0.5, 44100, 2048);
                engine.process(&mut block);
            }
        }
        let mut quiet = vec![0.0f32; 2048];
        assert_ne!(engine.process(&mut quiet).key, DetectedKey::Unknown);

        engine.smooth(300.0);
        engine.reset();
        assert_eq!(engine.process(&mut quiet).key, DetectedKey::Unknown);
        assert_eq!(engine.smoothed_hz, 0.0);
    }

    #[test]
    fn test_silence_resets_smoothing() {
        let mut engine = AutocorrelationEngine::new(44100, 2048);
        engine.smooth(300.0);
        let mut quiet = vec![0.0f32; 2048];
        engine.process(&mut quiet);
        assert_eq!(engine.smooth(310.0), 310.0);
    }
}
