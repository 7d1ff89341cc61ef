//! Shared DSP primitives: RMS, DC removal, autocorrelation pitch search,
//! Hz/MIDI conversion, and test signal generators.

/// Root mean square of an audio buffer.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Subtract the mean so a DC offset doesn't dominate the correlation.
pub fn remove_dc_offset(samples: &mut [f32]) {
    if samples.is_empty() {
        return;
    }
    let mean = samples.iter().sum::<f32>() / samples.len() as f32;
    for s in samples.iter_mut() {
        *s -= mean;
    }
}

/// Time-domain autocorrelation search for the fundamental.
///
/// Lags cover `max_hz` down to `min_hz`, capped at the buffer length.
/// Returns the frequency of the strongest positive correlation, or `None`
/// if nothing correlates.
pub fn autocorrelation_fundamental(
    samples: &[f32],
    sample_rate: u32,
    min_hz: f32,
    max_hz: f32,
) -> Option<f32> {
    let n = samples.len();
    if n < 2 || sample_rate == 0 {
        return None;
    }
    let min_lag = ((sample_rate as f32 / max_hz) as usize).max(1);
    let max_lag = ((sample_rate as f32 / min_hz) as usize).min(n - 1);

    let mut best_corr = 0.0f32;
    let mut best_lag = 0usize;
    for lag in min_lag..max_lag {
        let corr: f32 = samples[..n - lag]
            .iter()
            .zip(&samples[lag..])
            .map(|(a, b)| a * b)
            .sum();
        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }

    if best_lag > 0 {
        Some(sample_rate as f32 / best_lag as f32)
    } else {
        None
    }
}

/// m = 69 + 12·log2(f / 440). Non-positive input maps to 0.
pub fn hz_to_midi(hz: f32) -> f32 {
    if hz <= 0.0 {
        return 0.0;
    }
    69.0 + 12.0 * (hz / 440.0).log2()
}

pub fn midi_to_hz(midi: f32) -> f32 {
    440.0 * 2f32.powf((midi - 69.0) / 12.0)
}
