use crate::dsp::midi_to_hz;
use crate::error::CaptureError;
use crate::input::{BlockSink, InputBackend, InputStream};
use crate::types::DeviceInfo;
use log::info;
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One step of a simulated vocal line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phrase {
    /// Sing `midi` (detuned by `cents`) for `ms`.
    Note { midi: f32, cents: f32, ms: u32 },
    /// Same, with vibrato of `depth` cents at `rate_hz`.
    Vibrato { midi: f32, depth: f32, rate_hz: f32, ms: u32 },
    /// Glide between two pitches.
    Slide { from: f32, to: f32, ms: u32 },
    Rest { ms: u32 },
}

impl Phrase {
    fn ms(&self) -> u32 {
        match *self {
            Phrase::Note { ms, .. }
            | Phrase::Vibrato { ms, .. }
            | Phrase::Slide { ms, .. }
            | Phrase::Rest { ms } => ms,
        }
    }

    /// Pitch at `t` seconds into this step, `None` during rests.
    fn pitch_at(&self, t: f32) -> Option<f32> {
        match *self {
            Phrase::Note { midi, cents, .. } => Some(midi + cents / 100.0),
            Phrase::Vibrato { midi, depth, rate_hz, .. } => {
                Some(midi + depth / 100.0 * (2.0 * PI * rate_hz * t).sin())
            }
            Phrase::Slide { from, to, ms } => {
                let k = (t * 1000.0 / ms.max(1) as f32).clamp(0.0, 1.0);
                Some(from + (to - from) * k)
            }
            Phrase::Rest { .. } => None,
        }
    }
}

/// A short C-major line with some sloppy intonation and one chromatic note.
pub fn demo_phrase() -> Vec<Phrase> {
    vec![
        Phrase::Rest { ms: 300 },
        Phrase::Note { midi: 60.0, cents: 0.0, ms: 500 },
        Phrase::Note { midi: 62.0, cents: 8.0, ms: 400 },
        Phrase::Note { midi: 64.0, cents: -15.0, ms: 400 },
        Phrase::Note { midi: 65.0, cents: 4.0, ms: 400 },
        Phrase::Slide { from: 65.0, to: 67.0, ms: 150 },
        Phrase::Vibrato { midi: 67.0, depth: 30.0, rate_hz: 5.5, ms: 900 },
        Phrase::Rest { ms: 250 },
        Phrase::Note { midi: 69.0, cents: 5.0, ms: 400 },
        Phrase::Note { midi: 68.0, cents: 0.0, ms: 300 },
        Phrase::Note { midi: 67.0, cents: -32.0, ms: 400 },
        Phrase::Note { midi: 64.0, cents: 2.0, ms: 400 },
        Phrase::Note { midi: 60.0, cents: 0.0, ms: 800 },
        Phrase::Rest { ms: 500 },
    ]
}

/// Generates a synthetic voice in place of a microphone.
///
/// Phase-continuous: the oscillator advances by sample count, not wall
/// clock, so pitch glides don't click.
pub struct SynthBackend {
    sample_rate: u32,
    phrase: Vec<Phrase>,
    looping: bool,
    realtime: bool,
}

impl SynthBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            phrase: demo_phrase(),
            looping: true,
            realtime: true,
        }
    }

    pub fn with_phrase(mut self, phrase: Vec<Phrase>) -> Self {
        self.phrase = phrase;
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }
}

/// Render a phrase to mono samples.
pub fn render_phrase(phrase: &[Phrase], sample_rate: u32) -> Vec<f32> {
    let sr = sample_rate as f32;
    let mut out = Vec::new();
    let mut phase = 0.0f32;
    for step in phrase {
        let n = (step.ms() as u64 * sample_rate as u64 / 1000) as usize;
        for i in 0..n {
            let t = i as f32 / sr;
            match step.pitch_at(t) {
                Some(midi) => {
                    phase = (phase + midi_to_hz(midi) / sr).fract();
                    let x = 2.0 * PI * phase;
                    // Fundamental plus a couple of weaker partials
                    out.push(0.4 * x.sin() + 0.12 * (2.0 * x).sin() + 0.05 * (3.0 * x).sin());
                }
                None => out.push(0.0),
            }
        }
    }
    out
}

impl InputBackend for SynthBackend {
    fn resume(&self) -> Result<u32, CaptureError> {
        Ok(self.sample_rate)
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        vec![DeviceInfo {
            id: "synth".into(),
            label: "Synthetic voice".into(),
        }]
    }

    fn open(
        &self,
        device: Option<&str>,
        block_size: usize,
        sink: BlockSink,
    ) -> Result<Box<dyn InputStream>, CaptureError> {
        if let Some(id) = device {
            if id != "synth" {
                return Err(CaptureError::DeviceNotFound(id.to_string()));
            }
        }
        let samples = render_phrase(&self.phrase, self.sample_rate);
        info!(
            "Synth input: {} steps, {:.2}s{}",
            self.phrase.len(),
            samples.len() as f64 / self.sample_rate as f64,
            if self.looping { " (looping)" } else { "" }
        );

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let looping = self.looping;
        let realtime = self.realtime;
        let sample_rate = self.sample_rate;

        let handle = thread::Builder::new()
            .name("synth-input".into())
            .spawn(move || {
                if samples.is_empty() {
                    return;
                }
                let block_dur = Duration::from_secs_f64(block_size as f64 / sample_rate as f64);
                let start = Instant::now();
                let mut block = vec![0.0f32; block_size];
                let mut pos = 0usize;
                let mut sent: u32 = 0;

                while flag.load(Ordering::Acquire) {
                    for slot in block.iter_mut() {
                        if pos >= samples.len() {
                            if !looping {
                                *slot = 0.0;
                                continue;
                            }
                            pos = 0;
                        }
                        *slot = samples[pos];
                        pos += 1;
                    }
                    if realtime {
                        let target = block_dur * (sent + 1);
                        let elapsed = start.elapsed();
                        if elapsed < target {
                            thread::sleep(target - elapsed);
                        }
                    }
                    if !sink.deliver(&block) {
                        return;
                    }
                    sent += 1;
                    if !looping && pos >= samples.len() {
                        info!("Synth phrase complete.");
                        return;
                    }
                }
            })?;

        Ok(Box::new(SynthStream {
            running,
            handle: Some(handle),
        }))
    }
}

struct SynthStream {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InputStream for SynthStream {
    fn close(mut self: Box<Self>) {
        self.running.store(false, Ordering::Release);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for SynthStream {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{autocorrelation_fundamental, compute_rms};

    #[test]
    fn test_render_length_and_rest() {
        let phrase = vec![Phrase::Rest { ms: 100 }, Phrase::Note { midi: 69.0, cents: 0.0, ms: 100 }];
        let s = render_phrase(&phrase, 8000);
        assert_eq!(s.len(), 1600);
        assert_eq!(compute_rms(&s[..800]), 0.0);
        assert!(compute_rms(&s[800..]) > 0.1);
    }

    #[test]
    fn test_rendered_pitch() {
        let phrase = vec![Phrase::Note { midi: 69.0, cents: 0.0, ms: 200 }];
        let s = render_phrase(&phrase, 44100);
        let f = autocorrelation_fundamental(&s[..2048], 44100, 50.0, 1000.0).unwrap();
        assert!((f - 440.0).abs() < 6.0, "f={}", f);
    }

    #[test]
    fn test_vibrato_and_slide_pitch() {
        let v = Phrase::Vibrato { midi: 60.0, depth: 50.0, rate_hz: 1.0, ms: 1000 };
        assert!((v.pitch_at(0.25).unwrap() - 60.5).abs() < 1e-4);
        let s = Phrase::Slide { from: 60.0, to: 64.0, ms: 200 };
        assert!((s.pitch_at(0.1).unwrap() - 62.0).abs() < 1e-4);
        assert_eq!(Phrase::Rest { ms: 10 }.pitch_at(0.0), None);
    }
}
