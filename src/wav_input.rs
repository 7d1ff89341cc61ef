use crate::error::CaptureError;
use crate::input::{BlockSink, InputBackend, InputStream};
use crate::types::DeviceInfo;
use hound::{SampleFormat, WavReader};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Treats a WAV file as an input device, streamed at real-time pace.
///
/// Useful without a microphone: sing into any recorder, then run the file
/// through the whole pipeline exactly as live input would go.
pub struct WavFileBackend {
    path: PathBuf,
    realtime: bool,
}

impl WavFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            realtime: true,
        }
    }

    /// Deliver as fast as the handler keeps up instead of at real-time pace.
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }
}

/// Decode a WAV file to mono f32. Returns `(samples, sample_rate)`.
pub fn read_mono(path: &Path) -> Result<(Vec<f32>, u32), CaptureError> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().filter_map(|s| s.ok()).collect(),
        SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .filter_map(|s| s.ok())
                .map(|s| s as f32 / max)
                .collect()
        }
    };

    let mono = if channels <= 1 {
        samples
    } else {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    Ok((mono, spec.sample_rate))
}

impl InputBackend for WavFileBackend {
    fn resume(&self) -> Result<u32, CaptureError> {
        let reader = WavReader::open(&self.path)?;
        Ok(reader.spec().sample_rate)
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        let label = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());
        vec![DeviceInfo {
            id: self.path.display().to_string(),
            label,
        }]
    }

    fn open(
        &self,
        device: Option<&str>,
        block_size: usize,
        sink: BlockSink,
    ) -> Result<Box<dyn InputStream>, CaptureError> {
        if let Some(id) = device {
            if Path::new(id) != self.path.as_path() {
                return Err(CaptureError::DeviceNotFound(id.to_string()));
            }
        }
        let (mono, sample_rate) = read_mono(&self.path)?;
        info!(
            "WAV input: {:?}  {} Hz  {:.2}s",
            self.path.file_name().unwrap_or_default(),
            sample_rate,
            mono.len() as f64 / sample_rate.max(1) as f64
        );
        if mono.is_empty() {
            warn!("WAV input {:?} has no samples", self.path);
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let realtime = self.realtime;

        let handle = thread::Builder::new()
            .name("wav-input".into())
            .spawn(move || {
                let block_dur = Duration::from_secs_f64(block_size as f64 / sample_rate.max(1) as f64);
                let start = Instant::now();
                let mut block = vec![0.0f32; block_size];

                for (i, chunk) in mono.chunks(block_size).enumerate() {
                    if !flag.load(Ordering::Acquire) {
                        return;
                    }
                    if realtime {
                        // Pace to real time: wait until this block would have arrived
                        let target = block_dur * (i as u32 + 1);
                        let elapsed = start.elapsed();
                        if elapsed < target {
                            thread::sleep(target - elapsed);
                        }
                    }
                    // Last block is zero-padded to the full size
                    block[..chunk.len()].copy_from_slice(chunk);
                    block[chunk.len()..].fill(0.0);
                    if !sink.deliver(&block) {
                        return;
                    }
                }
                info!("WAV input exhausted.");
            })?;

        Ok(Box::new(WavStream {
            running,
            handle: Some(handle),
        }))
    }
}

struct WavStream {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InputStream for WavStream {
    fn close(mut self: Box<Self>) {
        self.running.store(false, Ordering::Release);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for WavStream {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn write_wav(path: &Path, samples: &[f32], sr: u32, channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: sr,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            w.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        w.finalize().unwrap();
    }

    #[test]
    fn test_read_mono_mixes_stereo() {
        let path = std::env::temp_dir().join("vox_monitor_read_mono.wav");
        write_wav(&path, &[0.5, 0.5, -0.5, -0.5], 8000, 2);
        let (mono, sr) = read_mono(&path).unwrap();
        assert_eq!(sr, 8000);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.5).abs() < 1e-3);
        assert!((mono[1] + 0.5).abs() < 1e-3);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_streams_padded_blocks() {
        let path = std::env::temp_dir().join("vox_monitor_wav_blocks.wav");
        write_wav(&path, &vec![0.25; 10], 8000, 1);
        let backend = WavFileBackend::new(&path).with_realtime(false);
        assert_eq!(backend.resume().unwrap(), 8000);

        let blocks = Arc::new(Mutex::new(Vec::new()));
        let sink_blocks = blocks.clone();
        let sink = BlockSink::new(Box::new(move |b: &[f32]| {
            sink_blocks.lock().unwrap().push(b.to_vec());
        }));
        let stream = backend.open(None, 4, sink).unwrap();
        // Give the delivery thread time to finish the short file
        for _ in 0..100 {
            if blocks.lock().unwrap().len() == 3 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        stream.close();

        let blocks = blocks.lock().unwrap();
        assert_eq!(blocks.len(), 3);
        assert!(blocks.iter().all(|b| b.len() == 4));
        assert_eq!(blocks[2][2], 0.0);
        assert!(blocks[2][1] > 0.2);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_unknown_device_rejected() {
        let backend = WavFileBackend::new("/nonexistent/take.wav");
        let sink = BlockSink::new(Box::new(|_: &[f32]| {}));
        assert!(matches!(
            backend.open(Some("other.wav"), 4, sink),
            Err(CaptureError::DeviceNotFound(_))
        ));
        assert!(backend.resume().is_err());
    }
}
