use crate::error::CaptureError;
use crossbeam_channel::{unbounded, Sender};
use hound::{SampleFormat, WavSpec, WavWriter};
use log::{error, info};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

/// A finished recording.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedClip {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub samples: u64,
    pub duration_secs: f64,
}

/// Writes captured blocks to a mono float WAV on a background thread.
///
/// `feed` never touches the disk, so it is safe to call from the
/// delivery thread.
pub struct Recorder {
    tx: Option<Sender<Vec<f32>>>,
    handle: Option<JoinHandle<Result<u64, String>>>,
    path: PathBuf,
    sample_rate: u32,
}

impl Recorder {
    pub fn start(path: &Path, sample_rate: u32) -> Result<Self, CaptureError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(path, spec)?;
        let (tx, rx) = unbounded::<Vec<f32>>();

        let handle = thread::Builder::new()
            .name("recorder".into())
            .spawn(move || write_blocks(writer, rx))?;

        info!("Recording → {:?}", path);
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            path: path.to_path_buf(),
            sample_rate,
        })
    }

    pub fn feed(&self, block: &[f32]) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(block.to_vec());
        }
    }

    /// Flush everything fed so far and close the file.
    pub fn finish(mut self) -> Result<RecordedClip, CaptureError> {
        // Dropping the sender ends the writer loop once the queue drains
        self.tx.take();
        let handle = self
            .handle
            .take()
            .ok_or_else(|| CaptureError::Recorder("writer already finished".into()))?;
        let samples = handle
            .join()
            .map_err(|_| CaptureError::Recorder("writer thread panicked".into()))?
            .map_err(CaptureError::Recorder)?;

        let clip = RecordedClip {
            path: self.path.clone(),
            sample_rate: self.sample_rate,
            samples,
            duration_secs: samples as f64 / self.sample_rate.max(1) as f64,
        };
        info!(
            "Recording saved: {} samples ({:.2}s) → {:?}",
            clip.samples, clip.duration_secs, clip.path
        );
        Ok(clip)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(h) = self.handle.take() {
            if let Ok(Err(e)) = h.join() {
                error!("Recorder for {:?} failed: {}", self.path, e);
            }
        }
    }
}

fn write_blocks(
    mut writer: WavWriter<BufWriter<File>>,
    rx: crossbeam_channel::Receiver<Vec<f32>>,
) -> Result<u64, String> {
    let mut count: u64 = 0;
    for block in rx.iter() {
        for &s in &block {
            writer.write_sample(s).map_err(|e| e.to_string())?;
        }
        count += block.len() as u64;
    }
    writer.finalize().map_err(|e| e.to_string())?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_duration() {
        let path = std::env::temp_dir().join("vox_monitor_recorder_test.wav");
        let rec = Recorder::start(&path, 8000).unwrap();
        for _ in 0..10 {
            rec.feed(&[0.1; 400]);
        }
        let clip = rec.finish().unwrap();
        assert_eq!(clip.samples, 4000);
        assert!((clip.duration_secs - 0.5).abs() < 1e-9);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 4000);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_empty_recording() {
        let path = std::env::temp_dir().join("vox_monitor_recorder_empty.wav");
        let clip = Recorder::start(&path, 44100).unwrap().finish().unwrap();
        assert_eq!(clip.samples, 0);
        assert_eq!(clip.duration_secs, 0.0);
        let _ = std::fs::remove_file(&path);
    }
}
