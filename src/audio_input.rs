use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use crossbeam_channel::bounded;
use log::{error, info, warn};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use crate::buffer::BlockAssembler;
use crate::error::CaptureError;
use crate::input::{BlockSink, InputBackend, InputStream};
use crate::types::DeviceInfo;

/// Live capture from a sound card via cpal.
///
/// The processing context is the negotiated sample rate: `resume` settles
/// it against the default input, and every stream in the session opens at
/// that rate so the engine stays valid.
pub struct CpalBackend {
    preferred_rate: u32,
    context_rate: Mutex<Option<u32>>,
}

impl CpalBackend {
    pub fn new(preferred_rate: u32) -> Self {
        Self {
            preferred_rate,
            context_rate: Mutex::new(None),
        }
    }

    fn find_device(&self, name: Option<&str>) -> Result<Device, CaptureError> {
        let host = cpal::default_host();
        match name {
            None => host.default_input_device().ok_or(CaptureError::NoDevice),
            Some(wanted) => host
                .input_devices()
                .map_err(|e| CaptureError::Context(e.to_string()))?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(wanted.to_string())),
        }
    }

    /// The preferred rate if the device supports it with its default
    /// channel count, otherwise the device default.
    fn pick_config(&self, device: &Device, rate: u32) -> Result<(StreamConfig, SampleFormat), CaptureError> {
        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::StreamConfig(e.to_string()))?;

        let wanted = cpal::SampleRate(rate);
        let matching = device.supported_input_configs().ok().and_then(|configs| {
            configs
                .filter(|c| {
                    c.channels() == supported.channels()
                        && c.min_sample_rate() <= wanted
                        && c.max_sample_rate() >= wanted
                })
                .max_by_key(|c| c.max_sample_rate())
                .map(|c| c.with_sample_rate(wanted))
        });

        Ok(match matching {
            Some(cfg) => {
                let fmt = cfg.sample_format();
                (cfg.into(), fmt)
            }
            None => {
                let fmt = supported.sample_format();
                (supported.into(), fmt)
            }
        })
    }
}

impl InputBackend for CpalBackend {
    fn resume(&self) -> Result<u32, CaptureError> {
        let mut ctx = self
            .context_rate
            .lock()
            .map_err(|_| CaptureError::Context("context lock poisoned".into()))?;
        if let Some(rate) = *ctx {
            return Ok(rate);
        }
        let device = self.find_device(None)?;
        let (config, _) = self.pick_config(&device, self.preferred_rate)?;
        let rate = config.sample_rate.0;
        if rate != self.preferred_rate {
            warn!("Input does not support {} Hz; using {} Hz", self.preferred_rate, rate);
        }
        *ctx = Some(rate);
        Ok(rate)
    }

    fn devices(&self) -> Vec<DeviceInfo> {
        let host = cpal::default_host();
        match host.input_devices() {
            Ok(devices) => devices
                .filter_map(|d| d.name().ok())
                .map(|name| DeviceInfo {
                    id: name.clone(),
                    label: name,
                })
                .collect(),
            Err(e) => {
                warn!("Device enumeration failed: {}", e);
                Vec::new()
            }
        }
    }

    fn open(
        &self,
        device: Option<&str>,
        block_size: usize,
        sink: BlockSink,
    ) -> Result<Box<dyn InputStream>, CaptureError> {
        let rate = self.resume()?;
        let device = self.find_device(device)?;
        let (config, format) = self.pick_config(&device, rate)?;
        if config.sample_rate.0 != rate {
            return Err(CaptureError::StreamConfig(format!(
                "device runs at {} Hz, session needs {} Hz",
                config.sample_rate.0, rate
            )));
        }

        info!(
            "Audio input: {}  {}Hz  {} ch  {:?}",
            device.name().unwrap_or_else(|_| "unknown".into()),
            rate,
            config.channels,
            format
        );

        // cpal streams aren't Send everywhere: a dedicated thread owns the
        // stream and drops it when told to stop.
        let (ready_tx, ready_rx) = bounded::<Result<(), CaptureError>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                let stream = match build_stream(&device, &config, format, block_size, sink) {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(CaptureError::StreamBuild(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                let _ = stop_rx.recv();
                drop(stream);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalStream {
                stop_tx,
                handle: Some(handle),
            })),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CaptureError::StreamBuild("capture thread exited".into()))
            }
        }
    }
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    format: SampleFormat,
    block_size: usize,
    sink: BlockSink,
) -> Result<cpal::Stream, CaptureError> {
    let channels = config.channels as usize;
    let err_fn = |e: cpal::StreamError| error!("Audio stream error: {e}");
    let mut assembler = BlockAssembler::new(block_size);
    // Reused across callbacks; grows to the largest buffer cpal hands over.
    let mut mono: Vec<f32> = Vec::with_capacity(block_size);

    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _| {
                mix_mono(data, channels, f32_sample, &mut mono);
                assembler.push(&mono, |block| {
                    sink.deliver(block);
                });
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _| {
                mix_mono(data, channels, i16_sample, &mut mono);
                assembler.push(&mono, |block| {
                    sink.deliver(block);
                });
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            config,
            move |data: &[u16], _| {
                mix_mono(data, channels, u16_sample, &mut mono);
                assembler.push(&mono, |block| {
                    sink.deliver(block);
                });
            },
            err_fn,
            None,
        ),
        fmt => return Err(CaptureError::UnsupportedFormat(format!("{fmt:?}"))),
    };

    stream.map_err(|e| match e {
        cpal::BuildStreamError::DeviceNotAvailable => {
            CaptureError::PermissionDenied("device not available".into())
        }
        other => CaptureError::StreamBuild(other.to_string()),
    })
}

struct CpalStream {
    stop_tx: crossbeam_channel::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl InputStream for CpalStream {
    fn close(mut self: Box<Self>) {
        let _ = self.stop_tx.send(());
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
    }
}

// ─── Per-format mono mixdown helpers ─────────────────────────────────────────

fn f32_sample(s: f32) -> f32 {
    s
}

fn i16_sample(s: i16) -> f32 {
    s as f32 / i16::MAX as f32
}

/// U16: 0 = -1.0, 32768 = 0.0, 65535 = +1.0
fn u16_sample(s: u16) -> f32 {
    (s as f32 - 32768.0) / 32768.0
}

/// Average interleaved frames into `out`, replacing its contents.
fn mix_mono<T: Copy>(data: &[T], channels: usize, to_f32: fn(T) -> f32, out: &mut Vec<f32>) {
    out.clear();
    if channels <= 1 {
        out.extend(data.iter().map(|&s| to_f32(s)));
        return;
    }
    out.extend(
        data.chunks(channels)
            .map(|frame| frame.iter().map(|&s| to_f32(s)).sum::<f32>() / channels as f32),
    );
}
