#[cfg(feature = "audio")]
use vox_monitor::audio_input::CpalBackend;
use vox_monitor::canvas::SvgCanvas;
use vox_monitor::config::MonitorConfig;
use vox_monitor::console_display::{ConsoleDisplay, ModeSwitch, SharedPlayer};
use vox_monitor::controller::{CaptureConfig, CaptureController, StartRequest};
use vox_monitor::engine::AutocorrelationEngine;
use vox_monitor::history::PitchHistory;
use vox_monitor::input::InputBackend;
use vox_monitor::player::ClipPlayer;
use vox_monitor::renderer::{PianoRoll, PlaybackCursor, RollLayout};
use vox_monitor::simulator::SynthBackend;
use vox_monitor::sync::PlaybackSync;
use vox_monitor::types::*;
use vox_monitor::wav_input::WavFileBackend;

use clap::Parser;
use crossbeam_channel::{bounded, RecvTimeoutError};
use log::{error, info, warn};
use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "vox-monitor")]
#[command(about = "Real-time vocal pitch monitor with a piano-roll history")]
struct Cli {
    /// Stream a WAV file as if it were the microphone
    #[arg(long)]
    input: Option<PathBuf>,

    /// Use the built-in synthetic voice instead of a device
    #[arg(long)]
    simulate: bool,

    /// Input device name (see --list-devices)
    #[arg(long)]
    device: Option<String>,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Record the session to this WAV file
    #[arg(long)]
    record: Option<PathBuf>,

    /// Trace coloring used after capture (live capture always starts in standard)
    #[arg(long, value_enum)]
    mode: Option<RenderMode>,

    /// Console redraw rate (Hz)
    #[arg(long)]
    display_hz: Option<u32>,

    /// Samples per analysis block
    #[arg(long)]
    block_size: Option<usize>,

    /// Preferred device sample rate (Hz)
    #[arg(long)]
    sample_rate: Option<u32>,

    /// JSON settings file; flags override it
    #[arg(long, default_value = "vox-monitor.json")]
    config: PathBuf,

    /// Stop automatically after this many seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Write an SVG piano roll of the session here after stopping
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Replay the session with a moving cursor after stopping
    #[arg(long)]
    playback: bool,

    /// Start playback from the console column clicked on (with --playback)
    #[arg(long)]
    seek_col: Option<f64>,

    /// Disable the live console display
    #[arg(long)]
    quiet: bool,
}

impl Cli {
    /// File settings, then flags on top.
    fn settings(&self) -> MonitorConfig {
        let mut cfg = MonitorConfig::load(&self.config).unwrap_or_default();
        if let Some(v) = self.sample_rate {
            cfg.sample_rate = v;
        }
        if let Some(v) = self.block_size {
            cfg.block_size = v;
        }
        if let Some(v) = self.display_hz {
            cfg.display_hz = v;
        }
        if let Some(v) = self.mode {
            cfg.mode = v;
        }
        if self.device.is_some() {
            cfg.device = self.device.clone();
        }
        cfg
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let cfg = cli.settings();
    if let Err(e) = cfg.validate() {
        error!("Invalid settings: {}", e);
        return ExitCode::FAILURE;
    }

    let history = PitchHistory::with_viewport(cfg.viewport()).shared();
    let controller = Arc::new(CaptureController::with_history(
        select_backend(&cli, &cfg),
        AutocorrelationEngine::factory(),
        CaptureConfig {
            block_size: cfg.block_size,
            ..Default::default()
        },
        history.clone(),
    ));

    if cli.list_devices {
        for d in controller.refresh_devices() {
            println!("{:<40} {}", d.id, d.label);
        }
        return ExitCode::SUCCESS;
    }

    info!("═══════════════════════════════════════════════");
    info!("  VOX MONITOR v{}", env!("CARGO_PKG_VERSION"));
    info!("  Block: {} samples, display {} Hz", cfg.block_size, cfg.display_hz);
    info!("═══════════════════════════════════════════════");

    // ─── Console display ────────────────────────────────────────────
    let mode = ModeSwitch::new(cfg.mode);
    let player: SharedPlayer = Arc::new(Mutex::new(None));
    let display_running = Arc::new(AtomicBool::new(true));
    let (display, seek_axis) = if cli.quiet {
        (None, None)
    } else {
        let mut d = ConsoleDisplay::new(history.clone(), controller.status(), mode.clone(), cfg.display_hz)
            .with_player(player.clone());
        let axis = d.axis();
        let running = display_running.clone();
        match thread::Builder::new().name("display".into()).spawn(move || d.run(running)) {
            Ok(h) => (Some(h), Some(axis)),
            Err(e) => {
                warn!("Console display unavailable: {}", e);
                (None, Some(axis))
            }
        }
    };

    // ─── Capture ────────────────────────────────────────────────────
    let request = StartRequest {
        device: cfg.device.clone(),
        record: cli.record.clone(),
        mode: mode.get(),
    };
    let info = match controller.start(request) {
        Ok(info) => info,
        Err(e) => {
            error!("Could not start capture: {}", e);
            shutdown(display, &display_running);
            return ExitCode::FAILURE;
        }
    };
    mode.set(info.mode);

    wait_for_stop(cli.duration);

    let clip = match controller.stop() {
        Ok(clip) => clip,
        Err(e) => {
            error!("Capture did not stop cleanly: {}", e);
            None
        }
    };
    mode.set(cfg.mode);

    // ─── Playback ───────────────────────────────────────────────────
    let count = history.read().map(|h| h.len()).unwrap_or(0);
    let duration = match &clip {
        Some(c) => c.duration_secs,
        None => count as f64 * info.block_size as f64 / info.sample_rate.max(1) as f64,
    };

    if cli.playback && !cli.quiet {
        let mut p = ClipPlayer::new(duration);
        if let (Some(col), Some(axis)) = (cli.seek_col, seek_axis) {
            let sync = PlaybackSync::new(axis);
            match sync.seek_target(col, count, p.duration(), controller.is_capturing()) {
                Some(t) => p.seek(t),
                None => warn!("Column {} is not on the trace", col),
            }
        }
        p.play();
        info!("Playing back {:.1}s", duration);
        if let Ok(mut slot) = player.lock() {
            *slot = Some(p);
        }
        loop {
            let done = player
                .lock()
                .map(|p| p.as_ref().map(|p| p.is_finished()).unwrap_or(true))
                .unwrap_or(true);
            if done {
                break;
            }
            thread::sleep(Duration::from_millis(50));
        }
    }
    shutdown(display, &display_running);

    // ─── Snapshot ───────────────────────────────────────────────────
    if let Some(path) = &cli.snapshot {
        let mut canvas = SvgCanvas::new(960.0, 360.0);
        let roll = PianoRoll::new(cfg.mode, RollLayout::pixels());
        let cursor = cli.playback.then_some(PlaybackCursor {
            time: duration,
            duration,
        });
        match history.read() {
            Ok(h) => roll.draw(&mut canvas, &h, cursor),
            Err(_) => warn!("History unavailable for snapshot"),
        }
        match std::fs::write(path, canvas.finish()) {
            Ok(()) => info!("Snapshot written to {:?}", path),
            Err(e) => error!("Failed to write snapshot {:?}: {}", path, e),
        }
    }

    if let Some(c) = clip {
        info!("Recorded {:.2}s to {:?}", c.duration_secs, c.path);
    }
    ExitCode::SUCCESS
}

fn select_backend(cli: &Cli, cfg: &MonitorConfig) -> Arc<dyn InputBackend> {
    if let Some(path) = &cli.input {
        info!("Input: WAV file {:?}", path);
        return Arc::new(WavFileBackend::new(path));
    }
    if cli.simulate {
        info!("Input: synthetic voice");
        return Arc::new(SynthBackend::new(cfg.sample_rate));
    }
    #[cfg(feature = "audio")]
    {
        info!("Input: audio device");
        Arc::new(CpalBackend::new(cfg.sample_rate))
    }
    #[cfg(not(feature = "audio"))]
    {
        error!("Live input requires the 'audio' feature. Falling back to the synthetic voice.");
        Arc::new(SynthBackend::new(cfg.sample_rate))
    }
}

/// Block until Enter is pressed or `duration` seconds pass.
fn wait_for_stop(duration: Option<f64>) {
    let (tx, rx) = bounded::<()>(1);
    let stdin_watch = thread::Builder::new().name("stdin".into()).spawn(move || {
        let mut line = String::new();
        // EOF drops the sender without a stop request
        if matches!(std::io::stdin().lock().read_line(&mut line), Ok(n) if n > 0) {
            let _ = tx.send(());
        }
    });
    if let Err(e) = stdin_watch {
        warn!("Cannot watch stdin: {}", e);
    }
    info!("Capturing. Press Enter to stop.");

    match duration {
        Some(secs) if secs.is_finite() && secs > 0.0 => {
            let limit = Duration::from_secs_f64(secs);
            let deadline = Instant::now() + limit;
            if let Err(RecvTimeoutError::Disconnected) = rx.recv_timeout(limit) {
                thread::sleep(deadline.saturating_duration_since(Instant::now()));
            }
        }
        _ => {
            if rx.recv().is_err() {
                warn!("stdin closed; stopping capture");
            }
        }
    }
}

fn shutdown(display: Option<thread::JoinHandle<()>>, running: &AtomicBool) {
    running.store(false, Ordering::Release);
    if let Some(h) = display {
        let _ = h.join();
    }
}
