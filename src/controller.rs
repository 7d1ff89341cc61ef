use crate::buffer::BlockBuffer;
use crate::engine::{EngineFactory, PitchEngine};
use crate::error::CaptureError;
use crate::history::{PitchHistory, SharedHistory};
use crate::input::{BlockHandler, BlockSink, InputBackend, InputStream};
use crate::recorder::{RecordedClip, Recorder};
use crate::types::*;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, trace, warn};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

// ─── Public types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Waiting on the platform for the input device.
    Requesting,
    Capturing,
    Stopping,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Requesting => "requesting",
            SessionState::Capturing => "capturing",
            SessionState::Stopping => "stopping",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub block_size: usize,
    /// Status events buffered for the UI before new ones are dropped.
    pub status_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            status_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    /// Input device id, or the backend default.
    pub device: Option<String>,
    /// Also write the session to this WAV file.
    pub record: Option<PathBuf>,
    /// The display mode selected when start was pressed.
    pub mode: RenderMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub sample_rate: u32,
    pub block_size: usize,
    pub device: Option<String>,
    pub recording: Option<PathBuf>,
    /// Display mode for the new session. Always `Standard`.
    pub mode: RenderMode,
}

/// Updates for whoever shows status. Offered with `try_send`; a slow
/// reader misses events rather than stalling capture.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    State(SessionState),
    Analysis { at_us: u64, result: AnalysisResult },
    Error(String),
}

// ─── Internals ──────────────────────────────────────────────────────────────

/// Engine plus its marshaling buffer, built for one `(rate, block)` pair.
struct Pipeline {
    sample_rate: u32,
    block_size: usize,
    engine: Box<dyn PitchEngine>,
    buffer: BlockBuffer,
}

/// Everything owned by a running session.
struct ActiveSession {
    live: Arc<AtomicBool>,
    sink: BlockSink,
    stream: Box<dyn InputStream>,
    recorder: Arc<Mutex<Option<Recorder>>>,
}

struct Inner {
    state: SessionState,
    /// Bumped on every start so a cancelled acquisition can tell it lost.
    generation: u64,
    active: Option<ActiveSession>,
}

/// Owns the capture session: device acquisition, per-block analysis and
/// teardown.
///
/// Blocks are analysed synchronously on the backend's delivery thread and
/// land in the shared [`PitchHistory`]. Nothing is queued between the
/// device and the engine.
pub struct CaptureController {
    backend: Arc<dyn InputBackend>,
    factory: EngineFactory,
    config: CaptureConfig,
    pipeline: Arc<Mutex<Option<Pipeline>>>,
    history: SharedHistory,
    inner: Mutex<Inner>,
    devices: Mutex<Vec<DeviceInfo>>,
    status_tx: Sender<StatusEvent>,
    status_rx: Receiver<StatusEvent>,
    clock: SessionClock,
}

impl CaptureController {
    pub fn new(backend: Arc<dyn InputBackend>, factory: EngineFactory, config: CaptureConfig) -> Self {
        Self::with_history(backend, factory, config, PitchHistory::new().shared())
    }

    pub fn with_history(
        backend: Arc<dyn InputBackend>,
        factory: EngineFactory,
        config: CaptureConfig,
        history: SharedHistory,
    ) -> Self {
        let (status_tx, status_rx) = bounded(config.status_capacity.max(1));
        Self {
            backend,
            factory,
            config,
            pipeline: Arc::new(Mutex::new(None)),
            history,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                generation: 0,
                active: None,
            }),
            devices: Mutex::new(Vec::new()),
            status_tx,
            status_rx,
            clock: SessionClock::new(),
        }
    }

    pub fn history(&self) -> SharedHistory {
        self.history.clone()
    }

    pub fn status(&self) -> Receiver<StatusEvent> {
        self.status_rx.clone()
    }

    pub fn state(&self) -> SessionState {
        self.lock_inner().map(|i| i.state).unwrap_or(SessionState::Idle)
    }

    pub fn is_capturing(&self) -> bool {
        self.state() == SessionState::Capturing
    }

    /// Input devices as last enumerated; enumerates on first use.
    pub fn devices(&self) -> Vec<DeviceInfo> {
        let cached = self.devices.lock().map(|d| d.clone()).unwrap_or_default();
        if cached.is_empty() {
            self.refresh_devices()
        } else {
            cached
        }
    }

    /// Re-enumerate devices. Safe at any time; an active session keeps the
    /// device it opened.
    pub fn refresh_devices(&self) -> Vec<DeviceInfo> {
        let list = self.backend.devices();
        debug!("{} input device(s) available", list.len());
        if let Ok(mut d) = self.devices.lock() {
            *d = list.clone();
        }
        list
    }

    /// Begin a session. Only valid from `Idle`.
    pub fn start(&self, request: StartRequest) -> Result<SessionInfo, CaptureError> {
        let generation = {
            let mut inner = self.lock_inner()?;
            if inner.state != SessionState::Idle {
                return Err(CaptureError::AlreadyActive);
            }
            inner.state = SessionState::Requesting;
            inner.generation += 1;
            // Reset here, under the lock, so a cancelling stop() always
            // sees the session it has to end.
            self.write_history(|h| h.begin_session());
            inner.generation
        };
        self.notify(StatusEvent::State(SessionState::Requesting));
        if request.mode != RenderMode::Standard {
            debug!("Display mode reset to {} for new session", RenderMode::Standard);
        }

        let acquired = self.acquire(&request);

        let mut inner = self.lock_inner()?;
        let cancelled = inner.generation != generation || inner.state != SessionState::Requesting;
        match acquired {
            Ok((session, info)) if !cancelled => {
                session.live.store(true, Ordering::Release);
                inner.active = Some(session);
                inner.state = SessionState::Capturing;
                drop(inner);
                info!(
                    "Capturing: {} Hz, {} samples/block, device {}",
                    info.sample_rate,
                    info.block_size,
                    info.device.as_deref().unwrap_or("(default)")
                );
                self.notify(StatusEvent::State(SessionState::Capturing));
                Ok(info)
            }
            Ok((session, _)) => {
                drop(inner);
                info!("Capture cancelled while acquiring the device");
                if let Err(e) = release(session) {
                    warn!("Releasing cancelled session: {}", e);
                }
                self.suspend_if_idle();
                Err(CaptureError::Cancelled)
            }
            Err(e) => {
                if !cancelled {
                    inner.state = SessionState::Idle;
                    self.write_history(|h| h.end_session());
                }
                // A newer session may own the context by now.
                if inner.state == SessionState::Idle {
                    self.backend.suspend();
                }
                drop(inner);
                error!("Capture failed to start: {}", e);
                self.notify(StatusEvent::Error(e.to_string()));
                self.notify(StatusEvent::State(SessionState::Idle));
                Err(if cancelled { CaptureError::Cancelled } else { e })
            }
        }
    }

    /// End the session. Returns the recorded clip if one was requested.
    /// A no-op from `Idle`.
    pub fn stop(&self) -> Result<Option<RecordedClip>, CaptureError> {
        let session = {
            let mut inner = self.lock_inner()?;
            let state = inner.state;
            match state {
                SessionState::Idle | SessionState::Stopping => return Ok(None),
                SessionState::Requesting => {
                    // The pending start() sees the state change and backs out.
                    inner.state = SessionState::Idle;
                    self.write_history(|h| h.end_session());
                    drop(inner);
                    self.notify(StatusEvent::State(SessionState::Idle));
                    return Ok(None);
                }
                SessionState::Capturing => {
                    inner.state = SessionState::Stopping;
                    inner.active.take()
                }
            }
        };
        self.notify(StatusEvent::State(SessionState::Stopping));

        let clip = match session {
            Some(session) => release(session),
            None => Ok(None),
        };
        self.backend.suspend();
        self.write_history(|h| h.end_session());

        if let Ok(mut inner) = self.lock_inner() {
            inner.state = SessionState::Idle;
        }
        let points = self.history.read().map(|h| h.len()).unwrap_or(0);
        info!("Capture stopped after {} blocks", points);
        self.notify(StatusEvent::State(SessionState::Idle));
        clip
    }

    // ─── Acquisition ────────────────────────────────────────────────────────

    fn acquire(&self, request: &StartRequest) -> Result<(ActiveSession, SessionInfo), CaptureError> {
        let sample_rate = self.backend.resume()?;
        let block_size = self.config.block_size;
        self.prepare_pipeline(sample_rate, block_size)?;

        let live = Arc::new(AtomicBool::new(false));
        let recorder = Arc::new(Mutex::new(None));
        let sink = BlockSink::new(self.block_handler(live.clone(), recorder.clone()));

        let stream = self
            .backend
            .open(request.device.as_deref(), block_size, sink.clone())?;
        let session = ActiveSession {
            live,
            sink,
            stream,
            recorder,
        };

        if let Some(path) = &request.record {
            match Recorder::start(path, sample_rate) {
                Ok(r) => {
                    if let Ok(mut slot) = session.recorder.lock() {
                        *slot = Some(r);
                    }
                }
                Err(e) => {
                    let _ = release(session);
                    return Err(e);
                }
            }
        }

        let info = SessionInfo {
            sample_rate,
            block_size,
            device: request.device.clone(),
            recording: request.record.clone(),
            mode: RenderMode::Standard,
        };
        Ok((session, info))
    }

    /// Build the engine and buffer, or reset and keep the existing ones if
    /// the context is unchanged.
    fn prepare_pipeline(&self, sample_rate: u32, block_size: usize) -> Result<(), CaptureError> {
        let mut slot = self
            .pipeline
            .lock()
            .map_err(|_| CaptureError::Context("engine lock poisoned".into()))?;
        let reusable = matches!(
            slot.as_ref(),
            Some(p) if p.sample_rate == sample_rate && p.block_size == block_size
        );
        if reusable {
            if let Some(p) = slot.as_mut() {
                p.engine.reset();
            }
        } else {
            debug!("Creating engine for {} Hz / {} samples", sample_rate, block_size);
            *slot = Some(Pipeline {
                sample_rate,
                block_size,
                engine: (self.factory)(sample_rate, block_size),
                buffer: BlockBuffer::new(block_size),
            });
        }
        Ok(())
    }

    fn block_handler(&self, live: Arc<AtomicBool>, recorder: Arc<Mutex<Option<Recorder>>>) -> BlockHandler {
        let pipeline = self.pipeline.clone();
        let history = self.history.clone();
        let status_tx = self.status_tx.clone();
        let clock = self.clock.clone();

        Box::new(move |block: &[f32]| {
            if !live.load(Ordering::Acquire) {
                return;
            }
            let result = {
                let Ok(mut guard) = pipeline.lock() else {
                    return;
                };
                let Some(p) = guard.as_mut() else {
                    trace!("No engine; block skipped");
                    return;
                };
                let Some(buf) = p.buffer.load(block) else {
                    trace!("Block of {} samples skipped (expected {})", block.len(), p.block_size);
                    return;
                };
                p.engine.process(buf)
            };

            if let Ok(mut h) = history.write() {
                h.record(&result);
            }
            if let Ok(rec) = recorder.lock() {
                if let Some(r) = rec.as_ref() {
                    r.feed(block);
                }
            }
            let _ = status_tx.try_send(StatusEvent::Analysis {
                at_us: clock.now_us(),
                result,
            });
        })
    }

    // ─── Helpers ────────────────────────────────────────────────────────────

    /// Suspend the backend unless another session started meanwhile. The
    /// check and the suspend happen under the same lock as `start()`.
    fn suspend_if_idle(&self) {
        match self.lock_inner() {
            Ok(inner) if inner.state == SessionState::Idle => self.backend.suspend(),
            Ok(_) => debug!("Context left running for the active session"),
            Err(e) => warn!("Skipping suspend: {}", e),
        }
    }

    fn lock_inner(&self) -> Result<MutexGuard<'_, Inner>, CaptureError> {
        self.inner
            .lock()
            .map_err(|_| CaptureError::Context("controller lock poisoned".into()))
    }

    fn write_history(&self, f: impl FnOnce(&mut PitchHistory)) {
        match self.history.write() {
            Ok(mut h) => f(&mut h),
            Err(_) => warn!("History lock poisoned"),
        }
    }

    fn notify(&self, event: StatusEvent) {
        let _ = self.status_tx.try_send(event);
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Capture teardown failed: {}", e);
        }
    }
}

/// Tear down a session in order: stop handler calls, release the device,
/// then close the recording.
fn release(session: ActiveSession) -> Result<Option<RecordedClip>, CaptureError> {
    session.live.store(false, Ordering::Release);
    session.sink.detach();
    session.stream.close();
    let recorder = session
        .recorder
        .lock()
        .map_err(|_| CaptureError::Recorder("recorder lock poisoned".into()))?
        .take();
    recorder.map(Recorder::finish).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DetectedKey;

    struct NullBackend;

    struct NullStream;

    impl InputStream for NullStream {
        fn close(self: Box<Self>) {}
    }

    impl InputBackend for NullBackend {
        fn resume(&self) -> Result<u32, CaptureError> {
            Ok(8000)
        }

        fn devices(&self) -> Vec<DeviceInfo> {
            vec![DeviceInfo {
                id: "null".into(),
                label: "Null".into(),
            }]
        }

        fn open(&self, device: Option<&str>, _: usize, _: BlockSink) -> Result<Box<dyn InputStream>, CaptureError> {
            match device {
                Some("missing") => Err(CaptureError::DeviceNotFound("missing".into())),
                _ => Ok(Box::new(NullStream)),
            }
        }
    }

    struct Flat;

    impl PitchEngine for Flat {
        fn process(&mut self, _: &mut [f32]) -> AnalysisResult {
            AnalysisResult::silent(0.0, DetectedKey::Unknown)
        }
    }

    fn controller() -> CaptureController {
        let factory: EngineFactory = Arc::new(|_, _| Box::new(Flat) as Box<dyn PitchEngine>);
        CaptureController::new(Arc::new(NullBackend), factory, CaptureConfig::default())
    }

    #[test]
    fn test_state_transitions() {
        let c = controller();
        assert_eq!(c.state(), SessionState::Idle);
        let info = c.start(StartRequest::default()).unwrap();
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(c.state(), SessionState::Capturing);
        assert!(c.history().read().unwrap().is_recording());
        assert!(c.stop().unwrap().is_none());
        assert_eq!(c.state(), SessionState::Idle);
        assert!(!c.history().read().unwrap().is_recording());
    }

    #[test]
    fn test_start_forces_standard_mode() {
        let c = controller();
        let req = StartRequest {
            mode: RenderMode::Precision,
            ..Default::default()
        };
        assert_eq!(c.start(req).unwrap().mode, RenderMode::Standard);
    }

    #[test]
    fn test_failed_open_returns_to_idle() {
        let c = controller();
        let req = StartRequest {
            device: Some("missing".into()),
            ..Default::default()
        };
        assert!(matches!(c.start(req), Err(CaptureError::DeviceNotFound(_))));
        assert_eq!(c.state(), SessionState::Idle);
        assert!(!c.history().read().unwrap().is_recording());
        let events: Vec<_> = c.status().try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, StatusEvent::Error(_))));
        assert_eq!(events.last(), Some(&StatusEvent::State(SessionState::Idle)));
    }

    struct PluggableBackend(Mutex<Vec<DeviceInfo>>);

    impl InputBackend for PluggableBackend {
        fn resume(&self) -> Result<u32, CaptureError> {
            Ok(8000)
        }

        fn devices(&self) -> Vec<DeviceInfo> {
            self.0.lock().unwrap().clone()
        }

        fn open(&self, _: Option<&str>, _: usize, _: BlockSink) -> Result<Box<dyn InputStream>, CaptureError> {
            Ok(Box::new(NullStream))
        }
    }

    #[test]
    fn test_refresh_sees_hot_plugged_device() {
        let mic = |id: &str| DeviceInfo {
            id: id.into(),
            label: id.into(),
        };
        let backend = Arc::new(PluggableBackend(Mutex::new(vec![mic("built-in")])));
        let factory: EngineFactory = Arc::new(|_, _| Box::new(Flat) as Box<dyn PitchEngine>);
        let c = CaptureController::new(backend.clone(), factory, CaptureConfig::default());
        assert_eq!(c.devices().len(), 1);

        c.start(StartRequest::default()).unwrap();
        backend.0.lock().unwrap().push(mic("usb-headset"));
        // Cached list until asked to re-enumerate
        assert_eq!(c.devices().len(), 1);
        let ids: Vec<String> = c.refresh_devices().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["built-in", "usb-headset"]);
        assert_eq!(c.state(), SessionState::Capturing);
    }

    #[test]
    fn test_devices_cached() {
        let c = controller();
        assert_eq!(c.devices().len(), 1);
        assert_eq!(c.refresh_devices()[0].id, "null");
    }
}
