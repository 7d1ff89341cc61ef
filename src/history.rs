use crate::scale::is_diatonic;
use crate::types::{AnalysisResult, DetectedKey, HistoryPoint, ViewportRange};
use std::sync::{Arc, RwLock};

/// Points closer than this to a viewport edge push the edge out.
pub const EDGE_MARGIN: f32 = 2.0;
/// How far an edge moves each time it is pushed.
pub const EDGE_STEP: f32 = 4.0;

/// Single writer (the capture handler), many readers (display, sync).
pub type SharedHistory = Arc<RwLock<PitchHistory>>;

/// Append-only pitch trace for the current session.
///
/// One point per processed block, in arrival order. The viewport only grows
/// while a session runs and returns to its default on reset.
#[derive(Debug, Clone)]
pub struct PitchHistory {
    points: Vec<HistoryPoint>,
    viewport: ViewportRange,
    default_viewport: ViewportRange,
    key: DetectedKey,
    recording: bool,
}

impl PitchHistory {
    pub fn new() -> Self {
        Self::with_viewport(ViewportRange::default())
    }

    pub fn with_viewport(default_viewport: ViewportRange) -> Self {
        Self {
            points: Vec::new(),
            viewport: default_viewport,
            default_viewport,
            key: DetectedKey::Unknown,
            recording: false,
        }
    }

    pub fn shared(self) -> SharedHistory {
        Arc::new(RwLock::new(self))
    }

    /// Drop all points, restore the default viewport and forget the key.
    pub fn reset(&mut self) {
        self.points.clear();
        self.viewport = self.default_viewport;
        self.key = DetectedKey::Unknown;
    }

    /// Reset and start accepting appends.
    pub fn begin_session(&mut self) {
        self.reset();
        self.recording = true;
    }

    /// Stop accepting appends; points stay available for playback.
    pub fn end_session(&mut self) {
        self.recording = false;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Add a point. Ignored (returns false) outside a session. A non-finite
    /// pitch is stored as a gap.
    pub fn append(&mut self, point: HistoryPoint) -> bool {
        if !self.recording {
            return false;
        }
        let point = if point.pitch.is_finite() { point } else { HistoryPoint::gap() };
        if !point.is_silent() {
            self.fit(point.pitch);
        }
        self.points.push(point);
        true
    }

    pub fn set_key(&mut self, key: DetectedKey) {
        self.key = key;
    }

    /// Record one analysis result: key first (it updates on silent blocks
    /// too), then the point classified against that key.
    pub fn record(&mut self, result: &AnalysisResult) -> bool {
        self.set_key(result.key);
        let point = if result.is_voiced() && result.midi_note.is_finite() {
            HistoryPoint {
                pitch: result.midi_note,
                in_key: is_diatonic(result.midi_note, result.key),
                error_cents: result.pitch_error_cents,
            }
        } else {
            HistoryPoint::gap()
        };
        self.append(point)
    }

    /// Push each edge out in whole steps until `pitch` sits at least
    /// `EDGE_MARGIN` inside it.
    fn fit(&mut self, pitch: f32) {
        let over = pitch - (self.viewport.max - EDGE_MARGIN);
        if over > 0.0 {
            self.viewport.max += (over / EDGE_STEP).ceil() * EDGE_STEP;
        }
        let under = (self.viewport.min + EDGE_MARGIN) - pitch;
        if under > 0.0 {
            self.viewport.min -= (under / EDGE_STEP).ceil() * EDGE_STEP;
        }
    }

    pub fn points(&self) -> &[HistoryPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn viewport(&self) -> ViewportRange {
        self.viewport
    }

    pub fn key(&self) -> DetectedKey {
        self.key
    }
}

impl Default for PitchHistory {
    fn default() -> Self {
        Self::new()
    }
}
