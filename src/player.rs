use crate::recorder::RecordedClip;
use std::time::Instant;

/// Transport clock over a recorded clip.
///
/// There is no audio output; the clock only tells the display where the
/// cursor belongs. Position advances with wall time while playing.
#[derive(Debug, Clone)]
pub struct ClipPlayer {
    duration: f64,
    offset: f64,
    started: Option<Instant>,
}

impl ClipPlayer {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration: duration_secs,
            offset: 0.0,
            started: None,
        }
    }

    pub fn for_clip(clip: &RecordedClip) -> Self {
        Self::new(clip.duration_secs)
    }

    /// `None` until a usable duration is known.
    pub fn duration(&self) -> Option<f64> {
        (self.duration.is_finite() && self.duration > 0.0).then_some(self.duration)
    }

    pub fn play(&mut self) {
        if self.started.is_some() {
            return;
        }
        if self.is_finished() {
            self.offset = 0.0;
        }
        self.started = Some(Instant::now());
    }

    pub fn pause(&mut self) {
        self.offset = self.current_time();
        self.started = None;
    }

    pub fn is_playing(&self) -> bool {
        self.started.is_some() && !self.is_finished()
    }

    /// Jump to `time`, clamped to the clip. Keeps playing if it was.
    pub fn seek(&mut self, time: f64) {
        let limit = self.duration().unwrap_or(0.0);
        self.offset = time.clamp(0.0, limit);
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }

    pub fn current_time(&self) -> f64 {
        let elapsed = self.started.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0);
        (self.offset + elapsed).min(self.duration().unwrap_or(0.0))
    }

    pub fn is_finished(&self) -> bool {
        match self.duration() {
            Some(d) => self.current_time() >= d,
            None => true,
        }
    }
}
