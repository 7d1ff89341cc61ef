//! Mapping between history indices, horizontal pixels and playback time.
//!
//! The renderer places point `i` at `x_for_index(i)`; the cursor and
//! click-to-seek go through the same axis so they land on the same point.

/// Horizontal layout of the trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceAxis {
    /// x of index 0.
    pub left: f64,
    /// Usable width in pixels.
    pub width: f64,
    /// Spacing while the whole history fits at full size.
    pub base_step: f64,
}

impl TraceAxis {
    pub fn new(left: f64, width: f64, base_step: f64) -> Self {
        Self { left, width, base_step }
    }

    /// Per-point spacing: the base step, shrunk so `count` points fit.
    pub fn step(&self, count: usize) -> f64 {
        if count == 0 {
            return self.base_step;
        }
        let fit = self.width / count as f64;
        self.base_step.min(fit)
    }

    pub fn x_for_index(&self, index: usize, count: usize) -> f64 {
        self.left + index as f64 * self.step(count)
    }

    /// Nearest index for a pixel, clamped into the history.
    pub fn index_for_x(&self, x: f64, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let step = self.step(count);
        let raw = ((x - self.left) / step).round();
        Some(raw.clamp(0.0, (count - 1) as f64) as usize)
    }

    /// Point under the playhead: `floor(time / duration × count)`.
    pub fn index_for_time(&self, time: f64, duration: f64, count: usize) -> Option<usize> {
        if count == 0 || !duration.is_finite() || duration <= 0.0 || !time.is_finite() {
            return None;
        }
        let pos = (time / duration).clamp(0.0, 1.0) * count as f64;
        // Absorb float noise so time_for_pixel(x_for_index(i)) maps back to i.
        let idx = (pos + 1e-9).floor() as usize;
        Some(idx.min(count - 1))
    }

    /// Inverse of the forward mapping: pixel → index → playback time.
    pub fn time_for_pixel(&self, x: f64, count: usize, duration: f64) -> Option<f64> {
        if !duration.is_finite() || duration <= 0.0 {
            return None;
        }
        let index = self.index_for_x(x, count)?;
        Some(index as f64 / count as f64 * duration)
    }
}

/// Seek gate: scrubbing only applies to a finished recording.
pub struct PlaybackSync {
    pub axis: TraceAxis,
}

impl PlaybackSync {
    pub fn new(axis: TraceAxis) -> Self {
        Self { axis }
    }

    /// Time to seek to for a click at `x`, or `None` when seeking isn't
    /// allowed (capturing, no duration) or there is nothing to seek into.
    pub fn seek_target(&self, x: f64, count: usize, duration: Option<f64>, capturing: bool) -> Option<f64> {
        if capturing {
            return None;
        }
        self.axis.time_for_pixel(x, count, duration?)
    }

    /// History index for the cursor at playback `time`.
    pub fn cursor_index(&self, time: f64, count: usize, duration: Option<f64>, capturing: bool) -> Option<usize> {
        if capturing {
            return None;
        }
        self.axis.index_for_time(time, duration?, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(axis: &TraceAxis, count: usize, duration: f64) {
        for i in 0..count {
            let x = axis.x_for_index(i, count);
            let t = axis.time_for_pixel(x, count, duration).unwrap();
            let back = axis.index_for_time(t, duration, count).unwrap();
            assert_eq!(back, i, "count={} i={} x={} t={}", count, i, x, t);
        }
    }

    #[test]
    fn test_step_dense_and_compressed() {
        let axis = TraceAxis::new(40.0, 800.0, 4.0);
        assert_eq!(axis.step(100), 4.0);
        assert_eq!(axis.step(200), 4.0);
        assert_eq!(axis.step(400), 2.0);
        assert_eq!(axis.step(0), 4.0);
    }

    #[test]
    fn test_round_trip_dense_fit() {
        let axis = TraceAxis::new(40.0, 800.0, 4.0);
        round_trip(&axis, 1, 3.0);
        round_trip(&axis, 150, 7.3);
    }

    #[test]
    fn test_round_trip_compressed_fit() {
        let axis = TraceAxis::new(40.0, 800.0, 4.0);
        round_trip(&axis, 1000, 46.4);
        round_trip(&axis, 5173, 240.17);
    }

    #[test]
    fn test_round_trip_survives_f32_pixels() {
        let axis = TraceAxis::new(40.0, 800.0, 4.0);
        let count = 3000;
        for i in (0..count).step_by(37) {
            let x = axis.x_for_index(i, count) as f32;
            let t = axis.time_for_pixel(x as f64, count, 60.0).unwrap();
            assert_eq!(axis.index_for_time(t, 60.0, count), Some(i));
        }
    }

    #[test]
    fn test_index_for_x_clamps() {
        let axis = TraceAxis::new(40.0, 800.0, 4.0);
        assert_eq!(axis.index_for_x(-100.0, 10), Some(0));
        assert_eq!(axis.index_for_x(10_000.0, 10), Some(9));
        assert_eq!(axis.index_for_x(50.0, 0), None);
    }

    #[test]
    fn test_seek_gated() {
        let sync = PlaybackSync::new(TraceAxis::new(0.0, 100.0, 4.0));
        assert_eq!(sync.seek_target(40.0, 20, Some(10.0), true), None);
        assert_eq!(sync.seek_target(40.0, 20, None, false), None);
        assert_eq!(sync.seek_target(40.0, 20, Some(f64::INFINITY), false), None);
        assert_eq!(sync.seek_target(40.0, 20, Some(10.0), false), Some(5.0));
        assert_eq!(sync.cursor_index(5.0, 20, Some(10.0), false), Some(10));
        assert_eq!(sync.cursor_index(5.0, 20, Some(10.0), true), None);
    }
}
