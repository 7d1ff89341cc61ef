use crate::canvas::Canvas;
use crate::history::PitchHistory;
use crate::scale::{is_black_key, note_name, IntonationBand};
use crate::sync::TraceAxis;
use crate::types::{Color, HistoryPoint, RenderMode, ViewportRange};

// ═══ COLORS ═══
pub const BG: Color = Color::rgb(6, 6, 14);
pub const WHITE_ROW: Color = Color::rgb(22, 22, 36);
pub const BLACK_ROW: Color = Color::rgb(12, 12, 22);
pub const TONIC_ROW: Color = Color::rgb(40, 34, 70);
pub const LABEL: Color = Color::rgb(138, 138, 170);
pub const IN_KEY: Color = Color::rgb(46, 204, 113);
pub const OUT_OF_KEY: Color = Color::rgb(231, 76, 60);
pub const TIGHT: Color = Color::rgb(0, 255, 0);
pub const ACCEPTABLE: Color = Color::rgb(255, 255, 0);
pub const POOR: Color = Color::rgb(255, 0, 0);
pub const CURSOR: Color = Color::rgb(255, 255, 255);

/// Trace color for a point under the given mode.
pub fn color_for(mode: RenderMode, point: &HistoryPoint) -> Color {
    match mode {
        RenderMode::Standard => {
            if point.in_key {
                IN_KEY
            } else {
                OUT_OF_KEY
            }
        }
        RenderMode::Precision => match IntonationBand::classify(point.error_cents) {
            IntonationBand::Tight => TIGHT,
            IntonationBand::Acceptable => ACCEPTABLE,
            IntonationBand::Poor => POOR,
        },
    }
}

/// Surface-dependent sizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollLayout {
    /// Space on the left reserved for octave labels.
    pub label_gutter: f32,
    pub right_margin: f32,
    /// Point spacing while the session still fits at full size.
    pub base_step: f32,
    pub line_width: f32,
    pub marker_radius: f32,
}

impl RollLayout {
    /// One unit per character cell.
    pub fn console() -> Self {
        Self {
            label_gutter: 4.0,
            right_margin: 1.0,
            base_step: 1.0,
            line_width: 1.0,
            marker_radius: 1.0,
        }
    }

    pub fn pixels() -> Self {
        Self {
            label_gutter: 36.0,
            right_margin: 8.0,
            base_step: 4.0,
            line_width: 2.0,
            marker_radius: 5.0,
        }
    }
}

/// One colored polyline of the trace, covering history indices
/// `first..=last`.
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub points: Vec<(f32, f32)>,
    pub first: usize,
    pub last: usize,
}

/// Playback position to show on a finished recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackCursor {
    pub time: f64,
    pub duration: f64,
}

/// Vertical position of `pitch` on a surface of `height`.
pub fn y_for_pitch(pitch: f32, viewport: ViewportRange, height: f32) -> f32 {
    let span = viewport.span().max(1.0);
    (viewport.max - pitch) / span * height
}

/// Split the history into colored strokes.
///
/// Silent points end the current stroke. A color change ends it too, and
/// the next stroke starts at the previous vertex so the line stays joined.
pub fn trace_strokes(
    points: &[HistoryPoint],
    viewport: ViewportRange,
    axis: &TraceAxis,
    height: f32,
    mode: RenderMode,
) -> Vec<Stroke> {
    let count = points.len();
    let mut strokes = Vec::new();
    let mut current: Option<Stroke> = None;

    for (i, p) in points.iter().enumerate() {
        if p.is_silent() {
            if let Some(done) = current.take() {
                strokes.push(done);
            }
            continue;
        }

        let pos = (axis.x_for_index(i, count) as f32, y_for_pitch(p.pitch, viewport, height));
        let color = color_for(mode, p);

        current = match current.take() {
            None => Some(Stroke { color, points: vec![pos], first: i, last: i }),
            Some(mut s) if s.color == color => {
                s.points.push(pos);
                s.last = i;
                Some(s)
            }
            Some(s) => {
                let joint = s.points[s.points.len() - 1];
                let first = s.last;
                strokes.push(s);
                Some(Stroke { color, points: vec![joint, pos], first, last: i })
            }
        };
    }
    if let Some(done) = current {
        strokes.push(done);
    }
    strokes
}

/// Piano-roll painter: grid, pitch trace, playback cursor.
pub struct PianoRoll {
    pub mode: RenderMode,
    pub layout: RollLayout,
}

impl PianoRoll {
    pub fn new(mode: RenderMode, layout: RollLayout) -> Self {
        Self { mode, layout }
    }

    /// The horizontal axis for a surface of the given size. Seeking must use
    /// the same axis as drawing.
    pub fn axis(&self, size: (f32, f32)) -> TraceAxis {
        let width = (size.0 - self.layout.label_gutter - self.layout.right_margin).max(1.0);
        TraceAxis::new(
            self.layout.label_gutter as f64,
            width as f64,
            self.layout.base_step as f64,
        )
    }

    pub fn draw<C: Canvas>(&self, canvas: &mut C, history: &PitchHistory, cursor: Option<PlaybackCursor>) {
        let size = canvas.size();
        canvas.fill_rect(0.0, 0.0, size.0, size.1, BG);
        self.draw_grid(canvas, history);
        self.draw_trace(canvas, history);
        if let Some(c) = cursor {
            self.draw_cursor(canvas, history, c);
        }
    }

    fn draw_grid<C: Canvas>(&self, canvas: &mut C, history: &PitchHistory) {
        let (w, h) = canvas.size();
        let view = history.viewport();
        let tonic = history.key().pitch_class();

        let lo = view.min.ceil() as i32;
        let hi = view.max.floor() as i32;
        for note in lo..=hi {
            let pc = note.rem_euclid(12) as u8;
            let top = y_for_pitch(note as f32 + 0.5, view, h);
            let bottom = y_for_pitch(note as f32 - 0.5, view, h);
            let shade = if tonic == Some(pc) {
                TONIC_ROW
            } else if is_black_key(pc) {
                BLACK_ROW
            } else {
                WHITE_ROW
            };
            canvas.fill_rect(0.0, top, w, bottom - top, shade);
            if pc == 0 {
                let mid = y_for_pitch(note as f32, view, h);
                canvas.text(0.0, mid, &note_name(note as f32), LABEL);
            }
        }
    }

    fn draw_trace<C: Canvas>(&self, canvas: &mut C, history: &PitchHistory) {
        let size = canvas.size();
        let axis = self.axis(size);
        let strokes = trace_strokes(history.points(), history.viewport(), &axis, size.1, self.mode);
        for s in &strokes {
            canvas.stroke_path(&s.points, s.color, self.layout.line_width);
        }
    }

    /// Only on a finished recording with a known, finite duration.
    fn draw_cursor<C: Canvas>(&self, canvas: &mut C, history: &PitchHistory, cursor: PlaybackCursor) {
        if history.is_recording() {
            return;
        }
        let size = canvas.size();
        let axis = self.axis(size);
        let count = history.len();
        let Some(index) = axis.index_for_time(cursor.time, cursor.duration, count) else {
            return;
        };
        let point = history.points()[index];
        if point.is_silent() {
            return;
        }
        let x = axis.x_for_index(index, count) as f32;
        let y = y_for_pitch(point.pitch, history.viewport(), size.1);
        canvas.fill_circle(x, y, self.layout.marker_radius, CURSOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DetectedKey, KeyMode};

    /// Records calls for inspection.
    #[derive(Default)]
    struct RecordingCanvas {
        rects: Vec<(f32, f32, f32, f32, Color)>,
        paths: Vec<(Vec<(f32, f32)>, Color)>,
        circles: Vec<(f32, f32, Color)>,
        texts: Vec<String>,
    }

    impl Canvas for RecordingCanvas {
        fn size(&self) -> (f32, f32) {
            (836.0, 240.0)
        }
        fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color) {
            self.rects.push((x, y, w, h, color));
        }
        fn stroke_path(&mut self, points: &[(f32, f32)], color: Color, _width: f32) {
            self.paths.push((points.to_vec(), color));
        }
        fn fill_circle(&mut self, cx: f32, cy: f32, _r: f32, color: Color) {
            self.circles.push((cx, cy, color));
        }
        fn text(&mut self, _x: f32, _y: f32, text: &str, _color: Color) {
            self.texts.push(text.to_string());
        }
    }

    fn pt(pitch: f32, in_key: bool, error_cents: f32) -> HistoryPoint {
        HistoryPoint { pitch, in_key, error_cents }
    }

    fn history_of(points: &[HistoryPoint]) -> PitchHistory {
        let mut h = PitchHistory::new();
        h.begin_session();
        for p in points {
            h.append(*p);
        }
        h
    }

    fn axis() -> TraceAxis {
        TraceAxis::new(36.0, 792.0, 4.0)
    }

    #[test]
    fn test_color_for_modes() {
        let p = pt(60.0, false, 3.0);
        assert_eq!(color_for(RenderMode::Standard, &p), OUT_OF_KEY);
        assert_eq!(color_for(RenderMode::Precision, &p), TIGHT);
        let q = pt(60.0, true, -17.0);
        assert_eq!(color_for(RenderMode::Standard, &q), IN_KEY);
        assert_eq!(color_for(RenderMode::Precision, &q), ACCEPTABLE);
        assert_eq!(color_for(RenderMode::Precision, &pt(60.0, true, 40.0)), POOR);
    }

    #[test]
    fn test_gap_breaks_trace() {
        let pts = [pt(60.0, true, 0.0), HistoryPoint::gap(), pt(62.0, true, 0.0)];
        let strokes = trace_strokes(&pts, ViewportRange::default(), &axis(), 240.0, RenderMode::Standard);
        assert_eq!(strokes.len(), 2);
        assert_eq!(strokes[0].points.len(), 1);
        assert_eq!(strokes[1].points.len(), 1);
        assert_eq!((strokes[0].first, strokes[0].last), (0, 0));
        assert_eq!((strokes[1].first, strokes[1].last), (2, 2));
    }

    #[test]
    fn test_color_change_joins_strokes() {
        let pts = [pt(60.0, true, 0.0), pt(61.0, true, 0.0), pt(61.0, false, 0.0), pt(62.0, false, 0.0)];
        let strokes = trace_strokes(&pts, ViewportRange::default(), &axis(), 240.0, RenderMode::Standard);
        assert_eq!(strokes.len(), 2);
        assert_eq!(strokes[0].color, IN_KEY);
        assert_eq!(strokes[1].color, OUT_OF_KEY);
        // New stroke starts where the old one ended
        assert_eq!(strokes[1].points[0], *strokes[0].points.last().unwrap());
        assert_eq!(strokes[1].points.len(), 3);
        assert_eq!(strokes[1].first, 1);
    }

    #[test]
    fn test_y_mapping_is_linear() {
        let v = ViewportRange { min: 48.0, max: 72.0 };
        assert_eq!(y_for_pitch(72.0, v, 240.0), 0.0);
        assert_eq!(y_for_pitch(48.0, v, 240.0), 240.0);
        assert_eq!(y_for_pitch(60.0, v, 240.0), 120.0);
    }

    #[test]
    fn test_grid_rows_and_labels() {
        let mut h = history_of(&[]);
        h.set_key(DetectedKey::Known { pitch_class: 2, mode: KeyMode::Major });
        let roll = PianoRoll::new(RenderMode::Standard, RollLayout::pixels());
        let mut canvas = RecordingCanvas::default();
        roll.draw(&mut canvas, &h, None);

        // Background plus one band per semitone 48..=72
        assert_eq!(canvas.rects.len(), 1 + 25);
        let bands = &canvas.rects[1..];
        let black = bands.iter().filter(|r| r.4 == BLACK_ROW).count();
        let tonic = bands.iter().filter(|r| r.4 == TONIC_ROW).count();
        // D3 and D4 highlighted; D is a white key
        assert_eq!(tonic, 2);
        assert_eq!(black, 10);
        assert_eq!(canvas.texts, vec!["C3", "C4", "C5"]);
        assert!(canvas.paths.is_empty());
    }

    #[test]
    fn test_trace_fits_surface() {
        let pts: Vec<HistoryPoint> = (0..5000).map(|i| pt(60.0 + (i % 5) as f32, true, 0.0)).collect();
        let h = history_of(&pts);
        let roll = PianoRoll::new(RenderMode::Standard, RollLayout::pixels());
        let mut canvas = RecordingCanvas::default();
        roll.draw(&mut canvas, &h, None);
        assert_eq!(canvas.paths.len(), 1);
        let (path, _) = &canvas.paths[0];
        let max_x = path.iter().map(|p| p.0).fold(f32::MIN, f32::max);
        assert!(max_x <= 836.0 - 8.0, "max_x={}", max_x);
    }

    #[test]
    fn test_cursor_only_after_recording() {
        let pts: Vec<HistoryPoint> = (0..20).map(|_| pt(64.0, true, 0.0)).collect();
        let mut h = history_of(&pts);
        let roll = PianoRoll::new(RenderMode::Standard, RollLayout::pixels());
        let cursor = PlaybackCursor { time: 1.0, duration: 2.0 };

        let mut live = RecordingCanvas::default();
        roll.draw(&mut live, &h, Some(cursor));
        assert!(live.circles.is_empty());

        h.end_session();
        let mut done = RecordingCanvas::default();
        roll.draw(&mut done, &h, Some(cursor));
        assert_eq!(done.circles.len(), 1);
        let expected_x = roll.axis((836.0, 240.0)).x_for_index(10, 20) as f32;
        assert_eq!(done.circles[0].0, expected_x);

        let mut no_duration = RecordingCanvas::default();
        roll.draw(&mut no_duration, &h, Some(PlaybackCursor { time: 1.0, duration: f64::NAN }));
        assert!(no_duration.circles.is_empty());
    }

    #[test]
    fn test_cursor_hidden_on_silence() {
        let mut h = history_of(&[pt(64.0, true, 0.0), HistoryPoint::gap()]);
        h.end_session();
        let roll = PianoRoll::new(RenderMode::Standard, RollLayout::pixels());
        let mut canvas = RecordingCanvas::default();
        roll.draw(&mut canvas, &h, Some(PlaybackCursor { time: 1.5, duration: 2.0 }));
        assert!(canvas.circles.is_empty());
    }
}
