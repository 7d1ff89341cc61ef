use crate::canvas::TextCanvas;
use crate::controller::{SessionState, StatusEvent};
use crate::history::SharedHistory;
use crate::player::ClipPlayer;
use crate::renderer::{PianoRoll, PlaybackCursor, RollLayout, ACCEPTABLE, POOR, TIGHT};
use crate::sync::TraceAxis;
use crate::types::*;
use crossbeam_channel::Receiver;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Display mode shared between the UI loop and whoever toggles it.
#[derive(Clone, Default)]
pub struct ModeSwitch(Arc<AtomicBool>);

impl ModeSwitch {
    pub fn new(mode: RenderMode) -> Self {
        let s = Self::default();
        s.set(mode);
        s
    }

    pub fn get(&self) -> RenderMode {
        if self.0.load(Ordering::Relaxed) {
            RenderMode::Precision
        } else {
            RenderMode::Standard
        }
    }

    pub fn set(&self, mode: RenderMode) {
        self.0.store(mode == RenderMode::Precision, Ordering::Relaxed);
    }

    pub fn toggle(&self) -> RenderMode {
        let next = self.get().toggled();
        self.set(next);
        next
    }
}

/// Cents error shown green below this, yellow below `READOUT_FAIR_CENTS`,
/// red beyond.
const READOUT_GOOD_CENTS: f32 = 15.0;
const READOUT_FAIR_CENTS: f32 = 40.0;

/// Status line color for the live cents readout.
fn readout_color(error_cents: f32) -> Color {
    let e = error_cents.abs();
    if e < READOUT_GOOD_CENTS {
        TIGHT
    } else if e < READOUT_FAIR_CENTS {
        ACCEPTABLE
    } else {
        POOR
    }
}

/// Playback transport the display follows, if any.
pub type SharedPlayer = Arc<Mutex<Option<ClipPlayer>>>;

/// Redraws the piano roll in the terminal at a fixed rate.
///
/// Free-running: it reads the shared history every frame whether or not
/// new blocks arrived.
pub struct ConsoleDisplay {
    history: SharedHistory,
    status_rx: Receiver<StatusEvent>,
    mode: ModeSwitch,
    player: SharedPlayer,
    update_hz: u32,
    cols: usize,
    rows: usize,
    state: SessionState,
    latest: Option<AnalysisResult>,
    message: Option<String>,
}

impl ConsoleDisplay {
    pub fn new(history: SharedHistory, status_rx: Receiver<StatusEvent>, mode: ModeSwitch, update_hz: u32) -> Self {
        Self {
            history,
            status_rx,
            mode,
            player: Arc::new(Mutex::new(None)),
            update_hz,
            cols: 100,
            rows: 30,
            state: SessionState::Idle,
            latest: None,
            message: None,
        }
    }

    pub fn with_player(mut self, player: SharedPlayer) -> Self {
        self.player = player;
        self
    }

    pub fn with_size(mut self, cols: usize, rows: usize) -> Self {
        self.cols = cols.max(8);
        self.rows = rows.max(4);
        self
    }

    /// Roll surface: the whole frame minus the status line.
    fn surface(&self) -> (usize, usize) {
        (self.cols, self.rows - 1)
    }

    /// Horizontal axis the trace is drawn on. Column seeks must go through
    /// this so they hit the point drawn under that column.
    pub fn axis(&self) -> TraceAxis {
        let (cols, rows) = self.surface();
        PianoRoll::new(self.mode.get(), RollLayout::console()).axis((cols as f32, rows as f32))
    }

    /// Run until `running` goes false. Blocks the calling thread.
    pub fn run(&mut self, running: Arc<AtomicBool>) {
        let period = Duration::from_secs_f64(1.0 / self.update_hz.max(1) as f64);
        let mut stdout = io::stdout();
        // Clear once, then redraw in place
        print!("\x1b[2J");

        while running.load(Ordering::Acquire) {
            self.drain_status();
            let frame = self.render_frame();
            print!("\x1b[H{}", frame);
            let _ = stdout.flush();
            thread::sleep(period);
        }
        println!();
    }

    fn drain_status(&mut self) {
        for event in self.status_rx.try_iter() {
            match event {
                StatusEvent::State(s) => {
                    if s == SessionState::Capturing {
                        self.message = None;
                    }
                    self.state = s;
                }
                StatusEvent::Analysis { result, .. } => self.latest = Some(result),
                StatusEvent::Error(e) => self.message = Some(e),
            }
        }
    }

    fn cursor(&self) -> Option<PlaybackCursor> {
        let guard = self.player.lock().ok()?;
        let player = guard.as_ref()?;
        Some(PlaybackCursor {
            time: player.current_time(),
            duration: player.duration()?,
        })
    }

    /// One full frame: the roll plus a status line, as ANSI text.
    pub fn render_frame(&self) -> String {
        let mode = self.mode.get();
        let roll = PianoRoll::new(mode, RollLayout::console());
        let (cols, rows) = self.surface();
        let mut canvas = TextCanvas::new(cols, rows);
        let cursor = self.cursor();

        let (points, key) = match self.history.read() {
            Ok(h) => {
                roll.draw(&mut canvas, &h, cursor);
                (h.len(), h.key())
            }
            Err(_) => (0, DetectedKey::Unknown),
        };

        let mut out = canvas.to_ansi();
        let (status, color) = match (&self.message, self.latest) {
            (Some(msg), _) => (format!("error: {}", msg), Some(POOR)),
            (None, Some(r)) if self.state == SessionState::Capturing => {
                let color = r.is_voiced().then(|| readout_color(r.pitch_error_cents));
                (r.to_string(), color)
            }
            _ => match cursor {
                Some(c) => (format!("playback {:.1}s / {:.1}s", c.time, c.duration), None),
                None => (String::new(), None),
            },
        };
        let prefix = format!(" [{}] {:<9} key {:<9} {:>5} blocks  ", mode, self.state, key, points);
        let prefix: String = prefix.chars().take(self.cols).collect();
        let room = self.cols - prefix.chars().count();
        let status: String = status.chars().take(room).collect();
        let pad = room - status.chars().count();

        out.push_str("\x1b[0m");
        out.push_str(&prefix);
        if let Some(c) = color {
            let _ = write!(out, "\x1b[38;2;{};{};{}m", c.r, c.g, c.b);
        }
        out.push_str(&status);
        let _ = writeln!(out, "\x1b[0m{:pad$}", "", pad = pad);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::PitchHistory;
    use crate::types::HistoryPoint;
    use crossbeam_channel::bounded;

    fn history_with(points: &[f32]) -> SharedHistory {
        let mut h = PitchHistory::new();
        h.begin_session();
        for &p in points {
            h.append(HistoryPoint {
                pitch: p,
                in_key: true,
                error_cents: 0.0,
            });
        }
        h.end_session();
        h.shared()
    }

    #[test]
    fn test_mode_switch() {
        let m = ModeSwitch::new(RenderMode::Precision);
        assert_eq!(m.get(), RenderMode::Precision);
        let shared = m.clone();
        assert_eq!(shared.toggle(), RenderMode::Standard);
        assert_eq!(m.get(), RenderMode::Standard);
    }

    #[test]
    fn test_frame_has_status_line() {
        let (tx, rx) = bounded(8);
        let mut d = ConsoleDisplay::new(history_with(&[60.0, 62.0, 64.0]), rx, ModeSwitch::default(), 20)
            .with_size(80, 12);
        tx.send(StatusEvent::State(SessionState::Capturing)).unwrap();
        d.drain_status();
        let frame = d.render_frame();
        assert_eq!(frame.lines().count(), 12);
        let last = frame.lines().last().unwrap();
        assert!(last.contains("capturing"), "{}", last);
        assert!(last.contains("3 blocks"), "{}", last);
    }

    #[test]
    fn test_axis_follows_size() {
        let (_tx, rx) = bounded(1);
        let points: Vec<f32> = (0..300).map(|i| 55.0 + (i % 10) as f32).collect();
        let d = ConsoleDisplay::new(history_with(&points), rx, ModeSwitch::default(), 20).with_size(64, 16);
        let axis = d.axis();
        assert_eq!(axis, PianoRoll::new(RenderMode::Standard, RollLayout::console()).axis((64.0, 15.0)));

        // The marker drawn for a seek to column x sits in that column
        let x = axis.x_for_index(120, points.len());
        let t = axis.time_for_pixel(x, points.len(), 30.0).unwrap();
        *d.player.lock().unwrap() = Some({
            let mut p = ClipPlayer::new(30.0);
            p.seek(t);
            p
        });
        let frame = d.render_frame();
        let row_with_marker = frame.lines().find(|l| l.contains('●')).unwrap();
        let plain: String = strip_ansi(row_with_marker);
        assert_eq!(plain.chars().position(|c| c == '●'), Some(x.floor() as usize));
    }

    fn strip_ansi(s: &str) -> String {
        let mut out = String::new();
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c == '\x1b' {
                for e in chars.by_ref() {
                    if e == 'm' {
                        break;
                    }
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    #[test]
    fn test_readout_color_bands() {
        assert_eq!(readout_color(-14.9), TIGHT);
        assert_eq!(readout_color(15.0), ACCEPTABLE);
        assert_eq!(readout_color(-39.0), ACCEPTABLE);
        assert_eq!(readout_color(40.0), POOR);
    }

    #[test]
    fn test_live_readout_colored() {
        let (tx, rx) = bounded(8);
        let mut d = ConsoleDisplay::new(history_with(&[69.0]), rx, ModeSwitch::default(), 20).with_size(120, 10);
        let mut r = AnalysisResult::silent(0.2, DetectedKey::Unknown);
        r.frequency_hz = 445.0;
        r.midi_note = 69.2;
        r.pitch_error_cents = 20.0;
        tx.send(StatusEvent::State(SessionState::Capturing)).unwrap();
        tx.send(StatusEvent::Analysis { at_us: 0, result: r }).unwrap();
        d.drain_status();
        let frame = d.render_frame();
        let last = frame.lines().last().unwrap();
        assert!(last.contains("\x1b[38;2;255;255;0m"), "{:?}", last);
        assert!(last.contains("+20"), "{:?}", last);
        assert_eq!(strip_ansi(last).chars().count(), 120);
    }

    #[test]
    fn test_error_shown() {
        let (tx, rx) = bounded(8);
        let mut d = ConsoleDisplay::new(history_with(&[]), rx, ModeSwitch::default(), 20).with_size(80, 10);
        tx.send(StatusEvent::Error("microphone access denied".into())).unwrap();
        d.drain_status();
        assert!(d.render_frame().contains("microphone access denied"));
    }
}
