//! Drawing surfaces for the piano roll: an ANSI console grid and an SVG
//! document.

use crate::types::Color;
use std::fmt::Write as _;

/// Minimal 2D drawing surface. Coordinates are in surface units with the
/// origin at the top-left.
pub trait Canvas {
    fn size(&self) -> (f32, f32);
    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color);
    /// Open polyline. A single point draws a dot.
    fn stroke_path(&mut self, points: &[(f32, f32)], color: Color, width: f32);
    fn fill_circle(&mut self, cx: f32, cy: f32, r: f32, color: Color);
    fn text(&mut self, x: f32, y: f32, text: &str, color: Color);
}

// ─── Console ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
struct Cell {
    ch: char,
    fg: Color,
    bg: Color,
}

/// Character-cell canvas; one cell is one unit. Rendered with 24-bit ANSI
/// colors.
pub struct TextCanvas {
    cols: usize,
    rows: usize,
    cells: Vec<Cell>,
}

impl TextCanvas {
    pub fn new(cols: usize, rows: usize) -> Self {
        let blank = Cell {
            ch: ' ',
            fg: Color::rgb(200, 200, 224),
            bg: Color::rgb(0, 0, 0),
        };
        Self {
            cols,
            rows,
            cells: vec![blank; cols * rows],
        }
    }

    fn cell_mut(&mut self, col: i64, row: i64) -> Option<&mut Cell> {
        if col < 0 || row < 0 || col as usize >= self.cols || row as usize >= self.rows {
            return None;
        }
        let idx = row as usize * self.cols + col as usize;
        self.cells.get_mut(idx)
    }

    fn plot(&mut self, x: f32, y: f32, ch: char, color: Color) {
        if let Some(cell) = self.cell_mut(x.floor() as i64, y.floor() as i64) {
            cell.ch = ch;
            cell.fg = color;
        }
    }

    /// Glyph at a cell, for tests and plain-text dumps.
    pub fn glyph(&self, col: usize, row: usize) -> char {
        self.cells[row * self.cols + col].ch
    }

    /// Plain characters without color codes.
    pub fn to_plain(&self) -> String {
        let mut out = String::with_capacity((self.cols + 1) * self.rows);
        for row in self.cells.chunks(self.cols.max(1)) {
            out.extend(row.iter().map(|c| c.ch));
            out.push('\n');
        }
        out
    }

    /// Full frame with ANSI truecolor escapes, one line per row.
    pub fn to_ansi(&self) -> String {
        let mut out = String::with_capacity(self.cols * self.rows * 8);
        for row in self.cells.chunks(self.cols.max(1)) {
            let mut last: Option<(Color, Color)> = None;
            for c in row {
                if last != Some((c.fg, c.bg)) {
                    let _ = write!(
                        out,
                        "\x1b[38;2;{};{};{}m\x1b[48;2;{};{};{}m",
                        c.fg.r, c.fg.g, c.fg.b, c.bg.r, c.bg.g, c.bg.b
                    );
                    last = Some((c.fg, c.bg));
                }
                out.push(c.ch);
            }
            out.push_str("\x1b[0m\n");
        }
        out
    }
}

impl Canvas for TextCanvas {
    fn size(&self) -> (f32, f32) {
        (self.cols as f32, self.rows as f32)
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color) {
        // A cell belongs to the rect if its center does.
        let c0 = (x - 0.5).ceil().max(0.0) as i64;
        let c1 = (x + w - 0.5).ceil() as i64;
        let r0 = (y - 0.5).ceil().max(0.0) as i64;
        let r1 = (y + h - 0.5).ceil() as i64;
        for row in r0..r1 {
            for col in c0..c1 {
                if let Some(cell) = self.cell_mut(col, row) {
                    cell.bg = color;
                }
            }
        }
    }

    fn stroke_path(&mut self, points: &[(f32, f32)], color: Color, _width: f32) {
        match points {
            [] => {}
            [(x, y)] => self.plot(*x, *y, '•', color),
            _ => {
                for pair in points.windows(2) {
                    let (x0, y0) = pair[0];
                    let (x1, y1) = pair[1];
                    let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil().max(1.0) as usize;
                    for s in 0..=steps {
                        let t = s as f32 / steps as f32;
                        self.plot(x0 + (x1 - x0) * t, y0 + (y1 - y0) * t, '•', color);
                    }
                }
            }
        }
    }

    fn fill_circle(&mut self, cx: f32, cy: f32, _r: f32, color: Color) {
        self.plot(cx, cy, '●', color);
    }

    fn text(&mut self, x: f32, y: f32, text: &str, color: Color) {
        for (i, ch) in text.chars().enumerate() {
            self.plot(x + i as f32, y, ch, color);
        }
    }
}

// ─── SVG ────────────────────────────────────────────────────────────────────

/// Builds a standalone SVG document.
pub struct SvgCanvas {
    width: f32,
    height: f32,
    body: String,
}

impl SvgCanvas {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            body: String::new(),
        }
    }

    pub fn finish(self) -> String {
        format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n{body}</svg>\n",
            w = self.width,
            h = self.height,
            body = self.body
        )
    }
}

impl Canvas for SvgCanvas {
    fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color) {
        let _ = writeln!(
            self.body,
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"{}\"/>",
            x,
            y,
            w,
            h,
            color.hex()
        );
    }

    fn stroke_path(&mut self, points: &[(f32, f32)], color: Color, width: f32) {
        match points {
            [] => {}
            [(x, y)] => self.fill_circle(*x, *y, width, color),
            _ => {
                let pts: Vec<String> = points.iter().map(|(x, y)| format!("{:.2},{:.2}", x, y)).collect();
                let _ = writeln!(
                    self.body,
                    "<polyline points=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{:.1}\" stroke-linejoin=\"round\" stroke-linecap=\"round\"/>",
                    pts.join(" "),
                    color.hex(),
                    width
                );
            }
        }
    }

    fn fill_circle(&mut self, cx: f32, cy: f32, r: f32, color: Color) {
        let _ = writeln!(
            self.body,
            "<circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"{:.2}\" fill=\"{}\"/>",
            cx,
            cy,
            r,
            color.hex()
        );
    }

    fn text(&mut self, x: f32, y: f32, text: &str, color: Color) {
        let _ = writeln!(
            self.body,
            "<text x=\"{:.2}\" y=\"{:.2}\" fill=\"{}\" font-family=\"monospace\" font-size=\"10\">{}</text>",
            x,
            y,
            color.hex(),
            text
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Color = Color::rgb(255, 0, 0);

    #[test]
    fn test_text_canvas_line_and_dot() {
        let mut c = TextCanvas::new(10, 3);
        c.stroke_path(&[(0.5, 1.5), (4.5, 1.5)], RED, 1.0);
        c.stroke_path(&[(8.5, 0.5)], RED, 1.0);
        let plain = c.to_plain();
        let lines: Vec<&str> = plain.lines().collect();
        assert_eq!(lines[1].chars().filter(|&ch| ch == '•').count(), 5);
        assert_eq!(c.glyph(8, 0), '•');
        assert_eq!(c.glyph(9, 2), ' ');
    }

    #[test]
    fn test_text_canvas_clips_out_of_bounds() {
        let mut c = TextCanvas::new(4, 2);
        c.text(2.0, 0.0, "hello", RED);
        c.fill_circle(-3.0, 10.0, 1.0, RED);
        assert_eq!(c.to_plain(), "  he\n    \n");
        assert!(c.to_ansi().contains("\x1b[38;2;255;0;0m"));
    }

    #[test]
    fn test_svg_document() {
        let mut s = SvgCanvas::new(100.0, 50.0);
        s.fill_rect(0.0, 0.0, 100.0, 50.0, Color::rgb(0, 0, 0));
        s.stroke_path(&[(1.0, 2.0), (3.0, 4.0)], RED, 2.0);
        s.stroke_path(&[(5.0, 5.0)], RED, 2.0);
        let doc = s.finish();
        assert!(doc.starts_with("<svg"));
        assert!(doc.contains("<polyline points=\"1.00,2.00 3.00,4.00\""));
        assert!(doc.contains("<circle cx=\"5.00\""));
        assert!(doc.trim_end().ends_with("</svg>"));
    }
}
