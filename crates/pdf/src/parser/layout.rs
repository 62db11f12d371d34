//! Content-stream text extraction and visual-row reconstruction.
//!
//! Two stages, both pure over the [`PdfBackend`] trait:
//!
//! ```text
//! content ops  ->  TextRun[]  ->  PdfLine[]
//!   (per page)    extract_page_runs   reflow_lines
//! ```
//!
//! The first stage interprets the text-object subset of the PDF operator
//! set: a text object (`BT`..`ET`) carries a text matrix and a line matrix,
//! positioning operators rewrite them, and showing operators emit glyphs at
//! the current origin. Only the origin of each run matters here, so glyph
//! widths are approximated and the full matrices are reduced to an affine
//! [`Xform`].
//!
//! The second stage buckets runs into visual rows by quantised y coordinate
//! and orders each row left-to-right, preserving the per-fragment x offsets
//! the statement parsers use for column inference and label slicing.

use std::collections::BTreeMap;

use serde::Serialize;

use super::backend::{as_number, ContentOp, PageId, PdfBackend, RawObject};
use crate::PdfError;

/// A single run of text at a specific position on the page.
#[derive(Debug, Clone)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

/// One text fragment within a reconstructed row, with its x offset.
#[derive(Debug, Clone, Serialize)]
pub struct LineItem {
    pub text: String,
    pub x: f32,
}

/// One visual row on one page: flat text plus the ordered fragments it was
/// assembled from. Items are sorted ascending by x.
#[derive(Debug, Clone, Serialize)]
pub struct PdfLine {
    pub text: String,
    pub items: Vec<LineItem>,
    pub page: usize,
}

/// Two y coordinates belong to the same visual row iff they quantise to the
/// same bucket: `round(y / 2) * 2`.
const ROW_BUCKET: f32 = 2.0;

/// Glyph width as a fraction of the font size. Without the font's widths
/// array every glyph is assumed half an em, which is close enough for the
/// proportional fonts statements are set in -- downstream only consumes run
/// *start* offsets.
const GLYPH_WIDTH_EM: f32 = 0.5;

/// An affine transform, written out as the six numbers PDF uses
/// (`a b c d e f`); `(e, f)` is the origin.
#[derive(Debug, Clone, Copy)]
struct Xform {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Xform {
    const IDENTITY: Xform = Xform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// Pre-multiply a translation: where `(tx, ty)` in this transform's
    /// space lands on the page.
    fn shifted(self, tx: f32, ty: f32) -> Xform {
        Xform {
            e: self.a * tx + self.c * ty + self.e,
            f: self.b * tx + self.d * ty + self.f,
            ..self
        }
    }

    /// Slide the origin along the baseline by `dx` text-space units.
    fn advanced(self, dx: f32) -> Xform {
        Xform {
            e: self.e + dx * self.a,
            f: self.f + dx * self.b,
            ..self
        }
    }
}

/// Interpreter state for one page's content stream.
///
/// Graphics operators that do not affect text are ignored wholesale; the
/// text state deliberately survives `ET`, because some producers select a
/// font in one text object and keep showing with it in the next.
struct Interp<'a> {
    backend: &'a dyn PdfBackend,
    page: PageId,
    /// Resource key of the current font (the `/F1`-style name), kept so
    /// string operands can be decoded with the right encoding.
    font_key: Vec<u8>,
    font_size: f32,
    /// Horizontal scaling, `Tz` percentage / 100.
    scale_h: f32,
    /// Extra spacing per glyph (`Tc`) and per ASCII space (`Tw`).
    char_gap: f32,
    word_gap: f32,
    /// Baseline rise (`Ts`), added to the y of emitted runs.
    rise: f32,
    /// Leading (`TL`), consumed by `T*`, `'` and `"`.
    line_step: f32,
    /// Current text matrix.
    cursor: Xform,
    /// Line matrix: where the current line started.
    line_start: Xform,
    runs: Vec<TextRun>,
}

impl<'a> Interp<'a> {
    fn new(backend: &'a dyn PdfBackend, page: PageId) -> Self {
        Interp {
            backend,
            page,
            font_key: Vec::new(),
            font_size: 0.0,
            scale_h: 1.0,
            char_gap: 0.0,
            word_gap: 0.0,
            rise: 0.0,
            line_step: 0.0,
            cursor: Xform::IDENTITY,
            line_start: Xform::IDENTITY,
            runs: Vec::new(),
        }
    }

    fn apply(&mut self, op: &ContentOp) {
        let args = op.operands.as_slice();

        match op.operator.as_str() {
            "BT" => {
                self.cursor = Xform::IDENTITY;
                self.line_start = Xform::IDENTITY;
            }
            // Font and spacing survive the text object on purpose.
            "ET" => {}

            "Tf" => {
                if let [RawObject::Name(key), size, ..] = args {
                    self.font_key = key.clone();
                    if let Some(size) = as_number(size) {
                        self.font_size = size;
                    }
                }
            }

            // `Tm` replaces both matrices outright.
            "Tm" => {
                let n: Vec<f32> = args.iter().filter_map(as_number).take(6).collect();
                if let [a, b, c, d, e, f] = n[..] {
                    self.line_start = Xform { a, b, c, d, e, f };
                    self.cursor = self.line_start;
                }
            }
            // `Td` starts a new line offset from the previous one; `TD`
            // additionally stores `-ty` as the leading.
            "Td" => self.offset_line(args, false),
            "TD" => self.offset_line(args, true),
            "T*" => self.newline(),

            "TL" => self.set_scalar(args, |interp, v| interp.line_step = v),
            "Tc" => self.set_scalar(args, |interp, v| interp.char_gap = v),
            "Tw" => self.set_scalar(args, |interp, v| interp.word_gap = v),
            "Tz" => self.set_scalar(args, |interp, v| interp.scale_h = v / 100.0),
            "Ts" => self.set_scalar(args, |interp, v| interp.rise = v),

            "Tj" => {
                if let Some(operand) = args.first() {
                    self.show(operand);
                }
            }
            // `'` is shorthand for T* then Tj.
            "'" => {
                self.newline();
                if let Some(operand) = args.first() {
                    self.show(operand);
                }
            }
            // `"` sets word and char spacing first, then behaves like `'`.
            "\"" => {
                if let [aw, ac, operand, ..] = args {
                    if let Some(aw) = as_number(aw) {
                        self.word_gap = aw;
                    }
                    if let Some(ac) = as_number(ac) {
                        self.char_gap = ac;
                    }
                    self.newline();
                    self.show(operand);
                }
            }
            "TJ" => {
                if let Some(RawObject::Array(parts)) = args.first() {
                    self.show_array(parts);
                }
            }

            _ => {}
        }
    }

    fn set_scalar(&mut self, args: &[RawObject], assign: fn(&mut Self, f32)) {
        if let Some(value) = args.first().and_then(as_number) {
            assign(self, value);
        }
    }

    fn offset_line(&mut self, args: &[RawObject], sets_leading: bool) {
        let [tx, ty, ..] = args else { return };
        let (Some(tx), Some(ty)) = (as_number(tx), as_number(ty)) else {
            return;
        };
        if sets_leading {
            self.line_step = -ty;
        }
        self.move_line(tx, ty);
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_start = self.line_start.shifted(tx, ty);
        self.cursor = self.line_start;
    }

    fn newline(&mut self) {
        self.move_line(0.0, -self.line_step);
    }

    fn decode(&self, operand: &RawObject) -> String {
        match operand {
            RawObject::Str(bytes) => self.backend.decode_text(self.page, &self.font_key, bytes),
            _ => String::new(),
        }
    }

    fn glyph_width(&self) -> f32 {
        self.font_size * GLYPH_WIDTH_EM * self.scale_h
    }

    /// Move the cursor past `shown` text: every glyph costs its width plus
    /// the char gap, ASCII spaces additionally cost the word gap.
    fn advance(&mut self, shown: &str) {
        let glyphs = shown.chars().count() as f32;
        let spaces = shown.chars().filter(|c| *c == ' ').count() as f32;
        let dx = glyphs * (self.glyph_width() + self.char_gap) + spaces * self.word_gap;
        self.cursor = self.cursor.advanced(dx);
    }

    fn push_run(&mut self, text: String, x: f32, y: f32) {
        let trimmed = text.trim_end();
        if !trimmed.is_empty() {
            self.runs.push(TextRun {
                text: trimmed.to_string(),
                x,
                y,
            });
        }
    }

    /// `Tj`-style show: one operand, one run.
    fn show(&mut self, operand: &RawObject) {
        let text = self.decode(operand);
        if text.is_empty() {
            return;
        }
        let (x, y) = (self.cursor.e, self.cursor.f + self.rise);
        self.advance(&text);
        self.push_run(text, x, y);
    }

    /// `TJ` show: strings interleaved with kerning adjustments, in
    /// thousandths of a text-space unit (negative moves right).
    ///
    /// The fragments of one array are glued into a single run anchored at
    /// the first string's origin; an adjustment wide enough to read as a
    /// word break becomes a space inside the run.
    fn show_array(&mut self, parts: &[RawObject]) {
        let mut pending = String::new();
        let mut origin: Option<(f32, f32)> = None;

        for part in parts {
            if let RawObject::Str(_) = part {
                let fragment = self.decode(part);
                if origin.is_none() {
                    origin = Some((self.cursor.e, self.cursor.f + self.rise));
                }
                pending.push_str(&fragment);
                self.advance(&fragment);
            } else if let Some(adjustment) = as_number(part) {
                let dx = -adjustment / 1000.0 * self.font_size * self.scale_h;
                if dx > self.glyph_width() / 3.0 && !pending.is_empty() {
                    pending.push(' ');
                }
                self.cursor = self.cursor.advanced(dx);
            }
        }

        if let Some((x, y)) = origin {
            self.push_run(pending, x, y);
        }
    }
}

/// Interpret one page's content stream into positioned [`TextRun`]s, in
/// content order.
pub fn extract_page_runs(
    backend: &dyn PdfBackend,
    page: PageId,
) -> Result<Vec<TextRun>, PdfError> {
    let content = backend.page_content(page)?;
    let ops = backend.decode_content(&content)?;

    let mut interp = Interp::new(backend, page);
    for op in &ops {
        interp.apply(op);
    }

    Ok(interp.runs)
}

/// Quantise a y coordinate into its row bucket key.
fn row_key(y: f32) -> i64 {
    ((y / ROW_BUCKET).round() * ROW_BUCKET) as i64
}

/// Collapse whitespace runs to single spaces and trim.
fn collapse_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Group a page's runs into visual rows.
///
/// Runs whose y coordinates quantise to the same bucket share a row. Rows
/// are emitted top-to-bottom (descending y); within a row, items are sorted
/// ascending by x and items whose trimmed text is empty are dropped. Rows
/// with no surviving items are skipped.
pub fn reflow_lines(runs: Vec<TextRun>, page: usize) -> Vec<PdfLine> {
    let mut buckets: BTreeMap<i64, Vec<TextRun>> = BTreeMap::new();
    for run in runs {
        buckets.entry(row_key(run.y)).or_default().push(run);
    }

    let mut lines: Vec<PdfLine> = Vec::new();

    // BTreeMap iterates ascending; rows read top of page (largest y) first.
    for (_key, mut bucket) in buckets.into_iter().rev() {
        bucket.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal));

        let items: Vec<LineItem> = bucket
            .into_iter()
            .filter(|run| !run.text.trim().is_empty())
            .map(|run| LineItem {
                text: run.text,
                x: run.x,
            })
            .collect();

        if items.is_empty() {
            continue;
        }

        let text = collapse_spaces(
            &items
                .iter()
                .map(|i| i.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        );

        lines.push(PdfLine { text, items, page });
    }

    lines
}
