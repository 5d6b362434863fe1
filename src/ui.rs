use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Gauge, Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use crate::attention::{LineReadingState, LineStatus};
use crate::engine::ReadingEngine;
use crate::geometry::{FontMetrics, Viewport};
use crate::width::glyph_width;

pub const HORIZONTAL_MARGIN: u16 = 4;
const HEADER_HEIGHT: u16 = 2;
const FOOTER_HEIGHT: u16 = 1;

/// Pixel size of one terminal cell. Each cell is one estimated glyph box, so
/// line geometry in pixels lands exactly on columns and rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellGeometry {
    pub cell_width: f64,
    pub cell_height: f64,
}

impl CellGeometry {
    pub fn from_font(font: &FontMetrics) -> Self {
        Self {
            cell_width: glyph_width(font.font_size),
            cell_height: font.line_height,
        }
    }

    /// Font metrics for laying text out in cells: margins come from the
    /// terminal layout, so no padding.
    pub fn terminal_font(font: &FontMetrics) -> FontMetrics {
        FontMetrics {
            padding: 0.0,
            ..*font
        }
    }

    pub fn viewport(&self, area: Rect) -> Viewport {
        Viewport::new(
            area.x as f64 * self.cell_width,
            area.y as f64 * self.cell_height,
            area.width as f64 * self.cell_width,
            area.height as f64 * self.cell_height,
        )
    }

    /// Centre of a cell, in pixels.
    pub fn to_pixels(&self, column: u16, row: u16) -> (f64, f64) {
        (
            (column as f64 + 0.5) * self.cell_width,
            (row as f64 + 0.5) * self.cell_height,
        )
    }

    /// Where a pointer resting on a cell is taken to be looking: the trailing
    /// edge of the glyph under it, so hovering the last glyph reaches the end
    /// of the line.
    pub fn pointer_to_pixels(&self, column: u16, row: u16) -> (f64, f64) {
        (
            (column as f64 + 1.0) * self.cell_width,
            (row as f64 + 0.5) * self.cell_height,
        )
    }

    /// Pointer position over the lines of a unit. On a line's last cell the
    /// trailing edge is pinned inside the line: the line's width is summed
    /// differently and can end a float step short of the cell edge.
    pub fn pointer_on_lines(&self, column: u16, row: u16, lines: &[LineReadingState]) -> (f64, f64) {
        let (x, y) = self.pointer_to_pixels(column, row);
        let Some(line) = lines
            .iter()
            .map(|state| &state.bounds)
            .find(|bounds| bounds.top() <= y && y <= bounds.bottom())
        else {
            return (x, y);
        };
        let (last_column, _) = self.to_cell(line.right() - self.cell_width / 2.0, y);
        if column == last_column {
            (x.min(line.right()).max(line.left()), y)
        } else {
            (x, y)
        }
    }

    pub fn to_cell(&self, x: f64, y: f64) -> (u16, u16) {
        let column = (x / self.cell_width).floor().clamp(0.0, u16::MAX as f64) as u16;
        let row = (y / self.cell_height).floor().clamp(0.0, u16::MAX as f64) as u16;
        (column, row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderLayout {
    pub header: Rect,
    pub body: Rect,
    pub footer: Rect,
}

pub fn reader_layout(area: Rect) -> ReaderLayout {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints([
            Constraint::Length(HEADER_HEIGHT),
            Constraint::Min(1),
            Constraint::Length(FOOTER_HEIGHT),
        ])
        .split(area);
    ReaderLayout {
        header: chunks[0],
        body: chunks[1],
        footer: chunks[2],
    }
}

/// Draws the active unit of a reading engine.
pub struct ReaderView<'a> {
    engine: &'a ReadingEngine,
    cells: CellGeometry,
    status: Option<&'a str>,
    simulated: bool,
}

impl<'a> ReaderView<'a> {
    pub fn new(engine: &'a ReadingEngine, cells: CellGeometry) -> Self {
        Self {
            engine,
            cells,
            status: None,
            simulated: false,
        }
    }

    pub fn status(mut self, status: Option<&'a str>) -> Self {
        self.status = status;
        self
    }

    pub fn simulated(mut self, simulated: bool) -> Self {
        self.simulated = simulated;
        self
    }

    fn render_header(&self, area: Rect, buf: &mut Buffer) {
        let [title_area, gauge_area] = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Length(1)])
            .areas(area);

        let engine = self.engine;
        let position = format!(
            "unit {}/{}",
            engine.active_unit_index() + 1,
            engine.total_units()
        );
        let room = (title_area.width as usize).saturating_sub(position.width() + 2);
        let title = truncate_to_width(engine.title(), room);
        let pad = (title_area.width as usize)
            .saturating_sub(title.width() + position.width());
        Paragraph::new(Line::from(vec![
            Span::styled(title, Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" ".repeat(pad)),
            Span::styled(position, Style::default().fg(Color::Cyan)),
        ]))
        .render(title_area, buf);

        let stats = engine.progress_snapshot(0);
        let percent = stats.completion_percentage();
        Gauge::default()
            .gauge_style(Style::default().fg(Color::Green))
            .percent(u16::from(percent))
            .label(format!(
                "{}/{} read ({percent}%)",
                stats.completed_unit_indexes.len(),
                stats.total_units
            ))
            .render(gauge_area, buf);
    }

    fn render_body(&self, area: Rect, buf: &mut Buffer) {
        let engine = self.engine;
        let lines = engine.line_states();
        if lines.is_empty() {
            // No usable geometry yet; show the text plainly.
            Paragraph::new(engine.active_unit().text.trim())
                .wrap(Wrap { trim: true })
                .render(area, buf);
            return;
        }

        let read_style = Style::default().add_modifier(Modifier::DIM);
        let swept_style = Style::default().fg(Color::Green).add_modifier(Modifier::BOLD);
        let active_style = Style::default().add_modifier(Modifier::BOLD);
        let pending_style = Style::default();

        for state in lines {
            let (column, row) = self.cells.to_cell(state.bounds.x, state.bounds.y);
            if row < area.y || row >= area.bottom() || column >= area.right() {
                continue;
            }
            let max_width = area.right() - column;
            let text = state.bounds.text.as_str();
            let line = match state.status {
                LineStatus::Complete => Line::from(Span::styled(text, read_style)),
                LineStatus::InProgress => {
                    let split = split_at_progress(text, state.max_horizontal_progress);
                    Line::from(vec![
                        Span::styled(&text[..split], swept_style),
                        Span::styled(&text[split..], active_style),
                    ])
                }
                LineStatus::Pending => Line::from(Span::styled(text, pending_style)),
            };
            buf.set_line(column, row, &line, max_width);
        }
    }

    fn render_footer(&self, area: Rect, buf: &mut Buffer) {
        let italic = Style::default().add_modifier(Modifier::ITALIC);
        let text = if let Some(status) = self.status {
            Span::styled(status.to_string(), Style::default().fg(Color::Yellow))
        } else if self.engine.is_document_complete() {
            Span::styled(
                format!(
                    "finished: {} words in {} units / (←) back / (q)uit",
                    self.engine.total_words(),
                    self.engine.total_units()
                ),
                italic.fg(Color::Green),
            )
        } else if self.simulated {
            Span::styled("(simulated reader) / (←)(→) units / (q)uit", italic)
        } else {
            Span::styled("follow the text with the pointer / (←)(→) units / (q)uit", italic)
        };
        Paragraph::new(text)
            .alignment(Alignment::Left)
            .render(area, buf);
    }
}

impl Widget for ReaderView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let layout = reader_layout(area);
        self.render_header(layout.header, buf);
        self.render_body(layout.body, buf);
        self.render_footer(layout.footer, buf);
    }
}

/// Byte index splitting `text` after the share of its characters given by `progress`.
fn split_at_progress(text: &str, progress: f64) -> usize {
    let count = text.chars().count();
    let read = (progress.clamp(0.0, 1.0) * count as f64).round() as usize;
    text.char_indices()
        .nth(read)
        .map_or(text.len(), |(index, _)| index)
}

fn truncate_to_width(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    for c in text.chars() {
        if out.width() + c.to_string().width() + 1 > max {
            break;
        }
        out.push(c);
    }
    out.push('…');
    out
}
