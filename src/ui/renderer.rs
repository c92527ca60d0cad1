//! Draws the widget in the bottom-right corner of the terminal.
//!
//! ```text
//! ⬇ 12.50 Mb/s   ╭ download graph ╮
//! ⬆  3.25 Mb/s   │                │
//! ↓ 95.10 Mb/s   │  upload graph  │
//! ↑ 10.20 Mb/s   ╰                ╯
//! ◐ Speedtest: 95.1↓ | 10.2↑ Mb/s
//!  s test  h hide  +- alpha  q quit
//! ```

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Line as CanvasLine},
        Block, Paragraph,
    },
    Frame,
};

use super::state::WidgetState;
use super::theme::Theme;
use crate::constants::{WIDGET_HEIGHT, WIDGET_TEXT_WIDTH, WIDGET_WIDTH};
use crate::models::SampleTick;
use crate::utils::{format_mbps, spinner_char};

/// Where the widget sits inside `area`: bottom-right, shrunk to fit.
pub fn widget_rect(area: Rect) -> Rect {
    let width = WIDGET_WIDTH.min(area.width);
    let height = WIDGET_HEIGHT.min(area.height);
    Rect {
        x: area.x + area.width - width,
        y: area.y + area.height - height,
        width,
        height,
    }
}

pub fn render(frame: &mut Frame, state: &WidgetState) {
    if !state.is_shown() {
        return;
    }
    let t = Theme::new(state.opacity);
    let area = widget_rect(frame.area());
    frame.render_widget(Block::default().style(Style::default().bg(t.background)), area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // readouts + graph
            Constraint::Length(1), // summary
            Constraint::Length(1), // message / key hints
        ])
        .split(area);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(WIDGET_TEXT_WIDTH), Constraint::Min(4)])
        .split(rows[0]);

    render_readouts(frame, body[0], state, &t);
    render_graph(frame, body[1], state, &t);
    render_summary(frame, rows[1], state, &t);
    render_message(frame, rows[2], state, &t);
}

fn render_readouts(frame: &mut Frame, area: Rect, state: &WidgetState, t: &Theme) {
    let live = |arrow: &str, value: f64, color: Color| -> Line {
        Line::from(vec![
            Span::styled(format!("{} ", arrow), t.fg(color)),
            Span::styled(format!("{:>6}", format_mbps(value)), t.value(color)),
            Span::styled(" Mb/s", t.fg(t.unit)),
        ])
    };

    let lines = vec![
        live("⬇", state.down_mbps, t.download),
        live("⬆", state.up_mbps, t.upload),
        Line::from(Span::styled(state.down_readout(), t.fg(t.download))),
        Line::from(Span::styled(state.up_readout(), t.fg(t.upload))),
    ];
    frame.render_widget(Paragraph::new(lines).style(t.fg(t.unit)), area);
}

/// Which series a graph segment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Download,
    Upload,
    /// Ends at a sample whose ping failed.
    Loss,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub kind: SegmentKind,
}

/// Polyline segments in a `[0, len-1] x [0, 2]` space: download in the
/// upper half, upload in the lower half, both scaled by `scale`.
pub fn graph_segments(window: &[SampleTick], scale: f64) -> Vec<Segment> {
    let scale = if scale > 0.0 { scale } else { 1.0 };
    let norm = |v: f64| (v / scale).clamp(0.0, 1.0);

    let mut segments = Vec::with_capacity(window.len().saturating_sub(1) * 2);
    for (i, pair) in window.windows(2).enumerate() {
        let (prev, cur) = (&pair[0], &pair[1]);
        let (x1, x2) = (i as f64, (i + 1) as f64);
        let loss = !cur.ping_ok;
        let pick = |base| if loss { SegmentKind::Loss } else { base };

        segments.push(Segment {
            x1,
            y1: 1.0 + norm(prev.download_mbps),
            x2,
            y2: 1.0 + norm(cur.download_mbps),
            kind: pick(SegmentKind::Download),
        });
        segments.push(Segment {
            x1,
            y1: norm(prev.upload_mbps),
            x2,
            y2: norm(cur.upload_mbps),
            kind: pick(SegmentKind::Upload),
        });
    }
    segments
}

fn render_graph(frame: &mut Frame, area: Rect, state: &WidgetState, t: &Theme) {
    let segments = graph_segments(&state.window, state.scale);
    let x_max = state.window.len().saturating_sub(1).max(1) as f64;
    let t = *t;

    let canvas = Canvas::default()
        .background_color(t.background)
        .marker(Marker::Braille)
        .x_bounds([0.0, x_max])
        .y_bounds([0.0, 2.0])
        .paint(move |ctx| {
            for s in &segments {
                let color = match s.kind {
                    SegmentKind::Download => t.faded(t.download),
                    SegmentKind::Upload => t.faded(t.upload),
                    SegmentKind::Loss => t.faded(t.loss),
                };
                ctx.draw(&CanvasLine {
                    x1: s.x1,
                    y1: s.y1,
                    x2: s.x2,
                    y2: s.y2,
                    color,
                });
            }
        });
    frame.render_widget(canvas, area);
}

fn render_summary(frame: &mut Frame, area: Rect, state: &WidgetState, t: &Theme) {
    let mut spans = Vec::new();
    if state.busy {
        spans.push(Span::styled(
            format!("{} ", spinner_char(state.tick_count)),
            t.fg(t.accent).add_modifier(Modifier::BOLD),
        ));
    }
    spans.push(Span::styled(state.summary.clone(), t.fg(t.unit)));
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_message(frame: &mut Frame, area: Rect, state: &WidgetState, t: &Theme) {
    let line = match state.active_status() {
        Some(msg) => Line::from(Span::styled(
            msg.to_string(),
            t.fg(t.accent).add_modifier(Modifier::BOLD),
        )),
        None => {
            let badge = |key: &str| -> Span {
                Span::styled(
                    format!(" {} ", key),
                    Style::default()
                        .fg(t.background)
                        .bg(t.faded(t.accent))
                        .add_modifier(Modifier::BOLD),
                )
            };
            let dim = |text: &str| -> Span { Span::styled(text.to_string(), t.dim()) };
            Line::from(vec![
                badge("s"),
                dim(" test "),
                badge("h"),
                dim(" hide "),
                badge("+-"),
                dim(" alpha "),
                badge("q"),
                dim(" quit"),
            ])
        }
    };
    frame.render_widget(Paragraph::new(line), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Throughput;
    use chrono::Utc;
    use ratatui::{backend::TestBackend, Terminal};

    fn tick(down: f64, up: f64, ping_ok: bool) -> SampleTick {
        SampleTick::new(
            Utc::now(),
            Throughput {
                down_mbps: down,
                up_mbps: up,
            },
            ping_ok,
        )
    }

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    #[test]
    fn widget_sits_in_bottom_right_corner() {
        let r = widget_rect(Rect::new(0, 0, 100, 30));
        assert_eq!(r, Rect::new(100 - WIDGET_WIDTH, 30 - WIDGET_HEIGHT, WIDGET_WIDTH, WIDGET_HEIGHT));
    }

    #[test]
    fn widget_shrinks_in_small_terminals() {
        let r = widget_rect(Rect::new(0, 0, 20, 3));
        assert_eq!(r, Rect::new(0, 0, 20, 3));
    }

    #[test]
    fn segments_split_halves_and_mark_loss() {
        let window = vec![tick(10.0, 5.0, true), tick(5.0, 10.0, false), tick(0.0, 0.0, true)];
        let segs = graph_segments(&window, 10.0);
        assert_eq!(segs.len(), 4);

        // Download in the upper half
        assert_eq!(segs[0].y1, 2.0);
        assert_eq!(segs[0].y2, 1.5);
        // Upload in the lower half
        assert_eq!(segs[1].y1, 0.5);
        assert_eq!(segs[1].y2, 1.0);
        // The segment ending at the failed ping is red in both series
        assert_eq!(segs[0].kind, SegmentKind::Loss);
        assert_eq!(segs[1].kind, SegmentKind::Loss);
        assert_eq!(segs[2].kind, SegmentKind::Download);
        assert_eq!(segs[3].kind, SegmentKind::Upload);
    }

    #[test]
    fn single_sample_draws_nothing() {
        assert!(graph_segments(&[tick(1.0, 1.0, true)], 1.0).is_empty());
    }

    #[test]
    fn renders_labels_and_summary() {
        let mut terminal = Terminal::new(TestBackend::new(60, 12)).unwrap();
        let mut state = WidgetState::default();
        state.down_mbps = 12.5;
        terminal.draw(|f| render(f, &state)).unwrap();

        let text = buffer_text(&terminal);
        assert!(text.contains("12.50"));
        assert!(text.contains("Speedtest: --"));
        assert!(text.contains("-- Mb/s"));
    }

    #[test]
    fn hidden_widget_leaves_screen_blank() {
        let mut terminal = Terminal::new(TestBackend::new(60, 12)).unwrap();
        let mut state = WidgetState::default();
        state.visible = false;
        terminal.draw(|f| render(f, &state)).unwrap();
        assert!(buffer_text(&terminal).trim().is_empty());
    }
}
