use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style, Modifier},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use clickflow_core::platform::hotkey::EMERGENCY_COMBO;

use crate::App;
use crate::app::{RunState, StepStatus};

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = if app.log_visible {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(f.area())
    } else {
        Layout::default()
            .constraints([Constraint::Percentage(100)])
            .split(f.area())
    };

    // -- Left panel: steps --

    let (banner_label, banner_bg) = match app.run_state {
        RunState::Running => ("RUNNING (p pause, s stop, x emergency)", Color::Green),
        RunState::Paused => ("PAUSED (p resume, s stop)", Color::Yellow),
        RunState::Stopped => ("STOPPED (r run again)", Color::Red),
        RunState::Idle => ("IDLE (r run)", Color::DarkGray),
    };

    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
    let mut lines: Vec<Line> = vec![
        Line::from(vec![
            Span::raw(" "),
            key("l"),
            Span::raw(" log, "),
            key("q"),
            Span::raw(" quit, "),
            key(EMERGENCY_COMBO),
            Span::raw(" emergency stop anywhere"),
        ]),
        Line::from(vec![
            Span::styled(" workflow ", Style::default().fg(Color::DarkGray)),
            Span::raw(
                app.workflow_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(none)".to_string()),
            ),
            Span::styled(
                format!("  loop {}/{}", app.loops_done, app.workflow.global_loop_count),
                Style::default().fg(Color::Cyan),
            ),
        ]),
        Line::from(""),
    ];

    for (i, row) in app.rows.iter().enumerate() {
        let (mark, color, detail) = match &row.status {
            StepStatus::Pending => ("  ", Color::DarkGray, String::new()),
            StepStatus::Running => ("> ", Color::Green, String::new()),
            StepStatus::Done(Some(t)) => ("✓ ", Color::Cyan, format!(" {:.1}s", t.as_secs_f64())),
            StepStatus::Done(None) => ("✓ ", Color::Cyan, String::new()),
            StepStatus::Error(msg) => ("✗ ", Color::Red, format!(" {}", msg)),
        };
        lines.push(Line::from(vec![
            Span::styled(mark, Style::default().fg(color)),
            Span::styled(format!("{:>3} ", i + 1), Style::default().fg(Color::DarkGray)),
            Span::styled(
                row.name.clone(),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("  {}", row.kind), Style::default().fg(Color::DarkGray)),
            Span::styled(detail, Style::default().fg(color)),
        ]));
    }

    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(chunks[0]);

    // Full-width centered banner
    let banner_width = left_chunks[0].width as usize;
    let pad_total = banner_width.saturating_sub(banner_label.len());
    let pad_left = pad_total / 2;
    let pad_right = pad_total - pad_left;
    let centered_banner = format!("{}{}{}", " ".repeat(pad_left), banner_label, " ".repeat(pad_right));
    let banner = Paragraph::new(Line::from(Span::styled(
        centered_banner,
        Style::default().fg(Color::Black).bg(banner_bg).add_modifier(Modifier::BOLD),
    )));
    f.render_widget(banner, left_chunks[0]);

    let step_list = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(step_list, left_chunks[1]);

    // -- Right panel: logs --
    if app.log_visible && chunks.len() > 1 {
        let visible_height = chunks[1].height.saturating_sub(2) as usize;
        let total = app.log_messages.len();
        let max_scroll = total.saturating_sub(visible_height);
        let scroll = app.log_scroll.min(max_scroll);
        let start = total.saturating_sub(visible_height + scroll);
        let end = total.saturating_sub(scroll);
        let log_lines: Vec<Line> = app.log_messages[start..end]
            .iter()
            .map(|m| parse_log_line(m))
            .collect();

        let log_panel = Paragraph::new(log_lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Log ")
                    .border_style(Style::default().fg(Color::Yellow)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(log_panel, chunks[1]);
    }
}

/// Turn a structured logger line (level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage)
/// into a coloured line.
fn parse_log_line(raw: &str) -> Line<'_> {
    let parts: Vec<&str> = raw.splitn(5, '\x1f').collect();
    if parts.len() < 5 {
        return Line::from(raw);
    }

    let (level, prefix, timestamp, message) = (parts[0], parts[1], parts[3], parts[4]);
    let color = match parts[2].parse::<u8>().unwrap_or(0) {
        1 => Color::DarkGray,  // COLOR_GRAY
        2 => Color::LightBlue, // COLOR_BLUE
        3 => Color::Green,     // COLOR_GREEN
        _ => Color::White,
    };

    let mut spans = vec![
        Span::styled(timestamp, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
    ];
    match level {
        "ERROR" => spans.push(Span::styled("error ", Style::default().fg(Color::Red))),
        "WARN" => spans.push(Span::styled("warn ", Style::default().fg(Color::Yellow))),
        _ => {}
    }
    if !prefix.is_empty() {
        spans.push(Span::styled(prefix, Style::default().fg(color).add_modifier(Modifier::BOLD)));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(message, Style::default().fg(color)));

    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_line_fields() {
        let line = parse_log_line("WARN\x1fexec\x1f2\x1f12:00:01\x1fLoop End has no Loop Start");
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "12:00:01 warn exec Loop End has no Loop Start");
    }

    #[test]
    fn test_parse_log_line_unstructured() {
        let line = parse_log_line("plain");
        assert_eq!(line.spans.len(), 1);
    }
}
