use chrono::Local;
use ratatui::prelude::*;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Clear, Padding, Paragraph, Wrap};

use crate::app::{App, ErrorModal, Modal, Screen, StudentsScreen, TasksScreen};
use crate::canvas::{Comment, Submission};
use crate::status::{self, Lateness};
use crate::tasks::{Severity, TaskState};
use crate::theme::Theme;

const TEXT_PADDING: u16 = 1;
const HEADER_HEIGHT: u16 = 3;
const STATUS_HEIGHT: u16 = 3;
const NAME_COLUMN_WIDTH: usize = 32;
const ASSIGNMENTS_HELP: &str = "Up/Down select | Enter open | q quit";
const STUDENTS_HELP: &str = "Up/Down select | Enter grade | Ctrl+P search | Esc/b back";
const TASKS_HELP: &str =
    "d download | e extract | 0-9 environment | o editor | s speedrun | Enter run | Esc/b back";
const ERROR_HELP: &str = "Tab details | Up/Down scroll | Esc/Enter close";
const PALETTE_HELP: &str = "Type to search | Up/Down select | Enter grade | Esc close";

pub fn render(frame: &mut Frame, app: &App, theme: &Theme) {
    let [header, body, status] = Layout::vertical([
        Constraint::Length(HEADER_HEIGHT),
        Constraint::Min(0),
        Constraint::Length(STATUS_HEIGHT),
    ])
    .areas(frame.area());

    frame.render_widget(Block::default().style(Style::default().bg(theme.bg)), body);
    render_header(frame, header, app, theme);
    match app.screen() {
        Some(Screen::Students(screen)) => render_students(frame, body, app, screen, theme),
        Some(Screen::Tasks(screen)) => render_tasks(frame, body, app, screen, theme),
        Some(Screen::Assignments { selected }) => {
            render_assignments(frame, body, app, *selected, theme)
        }
        None => {}
    }
    render_notices(frame, body, app, theme);

    frame.render_widget(
        Paragraph::new(status_line_text(app))
            .style(Style::default().bg(theme.status_bg).fg(theme.muted_fg))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.status_bg))
                    .padding(Padding::uniform(TEXT_PADDING)),
            ),
        status,
    );

    if app.palette().is_some() {
        render_palette(frame, app, theme);
    }
    match app.modal() {
        Some(Modal::Loading(message)) | Some(Modal::Running(message)) => {
            render_center_overlay(frame, body, &format!("{message} {}", working_dots(app.ticks)), theme)
        }
        Some(Modal::Error(error)) => render_error_modal(frame, error, theme),
        None => {}
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App, theme: &Theme) {
    let crumbs = app.breadcrumbs();
    let mut spans = Vec::with_capacity(crumbs.len() * 2);
    for (idx, crumb) in crumbs.iter().enumerate() {
        if idx > 0 {
            spans.push(Span::styled(" › ", Style::default().fg(theme.muted_fg)));
        }
        let style = if idx + 1 == crumbs.len() {
            Style::default()
                .fg(theme.active_fg)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme.text_fg)
        };
        spans.push(Span::styled(crumb.clone(), style));
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).block(
            Block::default()
                .style(Style::default().bg(theme.panel_bg))
                .padding(Padding::uniform(TEXT_PADDING)),
        ),
        area,
    );
}

fn status_line_text(app: &App) -> &'static str {
    if matches!(app.modal(), Some(Modal::Error(_))) {
        return ERROR_HELP;
    }
    if app.palette().is_some() {
        return PALETTE_HELP;
    }
    match app.screen() {
        Some(Screen::Students(_)) => STUDENTS_HELP,
        Some(Screen::Tasks(_)) => TASKS_HELP,
        _ => ASSIGNMENTS_HELP,
    }
}

fn working_dots(ticks: u64) -> &'static str {
    const FRAMES: [&str; 6] = ["[   ]", "[.  ]", "[.. ]", "[...]", "[ ..]", "[  .]"];
    FRAMES[((ticks / 4) as usize) % FRAMES.len()]
}

/// Title line plus a window of rows that keeps `selected` visible.
fn render_list(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    rows: Vec<Line<'static>>,
    selected: usize,
    theme: &Theme,
) {
    let visible = area.height.saturating_sub(TEXT_PADDING * 2 + 2).max(1) as usize;
    let start = selected.saturating_sub(visible.saturating_sub(1));
    let mut lines = Vec::with_capacity(visible + 2);
    lines.push(Line::from(Span::styled(
        title.to_string(),
        Style::default()
            .fg(theme.active_fg)
            .add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::default());
    for (idx, row) in rows.into_iter().enumerate().skip(start).take(visible) {
        let marker = if idx == selected { "> " } else { "  " };
        let mut spans = vec![Span::styled(marker, Style::default().fg(theme.muted_fg))];
        spans.extend(row.spans);
        let mut line = Line::from(spans);
        if idx == selected {
            line = line.style(Style::default().bg(theme.highlight_bg));
        }
        lines.push(line);
    }
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .style(Style::default().bg(theme.bg).fg(theme.text_fg))
                .padding(Padding::uniform(TEXT_PADDING)),
        ),
        area,
    );
}

fn render_assignments(frame: &mut Frame, area: Rect, app: &App, selected: usize, theme: &Theme) {
    let rows = app
        .assignments()
        .iter()
        .map(|assignment| {
            let mut spans = vec![Span::styled(
                pad(&assignment.name, NAME_COLUMN_WIDTH),
                Style::default().fg(theme.text_fg),
            )];
            if let Some(due_at) = assignment.due_at {
                spans.push(Span::styled(
                    format!(
                        "due {}",
                        due_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                    ),
                    Style::default().fg(theme.muted_fg),
                ));
            }
            Line::from(spans)
        })
        .collect();
    render_list(frame, area, "Please select an assignment", rows, selected, theme);
}

fn render_students(
    frame: &mut Frame,
    area: Rect,
    app: &App,
    screen: &StudentsScreen,
    theme: &Theme,
) {
    let rows = app
        .students()
        .iter()
        .zip(&screen.rows)
        .map(|(student, row)| {
            let mut spans = vec![Span::styled(
                pad(&student.name, NAME_COLUMN_WIDTH),
                Style::default().fg(theme.text_fg),
            )];
            match row {
                Some(submission) => spans.extend(submission_badges(app, submission, student.id, theme)),
                None if screen.loading => {
                    spans.push(Span::styled("...", Style::default().fg(theme.muted_fg)))
                }
                None => {}
            }
            Line::from(spans)
        })
        .collect();
    render_list(frame, area, "Please select a student", rows, screen.selected, theme);
}

pub(crate) fn submission_badges(
    app: &App,
    submission: &Submission,
    student_id: u64,
    theme: &Theme,
) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    let (own, others) = submission.comment_counts(student_id);
    let comments = status::comment_badge(own, others);
    if !comments.is_empty() {
        spans.push(Span::styled(
            format!("{comments} "),
            Style::default().fg(theme.info_fg),
        ));
    }
    if let Some(grade) = status::grade_badge(app.config(), submission.grade.as_deref()) {
        spans.push(Span::styled(
            format!("{} ", grade.label),
            Style::default().fg(theme.badge_color(grade.style)),
        ));
    }
    let lateness = Lateness::classify(submission);
    spans.push(Span::styled(
        lateness.label(),
        Style::default().fg(theme.badge_color(lateness.style())),
    ));
    spans
}

fn render_tasks(frame: &mut Frame, area: Rect, app: &App, screen: &TasksScreen, theme: &Theme) {
    let rows = screen
        .slots
        .iter()
        .map(|slot| {
            let (marker, color) = match slot.state {
                TaskState::Idle => ("  ", theme.muted_fg),
                TaskState::Running => ("… ", theme.warning_fg),
                TaskState::Success => ("✓ ", theme.success_fg),
                TaskState::Failed => ("✗ ", theme.error_fg),
            };
            Line::from(vec![
                Span::styled(marker, Style::default().fg(color)),
                Span::styled(
                    format!("[{}] ", slot.shortcut),
                    Style::default().fg(theme.muted_fg),
                ),
                Span::styled(slot.title.clone(), Style::default().fg(theme.text_fg)),
            ])
        })
        .collect();

    let [summary, list] =
        Layout::vertical([Constraint::Length(4), Constraint::Min(0)]).areas(area);
    let submission = app
        .students_screen()
        .and_then(|students| students.rows.get(screen.student))
        .and_then(Option::as_ref);
    let student_id = app
        .students()
        .get(screen.student)
        .map_or(0, |student| student.id);
    let mut summary_spans = vec![Span::styled(
        "Submission: ",
        Style::default().fg(theme.muted_fg),
    )];
    match submission {
        Some(submission) => summary_spans.extend(submission_badges(app, submission, student_id, theme)),
        None => summary_spans.push(Span::styled("unknown", Style::default().fg(theme.muted_fg))),
    }
    if let Some(attempt) = submission
        .and_then(Submission::latest_attempt)
        .and_then(|latest| latest.attempt)
    {
        summary_spans.push(Span::styled(
            format!("  attempt {attempt}"),
            Style::default().fg(theme.muted_fg),
        ));
    }
    if !screen.assignment.submission_types.is_empty() {
        summary_spans.push(Span::styled(
            format!("  accepts {}", screen.assignment.submission_types.join(", ")),
            Style::default().fg(theme.muted_fg),
        ));
    }
    if screen.speedrun_active() {
        summary_spans.push(Span::styled(
            "  speedrun",
            Style::default().fg(theme.warning_fg),
        ));
    }
    let mut lines = vec![Line::from(summary_spans)];
    if let Some(comment) = submission.and_then(|submission| submission.comments.last()) {
        lines.push(latest_comment_line(comment, theme));
    }
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .style(Style::default().bg(theme.bg))
                .padding(Padding::new(TEXT_PADDING, TEXT_PADDING, TEXT_PADDING, 0)),
        ),
        summary,
    );
    render_list(frame, list, "Please select a task", rows, screen.selected, theme);
}

fn latest_comment_line(comment: &Comment, theme: &Theme) -> Line<'static> {
    let when = comment
        .created_at
        .map(|at| format!(" ({})", at.with_timezone(&Local).format("%Y-%m-%d %H:%M")))
        .unwrap_or_default();
    let body = comment.comment.lines().next().unwrap_or_default();
    Line::from(vec![
        Span::styled(
            format!("Last comment by {}{when}: ", comment.author_name),
            Style::default().fg(theme.muted_fg),
        ),
        Span::styled(body.to_string(), Style::default().fg(theme.text_fg)),
    ])
}

fn render_notices(frame: &mut Frame, body: Rect, app: &App, theme: &Theme) {
    let notices = app.notices();
    if notices.is_empty() {
        return;
    }
    let width = 48u16.min(body.width);
    let height = (notices.len() as u16 + 2).min(body.height);
    let area = Rect::new(
        body.x + body.width.saturating_sub(width),
        body.y + body.height.saturating_sub(height),
        width,
        height,
    );
    let lines = notices
        .iter()
        .map(|notice| {
            let color = match notice.severity {
                Severity::Information => theme.info_fg,
                Severity::Warning => theme.warning_fg,
                Severity::Error => theme.error_fg,
            };
            Line::from(Span::styled(notice.message.clone(), Style::default().fg(color)))
        })
        .collect::<Vec<_>>();
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .style(Style::default().bg(theme.panel_bg))
                .padding(Padding::uniform(TEXT_PADDING)),
        ),
        area,
    );
}

fn render_center_overlay(frame: &mut Frame, area: Rect, text: &str, theme: &Theme) {
    let width = (text.chars().count() as u16 + 4).min(area.width).max(20);
    let overlay = centered_rect(area, width, 3);
    frame.render_widget(Clear, overlay);
    frame.render_widget(
        Paragraph::new(text)
            .alignment(Alignment::Center)
            .style(Style::default().fg(theme.warning_fg))
            .block(
                Block::default()
                    .style(Style::default().bg(theme.panel_bg))
                    .padding(Padding::uniform(1)),
            ),
        overlay,
    );
}

fn render_error_modal(frame: &mut Frame, error: &ErrorModal, theme: &Theme) {
    let area = frame.area();
    let height = if error.expanded {
        area.height.saturating_sub(4).max(8)
    } else {
        8
    };
    let overlay = centered_rect(area, area.width.saturating_sub(8).min(100), height);

    let mut lines = vec![
        Line::from(Span::styled(
            error.title.clone(),
            Style::default()
                .fg(theme.error_fg)
                .add_modifier(Modifier::BOLD),
        )),
        Line::default(),
        Line::from(Span::styled(
            error.message.clone(),
            Style::default().fg(theme.text_fg),
        )),
    ];
    if let Some(details) = &error.details {
        lines.push(Line::default());
        let toggle = if error.expanded {
            "▼ Details (Tab to hide)"
        } else {
            "▶ Details (Tab to show)"
        };
        lines.push(Line::from(Span::styled(
            toggle,
            Style::default().fg(theme.muted_fg),
        )));
        if error.expanded {
            lines.extend(
                details
                    .lines()
                    .skip(error.scroll as usize)
                    .map(|line| Line::from(Span::styled(line.to_string(), Style::default().fg(theme.text_fg)))),
            );
        }
    }

    frame.render_widget(Clear, overlay);
    frame.render_widget(
        Paragraph::new(lines).wrap(Wrap { trim: false }).block(
            Block::default()
                .style(Style::default().bg(theme.panel_bg))
                .padding(Padding::uniform(TEXT_PADDING)),
        ),
        overlay,
    );
}

fn render_palette(frame: &mut Frame, app: &App, theme: &Theme) {
    let Some(palette) = app.palette() else {
        return;
    };
    let hits = app.palette_hits();
    let area = frame.area();
    let width = area.width.min(70).max(30);
    let shown = (hits.len() as u16).min(area.height.saturating_sub(10).max(1));
    let height = shown.saturating_add(4).min(area.height);
    let x = area.x.saturating_add(area.width.saturating_sub(width) / 2);
    let overlay = Rect::new(x, area.y.saturating_add(HEADER_HEIGHT), width, height);

    let start = palette
        .selected
        .saturating_sub((shown as usize).saturating_sub(1));
    let mut lines = Vec::with_capacity(shown as usize + 1);
    lines.push(Line::from(vec![
        Span::styled("> ", Style::default().fg(theme.muted_fg)),
        Span::styled(palette.query.clone(), Style::default().fg(theme.active_fg)),
        Span::styled("▏", Style::default().fg(theme.muted_fg)),
    ]));
    for (idx, hit) in hits.iter().enumerate().skip(start).take(shown as usize) {
        let selected = idx == palette.selected;
        let base = if selected {
            Style::default().fg(theme.active_fg).bg(theme.highlight_bg)
        } else {
            Style::default().fg(theme.text_fg)
        };
        let spans = hit
            .command
            .chars()
            .enumerate()
            .map(|(pos, c)| {
                let style = if hit.positions.contains(&pos) {
                    base.fg(theme.warning_fg).add_modifier(Modifier::BOLD)
                } else {
                    base
                };
                Span::styled(c.to_string(), style)
            })
            .collect::<Vec<_>>();
        lines.push(Line::from(spans));
    }

    frame.render_widget(Clear, overlay);
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .style(Style::default().bg(theme.panel_bg))
                .padding(Padding::uniform(TEXT_PADDING)),
        ),
        overlay,
    );
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + area.width.saturating_sub(width) / 2,
        area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    )
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len >= width {
        let truncated = text.chars().take(width.saturating_sub(2)).collect::<String>();
        format!("{truncated}… ")
    } else {
        format!("{text}{}", " ".repeat(width - len + 1))
    }
}

#[cfg(test)]
#[path = "../tests/unit/ui_tests.rs"]
mod tests;
