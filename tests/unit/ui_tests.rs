use super::*;
use std::path::Path;
use std::sync::Arc;

use ratatui::Terminal;
use ratatui::backend::TestBackend;
use ratatui::buffer::Buffer;

use crate::app::StartupData;
use crate::canvas::{Assignment, Attempt, Comment, Course, Student};
use crate::config::Config;
use crate::events::AppEvent;
use crate::status::StatusEvent;
use crate::tasks::{TaskError, TaskEvent};

fn render_text(app: &App, width: u16, height: u16) -> String {
    let backend = TestBackend::new(width, height);
    let mut terminal = Terminal::new(backend).expect("test terminal should initialize");
    let theme = Theme::default();
    terminal
        .draw(|frame| render(frame, app, &theme))
        .expect("render should succeed");
    buffer_to_string(terminal.backend().buffer())
}

fn buffer_to_string(buffer: &Buffer) -> String {
    let mut text = String::new();
    for y in 0..buffer.area.height {
        for x in 0..buffer.area.width {
            text.push_str(buffer[(x, y)].symbol());
        }
        text.push('\n');
    }
    text
}

fn loaded_app() -> App {
    let config = Config::from_toml_str(
        "server = \"x\"\ncourse_id = 1\nassignment_group = \"A\"\n",
        Path::new("/course/grading.toml"),
    )
    .expect("config");
    let mut app = App::new(Arc::new(config));
    app.on_startup_loaded(Ok(StartupData {
        course: Course {
            id: 1,
            name: "Physics".to_string(),
            term: "Fall".to_string(),
        },
        assignments: vec![Assignment {
            id: 3,
            name: "Pythondaq".to_string(),
            submission_types: Vec::new(),
            due_at: None,
        }],
        students: vec![Student {
            id: 7,
            name: "Ada Lovelace".to_string(),
            sortable_name: "Lovelace, Ada".to_string(),
        }],
    }));
    app
}

#[test]
fn renders_loading_overlay_before_startup() {
    let config = Config::from_toml_str(
        "server = \"x\"\ncourse_id = 1\nassignment_group = \"A\"\n",
        Path::new("/course/grading.toml"),
    )
    .expect("config");
    let app = App::new(Arc::new(config));
    let text = render_text(&app, 100, 20);
    assert!(text.contains("Fetching assignments and students..."));
}

#[test]
fn loading_overlay_uses_theme_colors() {
    let config = Config::from_toml_str(
        "server = \"x\"\ncourse_id = 1\nassignment_group = \"A\"\n",
        Path::new("/course/grading.toml"),
    )
    .expect("config");
    let app = App::new(Arc::new(config));
    let theme = Theme::light();
    let mut terminal = Terminal::new(TestBackend::new(100, 20)).expect("test terminal should initialize");
    terminal
        .draw(|frame| render(frame, &app, &theme))
        .expect("render should succeed");
    let buffer = terminal.backend().buffer();

    let word = "Fetching";
    let start = (0..buffer.area.height)
        .flat_map(|y| (0..buffer.area.width).map(move |x| (x, y)))
        .find(|&(x, y)| {
            x + word.len() as u16 <= buffer.area.width
                && word
                    .chars()
                    .enumerate()
                    .all(|(i, c)| buffer[(x + i as u16, y)].symbol() == c.to_string())
        })
        .expect("overlay text");
    let cell = &buffer[start];
    assert_eq!(cell.fg, theme.warning_fg);
    assert_eq!(cell.bg, theme.panel_bg);
}

#[test]
fn renders_assignment_list_with_breadcrumb_and_help() {
    let app = loaded_app();
    let text = render_text(&app, 100, 20);
    assert!(text.contains("Physics - Fall"));
    assert!(text.contains("Please select an assignment"));
    assert!(text.contains("> Pythondaq"));
    assert!(text.contains("q quit"));
}

#[test]
fn renders_student_badges_once_status_arrives() {
    let mut app = loaded_app();
    let generation = match app.handle_event(AppEvent::Submit) {
        Some(crate::app::Effect::FetchStatuses { generation, .. }) => generation,
        other => panic!("status fetch expected, got {other:?}"),
    };
    assert!(render_text(&app, 100, 20).contains("..."));

    app.on_status_event(StatusEvent::Updated {
        generation,
        index: 0,
        submission: Box::new(Submission {
            attempt: Some(1),
            seconds_late: 0,
            attempts: vec![Attempt {
                attempt: Some(1),
                seconds_late: 1_200,
            }],
            comments: vec![Comment {
                author_id: Some(7),
                author_name: "Ada Lovelace".to_string(),
                created_at: None,
                comment: "done".to_string(),
            }],
            grade: Some("Goed".to_string()),
            attachments: Vec::new(),
        }),
    });

    let text = render_text(&app, 120, 20);
    assert!(text.contains("Ada Lovelace"));
    assert!(text.contains("(1)"));
    assert!(text.contains("✓ Goed"));
    assert!(text.contains("20 minutes late"));
    assert!(text.contains("Physics - Fall › Pythondaq"));

    app.handle_event(AppEvent::Submit);
    let tasks = render_text(&app, 120, 24);
    assert!(tasks.contains("attempt 1"));
    assert!(tasks.contains("Last comment by Ada Lovelace: done"));
}

#[test]
fn renders_task_list_and_error_details_on_demand() {
    let mut app = loaded_app();
    app.handle_event(AppEvent::Submit);
    app.handle_event(AppEvent::Submit);
    let text = render_text(&app, 120, 24);
    assert!(text.contains("[d] Download submission"));
    assert!(text.contains("[o] Open Visual Studio Code"));
    assert!(text.contains("s speedrun"));

    app.handle_event(AppEvent::InputChar('d'));
    assert!(render_text(&app, 120, 24).contains("Downloading submission..."));

    app.on_task_event(TaskEvent::Finished {
        slot: 0,
        result: Err(TaskError::with_details("boom", "captured output line")),
    });
    let collapsed = render_text(&app, 120, 24);
    assert!(collapsed.contains("Download failed"));
    assert!(collapsed.contains("Details (Tab to show)"));
    assert!(!collapsed.contains("captured output line"));

    app.handle_event(AppEvent::ToggleDetails);
    assert!(render_text(&app, 120, 24).contains("captured output line"));
}

#[test]
fn renders_palette_hits() {
    let mut app = loaded_app();
    app.handle_event(AppEvent::Submit);
    app.handle_event(AppEvent::OpenPalette);
    app.handle_event(AppEvent::InputChar('a'));
    let text = render_text(&app, 100, 20);
    assert!(text.contains("grade Ada Lovelace"));
    assert!(text.contains("Esc close"));
}

#[test]
fn pads_and_truncates_names() {
    assert_eq!(pad("Ada", 5), "Ada   ");
    assert_eq!(pad("Ada Lovelace", 6), "Ada … ");
}
