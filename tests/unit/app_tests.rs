use super::*;
use std::path::Path;
use std::time::Duration;

use crate::canvas::Attempt;

const CONFIG: &str = r#"
server = "canvas.example.edu"
course_id = 1
assignment_group = "ECPC"

[env.base]
python_version = "3.12"
"#;

fn config() -> Arc<Config> {
    Arc::new(Config::from_toml_str(CONFIG, Path::new("/course/grading.toml")).expect("config"))
}

fn student(id: u64, name: &str) -> Student {
    Student {
        id,
        name: name.to_string(),
        sortable_name: name.to_string(),
    }
}

fn startup() -> StartupData {
    StartupData {
        course: Course {
            id: 1,
            name: "ECPC".to_string(),
            term: "2024-2025".to_string(),
        },
        assignments: vec![
            Assignment {
                id: 10,
                name: "Week 1".to_string(),
                submission_types: Vec::new(),
                due_at: None,
            },
            Assignment {
                id: 11,
                name: "Week 2".to_string(),
                submission_types: Vec::new(),
                due_at: None,
            },
        ],
        students: vec![
            student(1, "Anna Bakker"),
            student(2, "Jan de Vries"),
            student(3, "Piet Jansen"),
        ],
    }
}

fn loaded_app() -> App {
    let mut app = App::new(config());
    app.on_startup_loaded(Ok(startup()));
    app
}

fn submission(grade: &str) -> Box<Submission> {
    Box::new(Submission {
        attempt: Some(1),
        seconds_late: 0,
        attempts: vec![Attempt {
            attempt: Some(1),
            seconds_late: 0,
        }],
        comments: Vec::new(),
        grade: Some(grade.to_string()),
        attachments: Vec::new(),
    })
}

fn generation_of(effect: &Option<Effect>) -> u64 {
    match effect {
        Some(Effect::FetchStatuses { generation, .. }) => *generation,
        other => panic!("expected a status fetch, got {other:?}"),
    }
}

fn open_tasks_for_second_student(app: &mut App) {
    app.handle_event(AppEvent::Submit);
    app.handle_event(AppEvent::MoveDown);
    app.handle_event(AppEvent::Submit);
    assert!(matches!(app.screen(), Some(Screen::Tasks(_))));
}

fn finish(app: &mut App, slot: usize, result: Result<(), TaskError>) -> Option<Effect> {
    app.on_task_event(TaskEvent::Finished { slot, result })
}

fn slot_states(app: &App) -> Vec<TaskState> {
    match app.screen() {
        Some(Screen::Tasks(screen)) => screen.slots.iter().map(|slot| slot.state).collect(),
        _ => panic!("tasks screen expected"),
    }
}

#[test]
fn loading_overlay_swallows_input_until_startup_completes() {
    let mut app = App::new(config());
    assert_eq!(
        app.modal(),
        Some(&Modal::Loading(LOADING_MESSAGE.to_string()))
    );
    assert!(app.handle_event(AppEvent::Submit).is_none());

    app.on_startup_loaded(Ok(startup()));
    assert!(app.modal().is_none());
    assert_eq!(app.breadcrumbs(), vec!["ECPC - 2024-2025".to_string()]);
}

#[test]
fn startup_failure_stops_the_app() {
    let mut app = App::new(config());
    app.on_startup_loaded(Err("assignment group 'ECPC' not found".to_string()));
    assert!(!app.running);
    assert_eq!(app.fatal_error(), Some("assignment group 'ECPC' not found"));
}

#[test]
fn opening_an_assignment_starts_a_status_fetch() {
    let mut app = loaded_app();
    app.handle_event(AppEvent::MoveDown);
    let effect = app.handle_event(AppEvent::Submit);

    match effect {
        Some(Effect::FetchStatuses {
            assignment,
            students,
            generation,
            cancel,
        }) => {
            assert_eq!(assignment.name, "Week 2");
            assert_eq!(students.len(), 3);
            assert_eq!(generation, 1);
            assert!(!cancel.is_cancelled());
        }
        other => panic!("unexpected effect {other:?}"),
    }
    assert_eq!(
        app.breadcrumbs(),
        vec!["ECPC - 2024-2025".to_string(), "Week 2".to_string()]
    );
}

#[test]
fn status_updates_fill_rows_and_stale_generations_are_dropped() {
    let mut app = loaded_app();
    let first = app.handle_event(AppEvent::Submit);
    let first_generation = generation_of(&first);
    let Some(Effect::FetchStatuses { cancel, .. }) = first else {
        panic!("status fetch expected");
    };

    app.handle_event(AppEvent::Back);
    assert!(cancel.is_cancelled());
    assert!(matches!(app.screen(), Some(Screen::Assignments { .. })));

    let second_generation = generation_of(&app.handle_event(AppEvent::Submit));
    assert_ne!(first_generation, second_generation);

    app.on_status_event(StatusEvent::Updated {
        generation: first_generation,
        index: 0,
        submission: submission("Goed"),
    });
    app.on_status_event(StatusEvent::Updated {
        generation: second_generation,
        index: 2,
        submission: submission("Fantastisch"),
    });

    let screen = app.students_screen().expect("students screen");
    assert!(screen.rows[0].is_none());
    assert_eq!(
        screen.rows[2].as_ref().and_then(|row| row.grade.as_deref()),
        Some("Fantastisch")
    );
    assert!(screen.loading);

    app.on_status_event(StatusEvent::Finished {
        generation: second_generation,
        elapsed: Duration::from_millis(1500),
        cancelled: false,
    });
    assert!(!app.students_screen().expect("students screen").loading);
    assert_eq!(
        app.notices().last().map(|notice| notice.message.as_str()),
        Some("Fetched 1 submission(s) in 1.5s")
    );
}

#[test]
fn rows_survive_a_visit_to_the_task_list() {
    let mut app = loaded_app();
    let generation = generation_of(&app.handle_event(AppEvent::Submit));
    app.on_status_event(StatusEvent::Updated {
        generation,
        index: 1,
        submission: submission("Goed"),
    });

    app.handle_event(AppEvent::MoveDown);
    app.handle_event(AppEvent::Submit);
    assert_eq!(
        app.breadcrumbs().last().map(String::as_str),
        Some("Jan de Vries")
    );
    app.handle_event(AppEvent::InputChar('b'));

    let screen = app.students_screen().expect("students screen");
    assert!(matches!(app.screen(), Some(Screen::Students(_))));
    assert!(screen.rows[1].is_some());
    assert_eq!(screen.selected, 1);
}

#[test]
fn shortcut_runs_task_and_running_overlay_blocks_input() {
    let mut app = loaded_app();
    open_tasks_for_second_student(&mut app);

    let effect = app.handle_event(AppEvent::InputChar('e'));
    match effect {
        Some(Effect::RunTask {
            slot,
            kind,
            student,
            assignment,
        }) => {
            assert_eq!(slot, 1);
            assert_eq!(kind, TaskKind::Extract);
            assert_eq!(student.name, "Jan de Vries");
            assert_eq!(assignment.name, "Week 1");
        }
        other => panic!("unexpected effect {other:?}"),
    }
    assert_eq!(
        app.modal(),
        Some(&Modal::Running("Extracting files...".to_string()))
    );
    assert!(app.handle_event(AppEvent::InputChar('d')).is_none());
    assert!(app.handle_event(AppEvent::Back).is_none());

    assert!(finish(&mut app, 1, Ok(())).is_none());
    assert!(app.modal().is_none());
    assert_eq!(slot_states(&app)[1], TaskState::Success);
    assert_eq!(
        app.notices().last().map(|notice| notice.message.as_str()),
        Some("Code successfully decompressed")
    );
}

#[test]
fn digit_shortcut_runs_matching_environment() {
    let mut app = loaded_app();
    open_tasks_for_second_student(&mut app);

    let effect = app.handle_event(AppEvent::InputChar('0'));
    assert!(matches!(
        effect,
        Some(Effect::RunTask {
            slot: 2,
            kind: TaskKind::CreateEnv(_),
            ..
        })
    ));
    app.on_task_event(TaskEvent::Finished {
        slot: 2,
        result: Ok(()),
    });
    assert!(app.handle_event(AppEvent::InputChar('7')).is_none());
}

#[test]
fn speedrun_stops_at_first_failure() {
    let mut app = loaded_app();
    open_tasks_for_second_student(&mut app);

    let mut executed = Vec::new();
    let mut next = app.handle_event(AppEvent::InputChar('s'));
    while let Some(Effect::RunTask { slot, .. }) = next {
        executed.push(slot);
        let result = if slot == 1 {
            Err(TaskError::with_details("Can't locate submission file", "ls output"))
        } else {
            Ok(())
        };
        next = finish(&mut app, slot, result);
    }

    assert_eq!(executed, vec![0, 1]);
    assert_eq!(
        slot_states(&app),
        vec![
            TaskState::Success,
            TaskState::Failed,
            TaskState::Idle,
            TaskState::Idle
        ]
    );
    match app.modal() {
        Some(Modal::Error(error)) => {
            assert_eq!(error.title, "Decompression failed");
            assert_eq!(error.message, "Can't locate submission file");
            assert_eq!(error.details.as_deref(), Some("ls output"));
        }
        other => panic!("error modal expected, got {other:?}"),
    }
    match app.screen() {
        Some(Screen::Tasks(screen)) => assert!(!screen.speedrun_active()),
        _ => panic!("tasks screen expected"),
    }
}

#[test]
fn speedrun_runs_every_slot_when_all_succeed() {
    let mut app = loaded_app();
    open_tasks_for_second_student(&mut app);

    let mut executed = Vec::new();
    let mut next = app.handle_event(AppEvent::InputChar('s'));
    while let Some(Effect::RunTask { slot, .. }) = next {
        executed.push(slot);
        assert!(matches!(app.modal(), Some(Modal::Running(_))));
        next = finish(&mut app, slot, Ok(()));
    }

    assert_eq!(executed, vec![0, 1, 2, 3]);
    assert!(app.modal().is_none());
    assert!(slot_states(&app).iter().all(|state| *state == TaskState::Success));
}

#[test]
fn error_modal_toggles_details_and_closes() {
    let mut app = loaded_app();
    open_tasks_for_second_student(&mut app);
    app.handle_event(AppEvent::InputChar('o'));
    finish(
        &mut app,
        3,
        Err(TaskError::with_details(
            "Process exited with exit code: 1",
            "line 1\nline 2",
        )),
    );

    app.handle_event(AppEvent::ToggleDetails);
    app.handle_event(AppEvent::MoveDown);
    match app.modal() {
        Some(Modal::Error(error)) => {
            assert!(error.expanded);
            assert_eq!(error.scroll, 1);
        }
        other => panic!("error modal expected, got {other:?}"),
    }

    app.handle_event(AppEvent::Back);
    assert!(app.modal().is_none());
    assert!(matches!(app.screen(), Some(Screen::Tasks(_))));
}

#[test]
fn palette_jumps_to_matching_student() {
    let mut app = loaded_app();
    app.handle_event(AppEvent::Submit);
    app.handle_event(AppEvent::OpenPalette);
    for c in "piet".chars() {
        app.handle_event(AppEvent::InputChar(c));
    }
    let hits = app.palette_hits();
    assert_eq!(hits[0].command, "grade Piet Jansen");

    app.handle_event(AppEvent::Submit);
    assert!(app.palette().is_none());
    match app.screen() {
        Some(Screen::Tasks(screen)) => assert_eq!(screen.student, 2),
        _ => panic!("tasks screen expected"),
    }
}

#[test]
fn palette_closes_on_escape_without_navigating() {
    let mut app = loaded_app();
    app.handle_event(AppEvent::Submit);
    app.handle_event(AppEvent::OpenPalette);
    app.handle_event(AppEvent::InputChar('s'));
    app.handle_event(AppEvent::Back);
    assert!(app.palette().is_none());
    assert!(matches!(app.screen(), Some(Screen::Students(_))));
}

#[test]
fn notices_expire_after_a_while() {
    let mut app = loaded_app();
    app.notify("Download successful", Severity::Information);
    assert_eq!(app.notices().len(), 1);
    for _ in 0..NOTICE_TTL_TICKS {
        app.handle_event(AppEvent::Tick);
    }
    assert!(app.notices().is_empty());
}

#[test]
fn quit_cancels_running_fan_out() {
    let mut app = loaded_app();
    let Some(Effect::FetchStatuses { cancel, .. }) = app.handle_event(AppEvent::Submit) else {
        panic!("status fetch expected");
    };
    app.handle_event(AppEvent::Quit);
    assert!(!app.running);
    assert!(cancel.is_cancelled());
}
