use std::sync::Arc;

use crate::canvas::{Assignment, Course, Student, Submission};
use crate::config::Config;
use crate::events::AppEvent;
use crate::palette::{self, Palette, PaletteHit};
use crate::pipeline::{Speedrun, SpeedrunStep};
use crate::status::{CancelToken, StatusEvent};
use crate::tasks::{self, Severity, TaskError, TaskEvent, TaskKind, TaskSlot, TaskState};

pub const LOADING_MESSAGE: &str = "Fetching assignments and students...";
/// Roughly five seconds of idle frames.
const NOTICE_TTL_TICKS: u64 = 300;
const MAX_NOTICES: usize = 5;
const PAGE_STEP: isize = 10;

/// Everything fetched once before the first screen becomes interactive.
#[derive(Debug, Clone)]
pub struct StartupData {
    pub course: Course,
    pub assignments: Vec<Assignment>,
    pub students: Vec<Student>,
}

/// Background work the event loop must start on behalf of the app.
#[derive(Debug, Clone)]
pub enum Effect {
    RunTask {
        slot: usize,
        kind: TaskKind,
        assignment: Assignment,
        student: Student,
    },
    FetchStatuses {
        assignment: Assignment,
        students: Vec<Student>,
        generation: u64,
        cancel: CancelToken,
    },
}

#[derive(Debug, Clone)]
pub struct StudentsScreen {
    pub assignment: Assignment,
    pub selected: usize,
    /// One entry per roster student; `None` until its submission arrives.
    pub rows: Vec<Option<Submission>>,
    pub generation: u64,
    pub loading: bool,
    cancel: CancelToken,
}

#[derive(Debug, Clone)]
pub struct TasksScreen {
    pub assignment: Assignment,
    pub student: usize,
    pub selected: usize,
    pub slots: Vec<TaskSlot>,
    speedrun: Option<Speedrun>,
}

impl TasksScreen {
    pub fn speedrun_active(&self) -> bool {
        self.speedrun.is_some()
    }
}

#[derive(Debug, Clone)]
pub enum Screen {
    Assignments { selected: usize },
    Students(StudentsScreen),
    Tasks(TasksScreen),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorModal {
    pub title: String,
    pub message: String,
    pub details: Option<String>,
    pub expanded: bool,
    pub scroll: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modal {
    Loading(String),
    /// A task is running; all input except quit is swallowed.
    Running(String),
    Error(ErrorModal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub severity: Severity,
    expires_at: u64,
}

#[derive(Debug)]
pub struct App {
    pub running: bool,
    pub ticks: u64,
    config: Arc<Config>,
    course: Option<Course>,
    assignments: Vec<Assignment>,
    students: Vec<Student>,
    screens: Vec<Screen>,
    modal: Option<Modal>,
    palette: Option<Palette>,
    notices: Vec<Notice>,
    next_generation: u64,
    fatal_error: Option<String>,
}

impl App {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            running: true,
            ticks: 0,
            config,
            course: None,
            assignments: Vec::new(),
            students: Vec::new(),
            screens: vec![Screen::Assignments { selected: 0 }],
            modal: Some(Modal::Loading(LOADING_MESSAGE.to_string())),
            palette: None,
            notices: Vec::new(),
            next_generation: 0,
            fatal_error: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    /// Topmost screen; the assignment list at the bottom is never popped.
    pub fn screen(&self) -> Option<&Screen> {
        self.screens.last()
    }

    /// The student list underneath the current screen, if any.
    pub fn students_screen(&self) -> Option<&StudentsScreen> {
        self.screens.iter().rev().find_map(|screen| match screen {
            Screen::Students(students) => Some(students),
            _ => None,
        })
    }

    pub fn modal(&self) -> Option<&Modal> {
        self.modal.as_ref()
    }

    pub fn palette(&self) -> Option<&Palette> {
        self.palette.as_ref()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn fatal_error(&self) -> Option<&str> {
        self.fatal_error.as_deref()
    }

    /// Course, then the assignment and student of the screens on the stack.
    pub fn breadcrumbs(&self) -> Vec<String> {
        let mut crumbs = Vec::new();
        if let Some(course) = &self.course {
            if course.term.is_empty() {
                crumbs.push(course.name.clone());
            } else {
                crumbs.push(format!("{} - {}", course.name, course.term));
            }
        }
        for screen in &self.screens {
            match screen {
                Screen::Assignments { .. } => {}
                Screen::Students(students) => crumbs.push(students.assignment.name.clone()),
                Screen::Tasks(tasks) => {
                    if let Some(student) = self.students.get(tasks.student) {
                        crumbs.push(student.name.clone());
                    }
                }
            }
        }
        crumbs
    }

    pub fn palette_hits(&self) -> Vec<PaletteHit> {
        let Some(palette) = &self.palette else {
            return Vec::new();
        };
        palette::search(
            &palette.query,
            self.students.iter().map(|student| student.name.as_str()),
        )
    }

    pub fn on_startup_loaded(&mut self, result: Result<StartupData, String>) {
        match result {
            Ok(data) => {
                self.course = Some(data.course);
                self.assignments = data.assignments;
                self.students = data.students;
                self.modal = None;
            }
            Err(message) => {
                self.fatal_error = Some(message);
                self.running = false;
            }
        }
    }

    pub fn on_tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
        let now = self.ticks;
        self.notices.retain(|notice| notice.expires_at > now);
    }

    pub fn notify(&mut self, message: impl Into<String>, severity: Severity) {
        self.notices.push(Notice {
            message: message.into(),
            severity,
            expires_at: self.ticks + NOTICE_TTL_TICKS,
        });
        if self.notices.len() > MAX_NOTICES {
            let excess = self.notices.len() - MAX_NOTICES;
            self.notices.drain(..excess);
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) -> Option<Effect> {
        match event {
            AppEvent::Tick => {
                self.on_tick();
                return None;
            }
            AppEvent::Quit => {
                self.quit();
                return None;
            }
            _ => {}
        }

        if let Some(modal) = &mut self.modal {
            if let Modal::Error(error) = modal {
                match event {
                    AppEvent::Back | AppEvent::Submit => self.modal = None,
                    AppEvent::ToggleDetails => {
                        error.expanded = !error.expanded;
                        error.scroll = 0;
                    }
                    AppEvent::MoveUp => error.scroll = error.scroll.saturating_sub(1),
                    AppEvent::MoveDown if error.expanded => {
                        error.scroll = error.scroll.saturating_add(1)
                    }
                    AppEvent::PageUp => error.scroll = error.scroll.saturating_sub(PAGE_STEP as u16),
                    AppEvent::PageDown if error.expanded => {
                        error.scroll = error.scroll.saturating_add(PAGE_STEP as u16)
                    }
                    _ => {}
                }
            }
            return None;
        }

        if self.palette.is_some() {
            return self.handle_palette_event(event);
        }

        match self.screens.last() {
            Some(Screen::Students(_)) => self.handle_students_event(event),
            Some(Screen::Tasks(_)) => self.handle_tasks_event(event),
            _ => self.handle_assignments_event(event),
        }
    }

    fn quit(&mut self) {
        for screen in &self.screens {
            if let Screen::Students(students) = screen {
                students.cancel.cancel();
            }
        }
        self.running = false;
    }

    fn handle_assignments_event(&mut self, event: AppEvent) -> Option<Effect> {
        let len = self.assignments.len();
        let Some(Screen::Assignments { selected }) = self.screens.last_mut() else {
            return None;
        };
        match event {
            AppEvent::MoveUp => *selected = step(*selected, -1, len),
            AppEvent::MoveDown => *selected = step(*selected, 1, len),
            AppEvent::PageUp => *selected = step(*selected, -PAGE_STEP, len),
            AppEvent::PageDown => *selected = step(*selected, PAGE_STEP, len),
            AppEvent::InputChar('q') => self.quit(),
            AppEvent::Submit => {
                let index = *selected;
                return self.open_students(index);
            }
            _ => {}
        }
        None
    }

    fn open_students(&mut self, assignment_index: usize) -> Option<Effect> {
        let assignment = self.assignments.get(assignment_index)?.clone();
        self.next_generation += 1;
        let generation = self.next_generation;
        let cancel = CancelToken::new();
        self.screens.push(Screen::Students(StudentsScreen {
            assignment: assignment.clone(),
            selected: 0,
            rows: vec![None; self.students.len()],
            generation,
            loading: !self.students.is_empty(),
            cancel: cancel.clone(),
        }));
        Some(Effect::FetchStatuses {
            assignment,
            students: self.students.clone(),
            generation,
            cancel,
        })
    }

    fn handle_students_event(&mut self, event: AppEvent) -> Option<Effect> {
        let len = self.students.len();
        let Some(Screen::Students(screen)) = self.screens.last_mut() else {
            return None;
        };
        match event {
            AppEvent::MoveUp => screen.selected = step(screen.selected, -1, len),
            AppEvent::MoveDown => screen.selected = step(screen.selected, 1, len),
            AppEvent::PageUp => screen.selected = step(screen.selected, -PAGE_STEP, len),
            AppEvent::PageDown => screen.selected = step(screen.selected, PAGE_STEP, len),
            AppEvent::Submit => {
                let index = screen.selected;
                self.open_tasks(index);
            }
            AppEvent::Back | AppEvent::InputChar('b') => {
                screen.cancel.cancel();
                self.screens.pop();
            }
            AppEvent::OpenPalette => self.palette = Some(Palette::default()),
            _ => {}
        }
        None
    }

    fn open_tasks(&mut self, student_index: usize) {
        if student_index >= self.students.len() {
            return;
        }
        let Some(Screen::Students(screen)) = self.screens.last_mut() else {
            return;
        };
        screen.selected = student_index;
        let assignment = screen.assignment.clone();
        self.screens.push(Screen::Tasks(TasksScreen {
            assignment,
            student: student_index,
            selected: 0,
            slots: tasks::build_slots(&self.config.env),
            speedrun: None,
        }));
    }

    fn handle_palette_event(&mut self, event: AppEvent) -> Option<Effect> {
        let hit_count = self.palette_hits().len();
        let palette = self.palette.as_mut()?;
        match event {
            AppEvent::Back => self.palette = None,
            AppEvent::InputChar(c) => palette.push(c),
            AppEvent::Backspace => palette.pop(),
            AppEvent::MoveUp => palette.move_selection(-1, hit_count),
            AppEvent::MoveDown => palette.move_selection(1, hit_count),
            AppEvent::Submit => {
                let selected = palette.selected;
                let target = self.palette_hits().get(selected).map(|hit| hit.index);
                self.palette = None;
                if let Some(index) = target {
                    self.open_tasks(index);
                }
            }
            _ => {}
        }
        None
    }

    fn handle_tasks_event(&mut self, event: AppEvent) -> Option<Effect> {
        let Some(Screen::Tasks(screen)) = self.screens.last_mut() else {
            return None;
        };
        let len = screen.slots.len();
        match event {
            AppEvent::MoveUp => screen.selected = step(screen.selected, -1, len),
            AppEvent::MoveDown => screen.selected = step(screen.selected, 1, len),
            AppEvent::Submit => {
                let slot = screen.selected;
                return self.run_slot(slot);
            }
            AppEvent::Back | AppEvent::InputChar('b') => {
                self.screens.pop();
            }
            AppEvent::InputChar('s') => return self.start_speedrun(),
            AppEvent::InputChar(c) => {
                let slot = screen.slots.iter().position(|slot| slot.shortcut == c)?;
                screen.selected = slot;
                return self.run_slot(slot);
            }
            _ => {}
        }
        None
    }

    fn start_speedrun(&mut self) -> Option<Effect> {
        let Some(Screen::Tasks(screen)) = self.screens.last_mut() else {
            return None;
        };
        let mut speedrun = Speedrun::new(0..screen.slots.len());
        let step = speedrun.start();
        screen.speedrun = Some(speedrun);
        match step {
            SpeedrunStep::Run(slot) => self.run_slot(slot),
            _ => {
                screen.speedrun = None;
                None
            }
        }
    }

    fn run_slot(&mut self, slot: usize) -> Option<Effect> {
        let Some(Screen::Tasks(screen)) = self.screens.last_mut() else {
            return None;
        };
        let student = self.students.get(screen.student)?.clone();
        let task = screen.slots.get_mut(slot)?;
        task.state = TaskState::Running;
        let kind = task.kind.clone();
        self.modal = Some(Modal::Running(kind.run_message()));
        Some(Effect::RunTask {
            slot,
            kind,
            assignment: screen.assignment.clone(),
            student,
        })
    }

    /// Applies a task notice or result; may start the next speedrun step.
    pub fn on_task_event(&mut self, event: TaskEvent) -> Option<Effect> {
        match event {
            TaskEvent::Notice {
                message, severity, ..
            } => {
                self.notify(message, severity);
                None
            }
            TaskEvent::Finished { slot, result } => self.on_task_finished(slot, result),
        }
    }

    fn on_task_finished(&mut self, slot: usize, result: Result<(), TaskError>) -> Option<Effect> {
        if matches!(self.modal, Some(Modal::Running(_))) {
            self.modal = None;
        }
        let Some(Screen::Tasks(screen)) = self.screens.last_mut() else {
            return None;
        };
        let task = screen.slots.get_mut(slot)?;
        let kind = task.kind.clone();
        let succeeded = result.is_ok();
        task.state = if succeeded {
            TaskState::Success
        } else {
            TaskState::Failed
        };

        let step = screen
            .speedrun
            .as_mut()
            .and_then(|speedrun| speedrun.on_finished(slot, succeeded));
        if matches!(
            step,
            Some(SpeedrunStep::Finished | SpeedrunStep::Aborted { .. })
        ) {
            screen.speedrun = None;
        }

        match result {
            Ok(()) => self.notify(kind.success_message(), Severity::Information),
            Err(err) => {
                self.notify(kind.error_message(), Severity::Error);
                self.modal = Some(Modal::Error(ErrorModal {
                    title: kind.error_message().to_string(),
                    message: err.message,
                    details: err.details,
                    expanded: false,
                    scroll: 0,
                }));
            }
        }

        match step {
            Some(SpeedrunStep::Run(next)) => self.run_slot(next),
            _ => None,
        }
    }

    /// Writes a fetched submission into its row; results for a screen that
    /// was already left are dropped.
    pub fn on_status_event(&mut self, event: StatusEvent) {
        match event {
            StatusEvent::Updated {
                generation,
                index,
                submission,
            } => {
                if let Some(row) = self
                    .students_screen_mut(generation)
                    .and_then(|screen| screen.rows.get_mut(index))
                {
                    *row = Some(*submission);
                }
            }
            StatusEvent::Finished {
                generation,
                elapsed,
                cancelled,
            } => {
                let Some(screen) = self.students_screen_mut(generation) else {
                    return;
                };
                screen.loading = false;
                let fetched = screen.rows.iter().filter(|row| row.is_some()).count();
                if !cancelled {
                    self.notify(
                        format!(
                            "Fetched {fetched} submission(s) in {:.1}s",
                            elapsed.as_secs_f64()
                        ),
                        Severity::Information,
                    );
                }
            }
        }
    }

    fn students_screen_mut(&mut self, generation: u64) -> Option<&mut StudentsScreen> {
        self.screens.iter_mut().find_map(|screen| match screen {
            Screen::Students(students) if students.generation == generation => Some(students),
            _ => None,
        })
    }
}

fn step(selected: usize, delta: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (selected as isize + delta).clamp(0, len as isize - 1) as usize
}

#[cfg(test)]
#[path = "../tests/unit/app_tests.rs"]
mod tests;
