use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;
use tracing::{error, info};

mod app;
mod canvas;
mod config;
mod events;
mod layout;
mod logging;
mod palette;
mod pipeline;
mod process;
mod status;
mod tasks;
mod theme;
mod ui;

use app::{App, Effect, StartupData};
use canvas::{CanvasClient, CanvasError, CourseService};
use config::{Config, InitOutcome};
use status::StatusFanout;
use tasks::{TaskContext, TaskRunner};
use theme::Theme;

const MAX_EVENTS_PER_LOOP: usize = 128;

#[derive(Debug, Parser)]
#[command(
    name = "canvas-grader",
    version,
    about = "Download, unpack and open Canvas submissions for grading"
)]
struct Cli {
    /// Use this grading.toml instead of searching the current folder and its parents.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a default grading.toml into the current folder.
    Init,
}

type StartupResult = Result<StartupData, String>;

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(Command::Init) = cli.command {
        let cwd = env::current_dir().context("failed to determine the current folder")?;
        match config::init_config(&cwd).context("failed to write the default config")? {
            InitOutcome::AlreadyPresent(path) => {
                println!("Config file already present at {}", path.display())
            }
            InitOutcome::Created(path) => println!("Created {}", path.display()),
        }
        return Ok(());
    }

    let (config, config_path) = config::load(cli.config.as_deref())?;
    let config_dir = config_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let _log_guard = logging::init_logging(&config_dir.join("logs"));
    info!(config = %config_path.display(), course_id = config.course_id, "starting grading session");

    let service: Arc<dyn CourseService> = Arc::new(CanvasClient::from_config(&config)?);
    let config = Arc::new(config);
    let theme = Theme::resolve(&config.theme, &config_dir);
    let startup_rx = spawn_startup(Arc::clone(&service), Arc::clone(&config));
    let context = TaskContext {
        config: Arc::clone(&config),
        service,
    };

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = run_app(&mut terminal, App::new(config), &theme, context, startup_rx);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    let app = result?;
    if let Some(message) = app.fatal_error() {
        bail!("{message}");
    }
    info!("grading session closed");
    Ok(())
}

fn spawn_startup(service: Arc<dyn CourseService>, config: Arc<Config>) -> Receiver<StartupResult> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = load_startup_data(service.as_ref(), &config).map_err(|err| {
            let message = format!("{:#}", anyhow::Error::from(err));
            error!(error = %message, "startup failed");
            message
        });
        let _ = tx.send(result);
    });
    rx
}

fn load_startup_data(
    service: &dyn CourseService,
    config: &Config,
) -> Result<StartupData, CanvasError> {
    let course = service.get_course()?;
    let assignments = service.get_assignments(&config.assignment_group)?;
    let students = service.get_students(config.group_filter.as_ref())?;
    info!(
        course_id = course.id,
        course = %course.name,
        assignments = assignments.len(),
        students = students.len(),
        "course loaded"
    );
    Ok(StartupData {
        course,
        assignments,
        students,
    })
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut app: App,
    theme: &Theme,
    context: TaskContext,
    startup_rx: Receiver<StartupResult>,
) -> io::Result<App> {
    let batch_size = context.config.status_batch_size;
    let service = Arc::clone(&context.service);
    let task_runner = TaskRunner::new(context);
    let status_fanout = StatusFanout::new();
    let mut startup_rx = Some(startup_rx);

    while app.running {
        match startup_rx.as_ref().map(Receiver::try_recv) {
            Some(Ok(result)) => {
                app.on_startup_loaded(result);
                startup_rx = None;
            }
            Some(Err(TryRecvError::Disconnected)) => {
                app.on_startup_loaded(Err("startup thread exited unexpectedly".to_string()));
                startup_rx = None;
            }
            Some(Err(TryRecvError::Empty)) | None => {}
        }

        let mut effects = Vec::new();
        for event in task_runner.drain_events_limited(MAX_EVENTS_PER_LOOP) {
            effects.extend(app.on_task_event(event));
        }
        for event in status_fanout.drain_events_limited(MAX_EVENTS_PER_LOOP) {
            app.on_status_event(event);
        }

        terminal.draw(|frame| ui::render(frame, &app, theme))?;

        effects.extend(app.handle_event(events::next_event()?));
        for effect in effects {
            dispatch_effect(effect, &task_runner, &status_fanout, &service, batch_size);
        }
    }

    Ok(app)
}

fn dispatch_effect(
    effect: Effect,
    task_runner: &TaskRunner,
    status_fanout: &StatusFanout,
    service: &Arc<dyn CourseService>,
    batch_size: usize,
) {
    match effect {
        Effect::RunTask {
            slot,
            kind,
            assignment,
            student,
        } => task_runner.spawn(slot, kind, assignment, student),
        Effect::FetchStatuses {
            assignment,
            students,
            generation,
            cancel,
        } => status_fanout.spawn(
            Arc::clone(service),
            assignment,
            students,
            batch_size,
            generation,
            cancel,
        ),
    }
}
