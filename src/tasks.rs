use std::fs::{self, File};
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use thiserror::Error;
use tracing::{info, warn};
use zip::ZipArchive;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::canvas::{Assignment, Attachment, CanvasError, CourseService, Student};
use crate::config::{Config, EnvironmentConfig};
use crate::layout;
use crate::process::{self, CapturedRun};

/// Failure of a single task: a short message plus optional captured output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TaskError {
    pub message: String,
    pub details: Option<String>,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: Some(details.into()),
        }
    }

    fn process_failed(run: CapturedRun) -> Self {
        Self::with_details(
            format!("Process exited with exit code: {}", run.code),
            run.output,
        )
    }
}

impl From<io::Error> for TaskError {
    fn from(err: io::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<CanvasError> for TaskError {
    fn from(err: CanvasError) -> Self {
        Self::new(error_chain(&err))
    }
}

/// `outer: cause: root cause`
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl From<zip::result::ZipError> for TaskError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::new(format!("archive error: {err}"))
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    Download,
    Extract,
    CreateEnv(EnvironmentConfig),
    OpenEditor,
}

impl TaskKind {
    pub fn run_message(&self) -> String {
        match self {
            TaskKind::Download => "Downloading submission...".to_string(),
            TaskKind::Extract => "Extracting files...".to_string(),
            TaskKind::CreateEnv(env) => format!("Creating environment ({})...", env.name),
            TaskKind::OpenEditor => "Starting Visual Studio Code...".to_string(),
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            TaskKind::Download => "Download successful",
            TaskKind::Extract => "Code successfully decompressed",
            TaskKind::CreateEnv(_) => "Environment successfully created",
            TaskKind::OpenEditor => "Visual Studio Code is running",
        }
    }

    pub fn error_message(&self) -> &'static str {
        match self {
            TaskKind::Download => "Download failed",
            TaskKind::Extract => "Decompression failed",
            TaskKind::CreateEnv(_) => "Environment creation failed",
            TaskKind::OpenEditor => "Could not start Visual Studio Code",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskState {
    #[default]
    Idle,
    Running,
    Success,
    Failed,
}

/// One row of the task list. Slots are fixed per screen and re-bound to the
/// selected student each time they run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSlot {
    pub title: String,
    pub shortcut: char,
    pub kind: TaskKind,
    pub state: TaskState,
}

impl TaskSlot {
    fn new(title: impl Into<String>, shortcut: char, kind: TaskKind) -> Self {
        Self {
            title: title.into(),
            shortcut,
            kind,
            state: TaskState::Idle,
        }
    }
}

/// Download, Extract, one environment per config entry, Open-Editor.
pub fn build_slots(environments: &[EnvironmentConfig]) -> Vec<TaskSlot> {
    let mut slots = vec![
        TaskSlot::new("Download submission", 'd', TaskKind::Download),
        TaskSlot::new(
            "Extract submission into grading folder",
            'e',
            TaskKind::Extract,
        ),
    ];
    for (idx, env) in environments.iter().take(10).enumerate() {
        let shortcut = char::from_digit(idx as u32, 10).unwrap_or('?');
        slots.push(TaskSlot::new(
            format!("Create virtual environment: {}", env.name),
            shortcut,
            TaskKind::CreateEnv(env.clone()),
        ));
    }
    slots.push(TaskSlot::new("Open Visual Studio Code", 'o', TaskKind::OpenEditor));
    slots
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Information,
    Warning,
    Error,
}

#[derive(Debug)]
pub enum TaskEvent {
    Notice {
        slot: usize,
        message: String,
        severity: Severity,
    },
    Finished {
        slot: usize,
        result: Result<(), TaskError>,
    },
}

/// Lets a running task post notices back to the UI thread.
pub struct TaskReporter {
    slot: usize,
    tx: Sender<TaskEvent>,
}

impl TaskReporter {
    pub fn new(slot: usize, tx: Sender<TaskEvent>) -> Self {
        Self { slot, tx }
    }

    pub fn notify(&self, message: impl Into<String>, severity: Severity) {
        let _ = self.tx.send(TaskEvent::Notice {
            slot: self.slot,
            message: message.into(),
            severity,
        });
    }
}

#[derive(Clone)]
pub struct TaskContext {
    pub config: Arc<Config>,
    pub service: Arc<dyn CourseService>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMethod {
    Archive,
    Clone,
    Copy,
}

impl ExtractMethod {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("zip") => ExtractMethod::Archive,
            Some(ext) if ext.eq_ignore_ascii_case("bundle") => ExtractMethod::Clone,
            _ => ExtractMethod::Copy,
        }
    }
}

pub fn execute(
    kind: &TaskKind,
    context: &TaskContext,
    assignment: &Assignment,
    student: &Student,
    reporter: &TaskReporter,
) -> Result<(), TaskError> {
    match kind {
        TaskKind::Download => download(context, assignment, student, reporter),
        TaskKind::Extract => extract(&context.config, assignment, student, reporter),
        TaskKind::CreateEnv(env) => create_env(&context.config, env, assignment, student, reporter),
        TaskKind::OpenEditor => open_editor(&context.config, assignment, student),
    }
}

fn download(
    context: &TaskContext,
    assignment: &Assignment,
    student: &Student,
    reporter: &TaskReporter,
) -> Result<(), TaskError> {
    let student_slug = layout::student_slug(student);
    let submissions_dir = layout::submissions_dir(&context.config, assignment);

    let submission = context.service.get_submission(assignment, student)?;
    if submission.attempt.is_none() {
        return Err(TaskError::new("Student did not yet submit this assignment"));
    }

    fs::create_dir_all(&submissions_dir)?;
    match submission.attachments.as_slice() {
        [] => Err(TaskError::new("Submission does not contain any files")),
        [attachment] => {
            let target = submissions_dir.join(format!(
                "{student_slug}_{}",
                attachment_file_name(attachment)
            ));
            let contents = context.service.fetch_attachment(&attachment.url)?;
            fs::write(&target, contents)?;
            info!(
                file = %target.display(),
                content_type = %attachment.content_type,
                "attachment saved"
            );
            let file_type = target
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or("unknown");
            reporter.notify(
                format!("Downloaded a single .{file_type}-file"),
                Severity::Information,
            );
            Ok(())
        }
        attachments => {
            let target = submissions_dir.join(format!("{student_slug}_zipped.zip"));
            zip_attachments(context.service.as_ref(), &target, attachments)?;
            reporter.notify(
                format!("Zipped {} submitted file(s)", attachments.len()),
                Severity::Warning,
            );
            Ok(())
        }
    }
}

fn attachment_file_name(attachment: &Attachment) -> &str {
    Path::new(&attachment.filename)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("submission")
}

fn zip_attachments(
    service: &dyn CourseService,
    target: &Path,
    attachments: &[Attachment],
) -> Result<(), TaskError> {
    let mut writer = ZipWriter::new(File::create(target)?);
    for attachment in attachments {
        let contents = service.fetch_attachment(&attachment.url)?;
        writer.start_file(attachment_file_name(attachment), SimpleFileOptions::default())?;
        writer.write_all(&contents)?;
    }
    writer.finish()?;
    Ok(())
}

fn extract(
    config: &Config,
    assignment: &Assignment,
    student: &Student,
    reporter: &TaskReporter,
) -> Result<(), TaskError> {
    let student_slug = layout::student_slug(student);
    let submissions_dir = layout::submissions_dir(config, assignment);
    let code_dir = layout::code_dir(config, assignment, student);
    let code_root = layout::code_root(config, assignment);
    if !layout::is_replaceable_code_dir(&code_dir, &code_root, &submissions_dir) {
        return Err(TaskError::new(format!(
            "Refusing to replace {}: not a student folder below {}",
            code_dir.display(),
            code_root.display()
        )));
    }

    let artifacts = layout::find_submission_artifacts(&submissions_dir, &student_slug)?;
    let artifact = match artifacts.as_slice() {
        [artifact] => artifact,
        [] => return Err(TaskError::new("Can't locate submission file")),
        _ => return Err(TaskError::new("More than one submission file")),
    };

    if code_dir.exists() {
        reporter.notify(
            format!("Removing existing directory {}", code_dir.display()),
            Severity::Warning,
        );
        layout::remove_dir_force(&code_dir)?;
    }
    fs::create_dir_all(&code_dir)?;

    match ExtractMethod::for_path(artifact) {
        ExtractMethod::Archive => {
            let mut archive = ZipArchive::new(File::open(artifact)?)?;
            archive.extract(&code_dir)?;
            reporter.notify("Extracted submitted files", Severity::Information);
        }
        ExtractMethod::Clone => {
            let args = vec![
                "clone".to_string(),
                "-b".to_string(),
                "main".to_string(),
                artifact.display().to_string(),
                code_dir.display().to_string(),
            ];
            let run = process::run_captured(&config.commands.git, &args, None)?;
            info!(output = %run.output, "git clone finished");
            if !run.success() {
                return Err(TaskError::process_failed(run));
            }
            reporter.notify("Cloned submitted repository", Severity::Information);
        }
        ExtractMethod::Copy => {
            let target_name = plain_copy_name(artifact, &student_slug);
            fs::copy(artifact, code_dir.join(&target_name))?;
            reporter.notify(format!("Copied {target_name}"), Severity::Information);
        }
    }
    Ok(())
}

fn plain_copy_name(artifact: &Path, student_slug: &str) -> String {
    let file_name = artifact
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    file_name
        .strip_prefix(&format!("{student_slug}_"))
        .map(str::to_string)
        .unwrap_or(file_name)
}

fn existing_code_dir(
    config: &Config,
    assignment: &Assignment,
    student: &Student,
) -> Result<PathBuf, TaskError> {
    let code_dir = layout::working_code_dir(config, assignment, student);
    if code_dir.is_dir() {
        Ok(code_dir)
    } else {
        Err(TaskError::new("Please download and extract submission first."))
    }
}

fn create_env(
    config: &Config,
    env: &EnvironmentConfig,
    assignment: &Assignment,
    student: &Student,
    reporter: &TaskReporter,
) -> Result<(), TaskError> {
    let cwd = existing_code_dir(config, assignment, student)?;
    let uv = &config.commands.uv;

    let venv_args = ["venv", "--python", env.python_version.as_str()].map(str::to_string);
    let venv = process::run_captured(uv, &venv_args, Some(&cwd))?;
    let mut output = venv.output.clone();
    if !venv.success() {
        return Err(TaskError::process_failed(venv));
    }

    if let Some(package_spec) = &env.package_spec {
        let packages = shlex::split(package_spec).ok_or_else(|| {
            TaskError::new(format!("Invalid package spec for {}: {package_spec}", env.name))
        })?;
        let mut install_args = ["pip", "install", "--python", ".venv/bin/python"]
            .map(str::to_string)
            .to_vec();
        install_args.extend(packages);
        let install = process::run_captured(uv, &install_args, Some(&cwd))?;
        let code = install.code;
        let succeeded = install.success();
        output = [output, install.output].join("\n");
        if !succeeded {
            return Err(TaskError::with_details(
                format!("Process exited with exit code: {code}"),
                output,
            ));
        }
    }

    info!(env = %env.name, output = %output, "environment created");
    reporter.notify("Created clean environment", Severity::Information);
    Ok(())
}

fn open_editor(
    config: &Config,
    assignment: &Assignment,
    student: &Student,
) -> Result<(), TaskError> {
    let code_dir = existing_code_dir(config, assignment, student)?;

    let settings_dir = code_dir.join(".vscode");
    fs::create_dir_all(&settings_dir)?;
    let settings = serde_json::json!({ "python.defaultInterpreterPath": ".venv/bin/python" });
    fs::write(
        settings_dir.join("settings.json"),
        serde_json::to_string_pretty(&settings)?,
    )?;
    fs::write(settings_dir.join(".gitignore"), "*")?;

    let run = process::run_captured(
        &config.commands.editor,
        &[code_dir.display().to_string()],
        None,
    )?;
    if !run.success() {
        return Err(TaskError::process_failed(run));
    }
    Ok(())
}

/// Runs tasks on background threads and hands their events to the UI loop.
pub struct TaskRunner {
    context: TaskContext,
    event_tx: Sender<TaskEvent>,
    event_rx: Receiver<TaskEvent>,
}

impl TaskRunner {
    pub fn new(context: TaskContext) -> Self {
        let (event_tx, event_rx) = mpsc::channel();
        Self {
            context,
            event_tx,
            event_rx,
        }
    }

    pub fn spawn(&self, slot: usize, kind: TaskKind, assignment: Assignment, student: Student) {
        let context = self.context.clone();
        let tx = self.event_tx.clone();
        thread::spawn(move || {
            info!(task = ?kind, student = %student.name, assignment = %assignment.name, "task started");
            let reporter = TaskReporter::new(slot, tx.clone());
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                execute(&kind, &context, &assignment, &student, &reporter)
            }))
            .unwrap_or_else(|_| Err(TaskError::new("task panicked")));
            match &result {
                Ok(()) => info!(task = ?kind, "task finished"),
                Err(err) => warn!(task = ?kind, error = %err, "task failed"),
            }
            let _ = tx.send(TaskEvent::Finished { slot, result });
        });
    }

    pub fn drain_events_limited(&self, max_events: usize) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        while events.len() < max_events {
            let Ok(event) = self.event_rx.try_recv() else {
                break;
            };
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
#[path = "../tests/unit/tasks_tests.rs"]
mod tests;
