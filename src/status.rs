use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::canvas::{Assignment, CourseService, Student, Submission};
use crate::config::{BadgeStyle, Config, GradeLabel};

/// Lateness at or above this many seconds counts as properly late.
pub const LATE_THRESHOLD_SECS: i64 = 15 * 60;

/// Shared flag that asks fan-out workers to stop at the next student.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub enum StatusEvent {
    Updated {
        generation: u64,
        index: usize,
        submission: Box<Submission>,
    },
    Finished {
        generation: u64,
        elapsed: Duration,
        cancelled: bool,
    },
}

/// Splits `items` into contiguous batches of at most `batch_size` entries.
pub fn partition<T>(items: &[T], batch_size: usize) -> Vec<&[T]> {
    items.chunks(batch_size.max(1)).collect()
}

/// Fetches submission metadata for a whole roster, one worker per batch.
pub struct StatusFanout {
    event_tx: Sender<StatusEvent>,
    event_rx: Receiver<StatusEvent>,
}

impl StatusFanout {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::channel();
        Self { event_tx, event_rx }
    }

    /// Starts a supervisor thread; it sends `Finished` once every worker stopped.
    pub fn spawn(
        &self,
        service: Arc<dyn CourseService>,
        assignment: Assignment,
        students: Vec<Student>,
        batch_size: usize,
        generation: u64,
        cancel: CancelToken,
    ) {
        let tx = self.event_tx.clone();
        thread::spawn(move || {
            let started = Instant::now();
            fetch_all(
                service.as_ref(),
                &assignment,
                &students,
                batch_size,
                generation,
                &cancel,
                &tx,
            );
            let elapsed = started.elapsed();
            let cancelled = cancel.is_cancelled();
            info!(
                assignment = %assignment.name,
                students = students.len(),
                ?elapsed,
                cancelled,
                "submission status fan-out done"
            );
            let _ = tx.send(StatusEvent::Finished {
                generation,
                elapsed,
                cancelled,
            });
        });
    }

    pub fn drain_events_limited(&self, max_events: usize) -> Vec<StatusEvent> {
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

/// Blocks until every batch worker has finished or observed cancellation.
pub fn fetch_all(
    service: &dyn CourseService,
    assignment: &Assignment,
    students: &[Student],
    batch_size: usize,
    generation: u64,
    cancel: &CancelToken,
    tx: &Sender<StatusEvent>,
) {
    let indexed = students.iter().enumerate().collect::<Vec<_>>();
    thread::scope(|scope| {
        for batch in partition(&indexed, batch_size) {
            let tx = tx.clone();
            scope.spawn(move || {
                for &(index, student) in batch {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let submission = match service.get_submission(assignment, student) {
                        Ok(submission) => submission,
                        Err(err) => {
                            warn!(student = %student.name, error = %err, "failed to fetch submission");
                            continue;
                        }
                    };
                    if cancel.is_cancelled() {
                        return;
                    }
                    let _ = tx.send(StatusEvent::Updated {
                        generation,
                        index,
                        submission: Box::new(submission),
                    });
                }
            });
        }
    });
}

/// `""`, `"(3)"`, `"(+2)"` or `"(1+4)"`.
pub fn comment_badge(by_student: usize, by_others: usize) -> String {
    match (by_student, by_others) {
        (0, 0) => String::new(),
        (own, 0) => format!("({own})"),
        (0, others) => format!("(+{others})"),
        (own, others) => format!("({own}+{others})"),
    }
}

pub fn grade_badge<'a>(config: &'a Config, grade: Option<&str>) -> Option<&'a GradeLabel> {
    config.grade_label(grade)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lateness {
    NotSubmitted,
    NotYetSubmitted,
    OnTime,
    Minor(String),
    Late(String),
}

impl Lateness {
    pub fn classify(submission: &Submission) -> Self {
        match (submission.attempt, submission.latest_attempt()) {
            (Some(_), Some(latest)) => Self::from_seconds(true, latest.seconds_late),
            _ => Self::from_seconds(submission.attempt.is_some(), submission.seconds_late),
        }
    }

    pub fn from_seconds(attempted: bool, seconds_late: i64) -> Self {
        if !attempted {
            return if seconds_late > 0 {
                Self::NotSubmitted
            } else {
                Self::NotYetSubmitted
            };
        }
        match seconds_late {
            s if s <= 0 => Self::OnTime,
            s if s < LATE_THRESHOLD_SECS => Self::Minor(humanize_duration(s)),
            s => Self::Late(humanize_duration(s)),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::NotSubmitted => "Not submitted".to_string(),
            Self::NotYetSubmitted => "Not yet submitted".to_string(),
            Self::OnTime => "On time".to_string(),
            Self::Minor(duration) | Self::Late(duration) => format!("{duration} late"),
        }
    }

    pub fn style(&self) -> BadgeStyle {
        match self {
            Self::NotSubmitted | Self::Late(_) => BadgeStyle::Error,
            Self::NotYetSubmitted => BadgeStyle::Muted,
            Self::OnTime => BadgeStyle::Success,
            Self::Minor(_) => BadgeStyle::Warning,
        }
    }
}

/// Two most significant units, e.g. `"1 hour 5 minutes"`.
pub fn humanize_duration(seconds: i64) -> String {
    const UNITS: [(i64, &str); 4] = [(86_400, "day"), (3_600, "hour"), (60, "minute"), (1, "second")];
    let mut remaining = seconds.max(0);
    let mut parts = Vec::new();
    for (size, name) in UNITS {
        let amount = remaining / size;
        remaining %= size;
        if amount > 0 || !parts.is_empty() {
            parts.push((amount, name));
        }
        if parts.len() == 2 {
            break;
        }
    }
    let rendered = parts
        .into_iter()
        .filter(|(amount, _)| *amount > 0)
        .map(|(amount, name)| {
            if amount == 1 {
                format!("1 {name}")
            } else {
                format!("{amount} {name}s")
            }
        })
        .collect::<Vec<_>>();
    if rendered.is_empty() {
        "0 seconds".to_string()
    } else {
        rendered.join(" ")
    }
}

#[cfg(test)]
#[path = "../tests/unit/status_tests.rs"]
mod tests;
