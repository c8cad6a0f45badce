use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, LINK};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::config::{Config, GroupFilter};

const PER_PAGE: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("environment variable {0} with a Canvas access token is not set")]
    MissingToken(String),
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },
    #[error("request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    pub id: u64,
    pub name: String,
    pub term: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Assignment {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub submission_types: Vec<String>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Student {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub sortable_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// `None` until the student submits anything.
    pub attempt: Option<u32>,
    /// Signed lateness of the submission; negative while the deadline is ahead.
    pub seconds_late: i64,
    pub attempts: Vec<Attempt>,
    pub comments: Vec<Comment>,
    pub grade: Option<String>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub attempt: Option<u32>,
    pub seconds_late: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Comment {
    pub author_id: Option<u64>,
    #[serde(default)]
    pub author_name: String,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(rename = "content-type", default)]
    pub content_type: String,
    pub url: String,
}

impl Submission {
    pub fn latest_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    /// (comments by the student, comments by anyone else)
    pub fn comment_counts(&self, student_id: u64) -> (usize, usize) {
        let by_student = self
            .comments
            .iter()
            .filter(|comment| comment.author_id == Some(student_id))
            .count();
        (by_student, self.comments.len() - by_student)
    }

    pub(crate) fn from_raw(
        raw: RawSubmission,
        due_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let seconds_late = match (raw.attempt, due_at) {
            (None, Some(due_at)) => (now - due_at).num_seconds(),
            _ => raw.seconds_late.unwrap_or(0),
        };
        let attempts = raw
            .submission_history
            .into_iter()
            .filter(|entry| entry.attempt.is_some())
            .map(|entry| Attempt {
                attempt: entry.attempt,
                seconds_late: entry.seconds_late.unwrap_or(0),
            })
            .collect();
        Self {
            attempt: raw.attempt,
            seconds_late,
            attempts,
            comments: raw.submission_comments,
            grade: raw.grade,
            attachments: raw.attachments,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawSubmission {
    pub(crate) attempt: Option<u32>,
    #[serde(default)]
    pub(crate) seconds_late: Option<i64>,
    #[serde(default)]
    pub(crate) submission_history: Vec<RawAttempt>,
    #[serde(default)]
    pub(crate) submission_comments: Vec<Comment>,
    #[serde(default)]
    pub(crate) grade: Option<String>,
    #[serde(default)]
    pub(crate) attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawAttempt {
    pub(crate) attempt: Option<u32>,
    #[serde(default)]
    pub(crate) seconds_late: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawCourse {
    id: u64,
    name: String,
    #[serde(default)]
    term: Option<RawTerm>,
}

#[derive(Debug, Deserialize)]
struct RawTerm {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Named {
    id: u64,
    name: String,
}

/// Everything the grading tool needs from the learning-management system.
pub trait CourseService: Send + Sync {
    fn get_course(&self) -> Result<Course, CanvasError>;

    /// Assignments in the assignment group called `group_name`.
    fn get_assignments(&self, group_name: &str) -> Result<Vec<Assignment>, CanvasError>;

    /// Students sorted by sortable name, optionally limited to one group.
    fn get_students(&self, filter: Option<&GroupFilter>) -> Result<Vec<Student>, CanvasError>;

    fn get_submission(
        &self,
        assignment: &Assignment,
        student: &Student,
    ) -> Result<Submission, CanvasError>;

    fn fetch_attachment(&self, url: &str) -> Result<Vec<u8>, CanvasError>;
}

pub struct CanvasClient {
    http: Client,
    base_url: String,
    token: String,
    course_id: u64,
}

impl CanvasClient {
    pub fn from_config(config: &Config) -> Result<Self, CanvasError> {
        let token = std::env::var(&config.token_env)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| CanvasError::MissingToken(config.token_env.clone()))?;
        let base_url = api_base_url(&config.server);
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| CanvasError::Http {
                url: base_url.clone(),
                source,
            })?;
        Ok(Self {
            http,
            base_url,
            token,
            course_id: config.course_id,
        })
    }

    fn send(&self, url: &str) -> Result<Response, CanvasError> {
        let http_err = |source| CanvasError::Http {
            url: url.to_string(),
            source,
        };
        self.http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .and_then(Response::error_for_status)
            .map_err(http_err)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, CanvasError> {
        self.send(url)?.json().map_err(|source| CanvasError::Http {
            url: url.to_string(),
            source,
        })
    }

    /// Follows `Link: rel="next"` headers until the collection is exhausted.
    fn get_paginated<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, CanvasError> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let mut next = Some(format!(
            "{}{path}{separator}per_page={PER_PAGE}",
            self.base_url
        ));
        let mut items = Vec::new();
        while let Some(url) = next.take() {
            debug!(%url, "fetching page");
            let response = self.send(&url)?;
            next = next_page_url(response.headers());
            let mut page: Vec<T> = response.json().map_err(|source| CanvasError::Http {
                url: url.clone(),
                source,
            })?;
            items.append(&mut page);
        }
        Ok(items)
    }

    fn find_by_name(
        &self,
        path: &str,
        kind: &'static str,
        name: &str,
    ) -> Result<u64, CanvasError> {
        self.get_paginated::<Named>(path)?
            .into_iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.id)
            .ok_or_else(|| CanvasError::NotFound {
                kind,
                name: name.to_string(),
            })
    }
}

impl CourseService for CanvasClient {
    fn get_course(&self) -> Result<Course, CanvasError> {
        let url = format!(
            "{}/courses/{}?include[]=term",
            self.base_url, self.course_id
        );
        let raw: RawCourse = self.get_json(&url)?;
        Ok(Course {
            id: raw.id,
            name: raw.name,
            term: raw.term.map(|term| term.name).unwrap_or_default(),
        })
    }

    fn get_assignments(&self, group_name: &str) -> Result<Vec<Assignment>, CanvasError> {
        let group_id = self.find_by_name(
            &format!("/courses/{}/assignment_groups", self.course_id),
            "assignment group",
            group_name,
        )?;
        self.get_paginated(&format!(
            "/courses/{}/assignment_groups/{group_id}/assignments?order_by=position",
            self.course_id
        ))
    }

    fn get_students(&self, filter: Option<&GroupFilter>) -> Result<Vec<Student>, CanvasError> {
        let mut students: Vec<Student> = match filter {
            Some(filter) => {
                let groupset_id = self.find_by_name(
                    &format!("/courses/{}/group_categories", self.course_id),
                    "group set",
                    &filter.groupset,
                )?;
                let group_id = self.find_by_name(
                    &format!("/group_categories/{groupset_id}/groups"),
                    "group",
                    &filter.group,
                )?;
                self.get_paginated(&format!("/groups/{group_id}/users"))?
            }
            None => self.get_paginated(&format!(
                "/courses/{}/users?enrollment_type[]=student",
                self.course_id
            ))?,
        };
        sort_students(&mut students);
        Ok(students)
    }

    fn get_submission(
        &self,
        assignment: &Assignment,
        student: &Student,
    ) -> Result<Submission, CanvasError> {
        let url = format!(
            "{}/courses/{}/assignments/{}/submissions/{}?include[]=submission_history&include[]=submission_comments",
            self.base_url, self.course_id, assignment.id, student.id
        );
        let raw: RawSubmission = self.get_json(&url)?;
        Ok(Submission::from_raw(raw, assignment.due_at, Utc::now()))
    }

    fn fetch_attachment(&self, url: &str) -> Result<Vec<u8>, CanvasError> {
        let bytes = self.send(url)?.bytes().map_err(|source| CanvasError::Http {
            url: url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }
}

pub fn sort_students(students: &mut [Student]) {
    students.sort_by(|a, b| {
        let key_a = if a.sortable_name.is_empty() { &a.name } else { &a.sortable_name };
        let key_b = if b.sortable_name.is_empty() { &b.name } else { &b.sortable_name };
        key_a.to_lowercase().cmp(&key_b.to_lowercase())
    });
}

/// `canvas.example.edu` and `https://canvas.example.edu/` both map to the v1 API root.
pub fn api_base_url(server: &str) -> String {
    let trimmed = server.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        format!("{trimmed}/api/v1")
    } else {
        format!("https://{trimmed}/api/v1")
    }
}

fn next_page_url(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(LINK)?.to_str().ok()?;
    parse_next_link(value)
}

pub(crate) fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
            .map(str::to_string)
    })
}

#[cfg(test)]
#[path = "../tests/unit/canvas_tests.rs"]
mod tests;
