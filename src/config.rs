use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_FILE: &str = "grading.toml";

pub const DEFAULT_CONFIG: &str = r#"# Grading tool configuration.
# Paths are relative to the folder containing this file.
root_path = "."
submissions_path = "submissions"
code_path = "code"

server = "canvas.example.edu"
course_id = 12345
# Environment variable holding a Canvas access token.
token_env = "CANVAS_API_TOKEN"
assignment_group = "ECPC"

# Only grade students in one group of a group set.
# groupset = "Werkcolleges"
# group = "Groep A"

theme = "dark"
status_batch_size = 5

[env.default]
python_version = "3.12"
# package_spec = "-e ."

[commands]
uv = "uv"
git = "git"
editor = "code"
"#;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No grading.toml file found. Are you in the correct folder?")]
    NotFound,
    #[error("failed to read '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse '{path}'")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub root_path: PathBuf,
    pub submissions_path: PathBuf,
    pub code_path: PathBuf,
    pub server: String,
    pub course_id: u64,
    pub token_env: String,
    pub assignment_group: String,
    pub group_filter: Option<GroupFilter>,
    pub env: Vec<EnvironmentConfig>,
    pub theme: String,
    pub status_batch_size: usize,
    pub commands: CommandsConfig,
    pub grades: IndexMap<String, GradeLabel>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupFilter {
    pub groupset: String,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentConfig {
    pub name: String,
    pub python_version: String,
    pub package_spec: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandsConfig {
    pub uv: String,
    pub git: String,
    pub editor: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            uv: "uv".to_string(),
            git: "git".to_string(),
            editor: "code".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BadgeStyle {
    Success,
    #[default]
    Info,
    Warning,
    Error,
    Muted,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GradeLabel {
    pub label: String,
    #[serde(default)]
    pub style: BadgeStyle,
}

pub fn default_grade_labels() -> IndexMap<String, GradeLabel> {
    [
        ("Fantastisch", "★ Fantastisch", BadgeStyle::Success),
        ("Goed", "✓ Goed", BadgeStyle::Info),
        ("Ontoereikend", "✗ Ontoereikend", BadgeStyle::Error),
    ]
    .into_iter()
    .map(|(grade, label, style)| {
        (
            grade.to_string(),
            GradeLabel {
                label: label.to_string(),
                style,
            },
        )
    })
    .collect()
}

#[derive(Debug, Deserialize)]
struct ConfigToml {
    root_path: Option<PathBuf>,
    #[serde(default = "default_submissions_path")]
    submissions_path: PathBuf,
    #[serde(default = "default_code_path")]
    code_path: PathBuf,
    server: String,
    course_id: u64,
    #[serde(default = "default_token_env")]
    token_env: String,
    assignment_group: String,
    groupset: Option<String>,
    group: Option<String>,
    #[serde(default)]
    env: IndexMap<String, EnvironmentToml>,
    #[serde(default = "default_theme")]
    theme: String,
    #[serde(default = "default_status_batch_size")]
    status_batch_size: usize,
    #[serde(default)]
    commands: CommandsConfig,
    grades: Option<IndexMap<String, GradeLabel>>,
}

#[derive(Debug, Deserialize)]
struct EnvironmentToml {
    python_version: String,
    package_spec: Option<String>,
}

fn default_submissions_path() -> PathBuf {
    PathBuf::from("submissions")
}

fn default_code_path() -> PathBuf {
    PathBuf::from("code")
}

fn default_token_env() -> String {
    "CANVAS_API_TOKEN".to_string()
}

fn default_theme() -> String {
    "dark".to_string()
}

fn default_status_batch_size() -> usize {
    5
}

impl Config {
    /// Parses a config document; relative paths resolve against the folder
    /// containing `config_path`.
    pub fn from_toml_str(s: &str, config_path: &Path) -> Result<Self, ConfigError> {
        let raw: ConfigToml = toml::from_str(s).map_err(|source| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source,
        })?;
        let folder = config_path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_raw(raw, folder)
    }

    fn from_raw(raw: ConfigToml, folder: &Path) -> Result<Self, ConfigError> {
        let group_filter = match (raw.groupset, raw.group) {
            (Some(groupset), Some(group)) => Some(GroupFilter { groupset, group }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::Invalid(
                    "'groupset' is set but 'group' is missing".to_string(),
                ));
            }
            (None, Some(_)) => {
                return Err(ConfigError::Invalid(
                    "'group' is set but 'groupset' is missing".to_string(),
                ));
            }
        };
        if raw.status_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "'status_batch_size' must be at least 1".to_string(),
            ));
        }
        if raw.env.len() > 10 {
            return Err(ConfigError::Invalid(
                "at most 10 environments can be configured".to_string(),
            ));
        }

        let root_path = match raw.root_path {
            Some(path) if path.is_absolute() => path,
            Some(path) => folder.join(path),
            None => folder.to_path_buf(),
        };
        let env = raw
            .env
            .into_iter()
            .map(|(name, spec)| EnvironmentConfig {
                name,
                python_version: spec.python_version,
                package_spec: spec
                    .package_spec
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty()),
            })
            .collect();

        Ok(Self {
            root_path,
            submissions_path: raw.submissions_path,
            code_path: raw.code_path,
            server: raw.server,
            course_id: raw.course_id,
            token_env: raw.token_env,
            assignment_group: raw.assignment_group,
            group_filter,
            env,
            theme: raw.theme,
            status_batch_size: raw.status_batch_size,
            commands: raw.commands,
            grades: raw.grades.unwrap_or_else(default_grade_labels),
        })
    }

    pub fn grade_label(&self, grade: Option<&str>) -> Option<&GradeLabel> {
        grade.and_then(|value| self.grades.get(value))
    }
}

/// Searches `start` and each of its parents for a config file.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}

pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(ConfigError::NotFound),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    Config::from_toml_str(&contents, path)
}

/// Loads the explicit config path, or discovers one from the working directory.
pub fn load(explicit: Option<&Path>) -> Result<(Config, PathBuf), ConfigError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let cwd = env::current_dir().map_err(|source| ConfigError::Read {
                path: PathBuf::from("."),
                source,
            })?;
            find_config_file(&cwd).ok_or(ConfigError::NotFound)?
        }
    };
    let config = read_config(&path)?;
    Ok((config, path))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    AlreadyPresent(PathBuf),
    Created(PathBuf),
}

/// Writes the default config into `dir` unless one is found there or above it.
pub fn init_config(dir: &Path) -> io::Result<InitOutcome> {
    if let Some(existing) = find_config_file(dir) {
        return Ok(InitOutcome::AlreadyPresent(existing));
    }
    let path = dir.join(CONFIG_FILE);
    fs::write(&path, DEFAULT_CONFIG)?;
    Ok(InitOutcome::Created(path))
}

#[cfg(test)]
#[path = "../tests/unit/config_tests.rs"]
mod tests;
