use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use deunicode::deunicode;
use walkdir::WalkDir;

use crate::canvas::{Assignment, Student};
use crate::config::Config;

/// Lowercase, ASCII-only, hyphen-separated form of a display name.
///
/// Apostrophes typed in the name separate words; quotes that only appear
/// after transliteration are dropped.
pub fn slugify(name: &str) -> String {
    let ascii = deunicode(&name.replace('\'', "-")).replace('\'', "");
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Never empty: names without any transliterable letters fall back to the id.
pub fn student_slug(student: &Student) -> String {
    non_empty_slug(&student.name, "student", student.id)
}

pub fn assignment_slug(assignment: &Assignment) -> String {
    non_empty_slug(&assignment.name, "assignment", assignment.id)
}

fn non_empty_slug(name: &str, kind: &str, id: u64) -> String {
    let slug = slugify(name);
    if slug.is_empty() {
        format!("{kind}-{id}")
    } else {
        slug
    }
}

pub fn assignment_dir(config: &Config, assignment: &Assignment) -> PathBuf {
    config.root_path.join(assignment_slug(assignment))
}

pub fn submissions_dir(config: &Config, assignment: &Assignment) -> PathBuf {
    assignment_dir(config, assignment).join(&config.submissions_path)
}

pub fn code_root(config: &Config, assignment: &Assignment) -> PathBuf {
    assignment_dir(config, assignment).join(&config.code_path)
}

pub fn code_dir(config: &Config, assignment: &Assignment, student: &Student) -> PathBuf {
    code_root(config, assignment).join(student_slug(student))
}

/// True when `code_dir` is a single folder directly below `code_root` and
/// does not hold the downloaded submissions, so it may be wiped.
pub fn is_replaceable_code_dir(code_dir: &Path, code_root: &Path, submissions_dir: &Path) -> bool {
    code_dir.parent() == Some(code_root)
        && code_dir
            .file_name()
            .is_some_and(|name| !name.is_empty() && name != "." && name != "..")
        && !submissions_dir.starts_with(code_dir)
}

/// Code directory to work in: when a submission unpacked into a single
/// top-level folder, that folder is used instead.
pub fn working_code_dir(config: &Config, assignment: &Assignment, student: &Student) -> PathBuf {
    let student_dir = code_dir(config, assignment, student);
    sole_subdirectory(&student_dir).unwrap_or(student_dir)
}

fn sole_subdirectory(dir: &Path) -> Option<PathBuf> {
    let mut entries = fs::read_dir(dir).ok()?;
    let first = entries.next()?.ok()?;
    if entries.next().is_some() {
        return None;
    }
    let path = first.path();
    path.is_dir().then_some(path)
}

/// Files in `submissions_dir` belonging to the student, sorted by name.
pub fn find_submission_artifacts(
    submissions_dir: &Path,
    student_slug: &str,
) -> io::Result<Vec<PathBuf>> {
    let prefix = format!("{student_slug}_");
    let entries = match fs::read_dir(submissions_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut matches = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(&prefix))
        {
            matches.push(entry.path());
        }
    }
    matches.sort();
    Ok(matches)
}

/// Recursively removes `dir`, clearing read-only flags that block deletion.
pub fn remove_dir_force(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
            for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
                let metadata = entry.metadata().map_err(io::Error::other)?;
                let mut permissions = metadata.permissions();
                if permissions.readonly() {
                    make_writable(&mut permissions);
                    fs::set_permissions(entry.path(), permissions)?;
                }
            }
            fs::remove_dir_all(dir)
        }
        Err(err) => Err(err),
    }
}

#[cfg(unix)]
fn make_writable(permissions: &mut fs::Permissions) {
    use std::os::unix::fs::PermissionsExt;
    permissions.set_mode(permissions.mode() | 0o700);
}

#[cfg(not(unix))]
fn make_writable(permissions: &mut fs::Permissions) {
    permissions.set_readonly(false);
}
