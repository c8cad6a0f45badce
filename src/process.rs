use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread;

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRun {
    pub code: i32,
    /// stdout and stderr interleaved in arrival order.
    pub output: String,
}

impl CapturedRun {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs `program` to completion, capturing combined output.
pub fn run_captured(program: &str, args: &[String], cwd: Option<&Path>) -> io::Result<CapturedRun> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    debug!(program, ?args, ?cwd, "spawning process");

    let mut child = command.spawn().map_err(|err| {
        io::Error::new(err.kind(), format!("failed to start '{program}': {err}"))
    })?;

    let (tx, rx) = mpsc::channel();
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, tx.clone()));
    }
    drop(tx);

    let status = child.wait()?;
    for reader in readers {
        let _ = reader.join();
    }
    let output = rx.into_iter().collect::<Vec<_>>().join("\n");
    Ok(CapturedRun {
        code: status.code().unwrap_or(-1),
        output,
    })
}

fn spawn_reader<R: io::Read + Send + 'static>(
    reader: R,
    tx: Sender<String>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in BufReader::new(reader).lines().map_while(Result::ok) {
            let _ = tx.send(line);
        }
    })
}
