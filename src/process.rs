//! Child processes whose output is shown live.
//!
//! stdout and stderr are read concurrently and forwarded to a [`Reporter`]
//! line by line as they arrive, so the two streams may interleave. Once
//! both are drained the exit status decides the result.

use std::path::PathBuf;
use std::process::Stdio;

use log::debug;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Split};
use tokio::process::Command;

use crate::reporter::Reporter;

/// Why a child process did not finish successfully.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with code {code}")]
    Failed {
        program: String,
        code: i32,
        output: Vec<String>,
    },
    #[error("lost output of {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Exit code for [`ProcessError::Failed`].
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessError::Failed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Command lines
// ═══════════════════════════════════════════════════════════════════════════════

/// Program, arguments and working directory of a child process.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// `program` with no arguments, run in the current directory.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append every argument in `args`, in order.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the child in `dir`.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Human-readable command line, for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Running
// ═══════════════════════════════════════════════════════════════════════════════

/// Lines written by a process that exited with code zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutput {
    pub lines: Vec<String>,
}

async fn next_segment<R: AsyncBufRead + Unpin>(
    stream: &mut Option<Split<R>>,
) -> std::io::Result<Option<Vec<u8>>> {
    match stream {
        Some(split) => split.next_segment().await,
        None => Ok(None),
    }
}

fn decode(mut bytes: Vec<u8>) -> String {
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Run `spec` to completion, forwarding every output line to `reporter`.
pub async fn run_streamed(
    spec: &CommandSpec,
    reporter: &dyn Reporter,
) -> Result<ProcessOutput, ProcessError> {
    debug!("spawning {}", spec.display());
    let mut child = spec.command().spawn().map_err(|source| ProcessError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let mut stdout = child.stdout.take().map(|s| BufReader::new(s).split(b'\n'));
    let mut stderr = child.stderr.take().map(|s| BufReader::new(s).split(b'\n'));
    let mut lines = Vec::new();

    while stdout.is_some() || stderr.is_some() {
        let (segment, from_stdout) = tokio::select! {
            seg = next_segment(&mut stdout), if stdout.is_some() => (seg, true),
            seg = next_segment(&mut stderr), if stderr.is_some() => (seg, false),
            else => break,
        };
        let segment = segment.map_err(|source| ProcessError::Io {
            program: spec.program.clone(),
            source,
        })?;
        match segment {
            Some(bytes) => {
                let line = decode(bytes);
                reporter.line(&line);
                lines.push(line);
            }
            None if from_stdout => stdout = None,
            None => stderr = None,
        }
    }

    let status = child.wait().await.map_err(|source| ProcessError::Io {
        program: spec.program.clone(),
        source,
    })?;

    if status.success() {
        Ok(ProcessOutput { lines })
    } else {
        Err(ProcessError::Failed {
            program: spec.program.clone(),
            // no code when killed by a signal
            code: status.code().unwrap_or(-1),
            output: lines,
        })
    }
}

/// Start `spec` without waiting for it or capturing its output.
pub fn spawn_detached(spec: &CommandSpec) -> Result<(), ProcessError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args);
    if let Some(dir) = &spec.cwd {
        cmd.current_dir(dir);
    }
    cmd.spawn().map_err(|source| ProcessError::Spawn {
        program: spec.program.clone(),
        source,
    })?;
    Ok(())
}
