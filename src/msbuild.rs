//! Build Orchestrator: MSBuild run inside the RAD Studio environment.
//!
//! ```text
//! cmd.exe /c <rsvars.bat> && MSBuild <project.dproj> [extra args...]
//! ```
//!
//! Output is passed through untouched; only the exit code is interpreted.

use std::path::PathBuf;

use log::info;

use crate::process::{self, CommandSpec, ProcessError, ProcessOutput};
use crate::reporter::Reporter;

pub const CLEAN_TARGET: &str = "/t:Clean";

/// One MSBuild invocation for a project.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRequest {
    pub rsvars: PathBuf,
    pub project: PathBuf,
    pub extra_args: Vec<String>,
}

impl BuildRequest {
    /// Build `project` after sourcing the environment script `rsvars`.
    pub fn new(rsvars: impl Into<PathBuf>, project: impl Into<PathBuf>) -> Self {
        Self {
            rsvars: rsvars.into(),
            project: project.into(),
            extra_args: Vec::new(),
        }
    }

    /// Extra MSBuild switches, passed after the project path in order.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the `Clean` target instead of a build.
    pub fn clean(self) -> Self {
        self.args([CLEAN_TARGET])
    }

    /// The `cmd.exe` command line, run from the project's directory.
    pub fn command(&self) -> CommandSpec {
        let spec = CommandSpec::new("cmd.exe")
            .args([
                "/c".to_string(),
                self.rsvars.to_string_lossy().into_owned(),
                "&&".to_string(),
                "MSBuild".to_string(),
                self.project.to_string_lossy().into_owned(),
            ])
            .args(self.extra_args.iter().cloned());
        match self.project.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => spec.current_dir(dir),
            _ => spec,
        }
    }
}

/// Run the build, streaming its output to `reporter`. Resolves once the
/// process has exited; a non-zero exit is [`ProcessError::Failed`].
pub async fn run_build(
    request: &BuildRequest,
    reporter: &dyn Reporter,
) -> Result<ProcessOutput, ProcessError> {
    info!("building {}", request.project.display());
    process::run_streamed(&request.command(), reporter).await
}
