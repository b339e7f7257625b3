//! Debug Session Launcher.
//!
//! Debug configurations live in the workspace's `.vscode/launch.json`,
//! keyed by name. A configuration for an executable is created once and
//! reused afterwards; anything else in the file is left alone. Starting
//! the session is up to a [`DebugHost`].

use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::process::{self, CommandSpec, ProcessError};

pub const DEBUGGER_TYPE: &str = "cppvsdbg";

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid launch configuration file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} has no \"configurations\" list")]
    Layout { path: PathBuf },
    #[error("failed to start debugging {name}: {source}")]
    Start {
        name: String,
        #[source]
        source: ProcessError,
    },
}

/// One entry of the `configurations` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugConfiguration {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub request: String,
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub stop_at_entry: bool,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub console: Option<String>,
}

impl DebugConfiguration {
    /// `Debug <exe stem>`.
    pub fn name_for(executable: &Path) -> String {
        let stem = executable
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("Debug {stem}")
    }

    /// A `launch` configuration that starts `executable` in its own directory.
    pub fn for_executable(executable: &Path) -> Self {
        Self {
            name: Self::name_for(executable),
            kind: DEBUGGER_TYPE.to_string(),
            request: "launch".to_string(),
            program: executable.to_path_buf(),
            args: Vec::new(),
            stop_at_entry: false,
            cwd: executable.parent().map(Path::to_path_buf),
            console: Some("integratedTerminal".to_string()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  launch.json
// ═══════════════════════════════════════════════════════════════════════════════

/// Drop `//` and `/* */` comments outside of strings. The editor writes
/// launch files with comments, which plain JSON does not allow.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => out.extend(chars.next()),
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        let next = chars.peek().copied();
        match (c, next) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// The workspace's `launch.json`.
#[derive(Debug, Clone)]
pub struct LaunchStore {
    path: PathBuf,
}

impl LaunchStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<root>/.vscode/launch.json`.
    pub fn in_workspace(root: &Path) -> Self {
        Self::new(root.join(".vscode").join("launch.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Value, LaunchError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(json!({ "version": "0.2.0", "configurations": [] }));
            }
            Err(source) => return Err(self.io_error(source)),
        };
        serde_json::from_str(&strip_comments(&text)).map_err(|source| self.json_error(source))
    }

    async fn save(&self, doc: &Value) -> Result<(), LaunchError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| self.io_error(source))?;
        }
        let text = serde_json::to_string_pretty(doc).map_err(|source| self.json_error(source))?;
        tokio::fs::write(&self.path, text + "\n")
            .await
            .map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: std::io::Error) -> LaunchError {
        LaunchError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn json_error(&self, source: serde_json::Error) -> LaunchError {
        LaunchError::Json {
            path: self.path.clone(),
            source,
        }
    }

    /// Stored configuration with this name, if any.
    pub async fn find(&self, name: &str) -> Result<Option<DebugConfiguration>, LaunchError> {
        let doc = self.load().await?;
        let Some(entry) = configurations(&doc)
            .into_iter()
            .flatten()
            .find(|c| c.get("name").and_then(Value::as_str) == Some(name))
        else {
            return Ok(None);
        };
        serde_json::from_value(entry.clone())
            .map(Some)
            .map_err(|source| self.json_error(source))
    }

    /// Reuse the configuration for `executable`, or create and persist it.
    pub async fn ensure(&self, executable: &Path) -> Result<DebugConfiguration, LaunchError> {
        let name = DebugConfiguration::name_for(executable);
        if let Some(existing) = self.find(&name).await? {
            return Ok(existing);
        }

        let config = DebugConfiguration::for_executable(executable);
        let mut doc = self.load().await?;
        let value = serde_json::to_value(&config).map_err(|source| self.json_error(source))?;
        let list = doc
            .as_object_mut()
            .map(|obj| {
                obj.entry("configurations")
                    .or_insert_with(|| Value::Array(Vec::new()))
            })
            .and_then(Value::as_array_mut)
            .ok_or_else(|| LaunchError::Layout {
                path: self.path.clone(),
            })?;
        list.push(value);
        self.save(&doc).await?;
        info!(
            "added debug configuration '{}' to {}",
            config.name,
            self.path.display()
        );
        Ok(config)
    }
}

fn configurations(doc: &Value) -> Option<&Vec<Value>> {
    doc.get("configurations").and_then(Value::as_array)
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Debugger
// ═══════════════════════════════════════════════════════════════════════════════

/// Whatever actually runs the debugger.
pub trait DebugHost {
    fn start_debugging(&self, config: &DebugConfiguration) -> Result<(), LaunchError>;
}

/// Starts a native debugger process (`<debugger> <program>`) in the
/// configuration's working directory and leaves it running.
#[derive(Debug, Clone)]
pub struct NativeDebugger {
    command: String,
}

impl NativeDebugger {
    /// `command` is the debugger executable, looked up on `PATH`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// The command line that debugs `config.program`.
    pub fn command_for(&self, config: &DebugConfiguration) -> CommandSpec {
        let spec = CommandSpec::new(&self.command)
            .arg(config.program.to_string_lossy())
            .args(config.args.iter().cloned());
        match &config.cwd {
            Some(dir) => spec.current_dir(dir),
            None => spec,
        }
    }
}

impl DebugHost for NativeDebugger {
    fn start_debugging(&self, config: &DebugConfiguration) -> Result<(), LaunchError> {
        process::spawn_detached(&self.command_for(config)).map_err(|source| LaunchError::Start {
            name: config.name.clone(),
            source,
        })
    }
}

/// Ensure a configuration exists for `executable` and start it on `host`.
pub async fn launch(
    store: &LaunchStore,
    host: &dyn DebugHost,
    executable: &Path,
) -> Result<DebugConfiguration, LaunchError> {
    let config = store.ensure(executable).await?;
    host.start_debugging(&config)?;
    Ok(config)
}
