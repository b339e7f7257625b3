//! Output channels: where child-process output and command status lines go.

use std::sync::Mutex;

/// Receives output one line at a time. Lines may arrive from several tasks.
pub trait Reporter: Send + Sync {
    fn line(&self, line: &str);
}

/// Named channel printing to stdout.
#[derive(Debug, Clone)]
pub struct OutputChannel {
    name: String,
}

impl OutputChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Print the channel header.
    pub fn show(&self) {
        println!("── {} ──", self.name);
    }
}

impl Reporter for OutputChannel {
    fn line(&self, line: &str) {
        println!("{line}");
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct BufferReporter {
    lines: Mutex<Vec<String>>,
}

impl BufferReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl Reporter for BufferReporter {
    fn line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}
