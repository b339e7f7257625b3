//! Reader for RAD Studio's `rsvars.bat`.
//!
//! The script sits in the IDE's `bin` directory and is a flat list of
//! `@SET KEY=VALUE` lines. The build runs it before MSBuild; the debug flow
//! reads it directly so that `$(BDS)`-style references in project search
//! paths can be expanded.

use std::collections::HashMap;
use std::path::Path;

/// Variables defined by an environment script, in a lookup map.
#[derive(Debug, Clone, Default)]
pub struct EnvScript {
    vars: HashMap<String, String>,
}

impl EnvScript {
    /// Parse script text. Lines that are not `SET` statements are ignored.
    ///
    /// ```
    /// let script = vsdelphi::env_script::EnvScript::parse(
    ///     "@SET BDS=C:\\Delphi\n@SET BDSBIN=%BDS%\\bin\n",
    /// );
    /// assert_eq!(script.get("BDSBIN"), Some(r"C:\Delphi\bin"));
    /// ```
    pub fn parse(text: &str) -> Self {
        let mut vars = HashMap::new();
        for line in text.lines() {
            if let Some((key, raw)) = split_set_statement(line) {
                let value = expand_percent(raw, &vars);
                vars.insert(key.to_string(), value);
            }
        }
        Self { vars }
    }

    /// Read and parse the script at `path`.
    pub async fn read(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self::parse(&tokio::fs::read_to_string(path).await?))
    }

    /// Expanded value of `key`. Keys are matched exactly.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Installation root (`BDS`), if the script defines one.
    pub fn bds_dir(&self) -> Option<&str> {
        self.get("BDS").filter(|v| !v.is_empty())
    }

    pub fn into_vars(self) -> HashMap<String, String> {
        self.vars
    }
}

/// `@SET KEY=VALUE` / `set KEY=VALUE` → `(KEY, VALUE)`.
fn split_set_statement(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    let line = line.strip_prefix('@').unwrap_or(line);
    let keyword = line.get(..3)?;
    if !keyword.eq_ignore_ascii_case("set") {
        return None;
    }
    let rest = &line[3..];
    // `SETLOCAL` and friends
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let (key, value) = rest.trim_start().split_once('=')?;
    let key = key.trim();
    (!key.is_empty()).then_some((key, value))
}

/// Expand `%NAME%` from the variables seen so far, then from the process
/// environment. Anything else expands to nothing, like `cmd.exe` does for an
/// unset variable inside a script.
fn expand_percent(raw: &str, known: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pieces = raw.split('%');
    if let Some(head) = pieces.next() {
        out.push_str(head);
    }
    let mut inside = true;
    for piece in pieces {
        if inside {
            if let Some(v) = known.get(piece) {
                out.push_str(v);
            } else if let Ok(v) = std::env::var(piece) {
                out.push_str(&v);
            }
        } else {
            out.push_str(piece);
        }
        inside = !inside;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_set_lines_in_any_case() {
        let script = EnvScript::parse(
            "@echo off\nREM comment\n@SET BDS=C:\\Studio\\23.0\nset FOO=bar\n@Set EMPTY=\n",
        );
        assert_eq!(script.bds_dir(), Some("C:\\Studio\\23.0"));
        assert_eq!(script.get("FOO"), Some("bar"));
        assert_eq!(script.get("EMPTY"), Some(""));
    }

    #[test]
    fn skips_setlocal() {
        let script = EnvScript::parse("SETLOCAL\n@SET BDS=C:\\D\n");
        assert_eq!(script.into_vars().len(), 1);
    }

    #[test]
    fn expands_earlier_definitions() {
        let script = EnvScript::parse(
            "@SET BDS=C:\\Delphi\n@SET BDSLIB=%BDS%\\lib\n\
             @SET PATH=%BDSLIB%;%VSDELPHI_SURELY_UNSET_42%;x\n",
        );
        assert_eq!(script.get("BDSLIB"), Some("C:\\Delphi\\lib"));
        assert_eq!(script.get("PATH"), Some("C:\\Delphi\\lib;;x"));
    }

    #[test]
    fn falls_back_to_process_environment() {
        let script = EnvScript::parse("@SET MY_PATH=%PATH%\n");
        assert_eq!(
            script.get("MY_PATH").unwrap(),
            std::env::var("PATH").unwrap_or_default()
        );
    }

    #[tokio::test]
    async fn read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rsvars.bat");
        std::fs::write(
            &path,
            "@SET BDS=C:\\Program Files (x86)\\Embarcadero\\Studio\\22.0\r\n",
        )
        .unwrap();
        let script = EnvScript::read(&path).await.unwrap();
        assert_eq!(
            script.bds_dir(),
            Some("C:\\Program Files (x86)\\Embarcadero\\Studio\\22.0")
        );
    }
}
