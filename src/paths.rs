//! Path helpers for Windows-style paths found in project, source and map
//! files. These must behave the same whichever host the tool runs on, so
//! both `\` and `/` count as separators and `X:` prefixes count as absolute.

use std::path::{Component, MAIN_SEPARATOR, Path, PathBuf};

/// True for native absolute paths, drive-letter paths and UNC paths.
pub fn is_absolute(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    Path::new(raw).is_absolute()
        || raw.starts_with("\\\\")
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

/// Rewrite both separator styles to the host separator.
pub fn native(raw: &str) -> PathBuf {
    PathBuf::from(raw.replace(['\\', '/'], &MAIN_SEPARATOR.to_string()))
}

/// Resolve `raw` against `base` unless it is already absolute, then drop
/// `.` and fold `..` lexically. The filesystem is not consulted.
pub fn resolve(base: &Path, raw: &str) -> PathBuf {
    let path = native(raw.trim());
    if is_absolute(raw.trim()) {
        normalize(&path)
    } else {
        normalize(&base.join(path))
    }
}

pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if out.file_name().is_some() {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Last path segment, splitting on either separator.
pub fn basename(raw: &str) -> &str {
    raw.rsplit(['\\', '/']).next().unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_and_unc_paths_are_absolute() {
        assert!(is_absolute(r"C:\Projects\App"));
        assert!(is_absolute(r"\\server\share\src"));
        assert!(!is_absolute(r"..\common"));
        assert!(!is_absolute("units"));
    }

    #[test]
    fn resolve_folds_dots() {
        let base = Path::new("/work/app");
        assert_eq!(
            resolve(base, r".\Win32\..\Debug\App.exe"),
            PathBuf::from("/work/app/Debug/App.exe")
        );
        assert_eq!(resolve(base, r"..\lib"), PathBuf::from("/work/lib"));
    }

    #[test]
    fn basename_splits_on_both_separators() {
        assert_eq!(basename(r"C:\src\Unit1.pas"), "Unit1.pas");
        assert_eq!(basename("src/inc/defs.inc"), "defs.inc");
        assert_eq!(basename("System.pas"), "System.pas");
    }
}
