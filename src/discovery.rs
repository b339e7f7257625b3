//! Unit Discovery: every Pascal source or include file a map file of the
//! project could name.
//!
//! Files come from three places, in this order:
//! 1. the main source file and the units it declares with `in '...'`,
//!    followed by the project's `<DCCReference>` units;
//! 2. a recursive scan of every search path (library paths first, then the
//!    project's own), collapsed so no directory is walked twice;
//! 3. the directories of the declared units, which join the scan even when
//!    no search path covers them.
//!
//! Order matters to [`crate::mapping::UnitMapping`], where the last file
//! with a given name wins.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use glob::MatchOptions;
use log::{debug, warn};
use regex::Regex;

use crate::paths;
use crate::project::ProjectDescriptor;

const SOURCE_EXTENSIONS: [&str; 2] = ["pas", "inc"];

static UNIT_IN_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bin\s+'([^'\r\n]+)'").expect("unit clause pattern"));

// ═══════════════════════════════════════════════════════════════════════════════
//  Declared units
// ═══════════════════════════════════════════════════════════════════════════════

/// Units the main source declares with `Name in 'path'`, resolved against
/// the main source's directory. Unreadable files yield nothing.
pub async fn declared_units(main_source: &Path) -> Vec<PathBuf> {
    let bytes = match tokio::fs::read(main_source).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("cannot read main source {}: {e}", main_source.display());
            return Vec::new();
        }
    };
    let base = main_source.parent().unwrap_or(Path::new(""));
    parse_declared_units(&String::from_utf8_lossy(&bytes), base)
}

fn parse_declared_units(text: &str, base: &Path) -> Vec<PathBuf> {
    UNIT_IN_CLAUSE
        .captures_iter(text)
        .map(|c| paths::resolve(base, &c[1]))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Search paths
// ═══════════════════════════════════════════════════════════════════════════════

/// Comparison key: lowercase path segments, either separator.
fn segments(path: &Path) -> Vec<String> {
    path.to_string_lossy()
        .split(['\\', '/'])
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Drop exact duplicates, then every path that lies under another one.
/// First appearance decides a surviving path's position.
pub fn collapse_search_paths(search_paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut unique: Vec<(Vec<String>, &PathBuf)> = Vec::new();
    for path in search_paths {
        let key = segments(path);
        if !unique.iter().any(|(k, _)| *k == key) {
            unique.push((key, path));
        }
    }

    unique
        .iter()
        .filter(|(key, path)| {
            let covered = unique
                .iter()
                .any(|(other, _)| other.len() < key.len() && key.starts_with(other));
            if covered {
                debug!("search path {} is covered by a parent", path.display());
            }
            !covered
        })
        .map(|(_, path)| (*path).clone())
        .collect()
}

/// Every `.pas`/`.inc` file below `dir`. Glob errors are logged and skipped.
fn expand_dir(dir: &Path) -> Vec<PathBuf> {
    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    let root = glob::Pattern::escape(&dir.to_string_lossy());
    let mut found = Vec::new();

    for ext in SOURCE_EXTENSIONS {
        let pattern = format!("{root}/**/*.{ext}");
        let entries = match glob::glob_with(&pattern, options) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("bad search pattern {pattern}: {e}");
                continue;
            }
        };
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => found.push(path),
                Ok(_) => {}
                Err(e) => warn!("while scanning {}: {e}", dir.display()),
            }
        }
    }

    found
}

/// Scan all directories concurrently. Results are flattened in the order
/// the directories were given; a failed scan contributes nothing.
pub async fn scan_search_paths(dirs: Vec<PathBuf>) -> Vec<PathBuf> {
    let scans: Vec<_> = dirs
        .into_iter()
        .map(|dir| {
            let handle = tokio::task::spawn_blocking({
                let dir = dir.clone();
                move || expand_dir(&dir)
            });
            (dir, handle)
        })
        .collect();

    let mut files = Vec::new();
    for (dir, handle) in scans {
        match handle.await {
            Ok(found) => {
                debug!("{} file(s) under {}", found.len(), dir.display());
                files.extend(found);
            }
            Err(e) => warn!("scan of {} failed: {e}", dir.display()),
        }
    }
    files
}

/// Full discovery for a project. `library_paths` are absolute directories
/// scanned before the project's own search paths.
pub async fn discover_units(
    descriptor: &ProjectDescriptor,
    library_paths: &[PathBuf],
) -> Vec<PathBuf> {
    let project_dir = descriptor.project_dir();

    let mut explicit = vec![descriptor.main_source.clone()];
    explicit.extend(declared_units(&descriptor.main_source).await);
    explicit.extend(descriptor.references.iter().cloned());

    let mut dirs = library_paths.to_vec();
    dirs.extend(
        descriptor
            .unit_search_paths
            .iter()
            .map(|raw| paths::resolve(project_dir, raw)),
    );
    dirs.extend(
        explicit[1..]
            .iter()
            .filter_map(|unit| unit.parent().map(Path::to_path_buf)),
    );

    let dirs = collapse_search_paths(&dirs);
    debug!("scanning {} search path(s)", dirs.len());

    let scanned = scan_search_paths(dirs).await;
    explicit.extend(scanned);
    explicit
}
