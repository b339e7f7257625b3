//! Finding the project file to work on.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use log::debug;

/// Directories never searched for project files: package caches and the
/// IDE's own backup folders.
const SKIPPED_DIRS: [&str; 3] = ["node_modules", "__history", "__recovery"];

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("No .dproj file found in the current workspace ({root}).")]
    NoProject { root: PathBuf },
    #[error("project file {path} does not exist")]
    MissingProject { path: PathBuf },
    #[error("no project selected")]
    NotSelected,
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}

/// Every `.dproj` below `root`, sorted.
pub fn find_project_files(root: &Path) -> Result<Vec<PathBuf>, WorkspaceError> {
    let pattern = format!("{}/**/*.dproj", glob::Pattern::escape(&root.to_string_lossy()));
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..Default::default()
    };

    let mut found: Vec<PathBuf> = glob::glob_with(&pattern, options)?
        .filter_map(Result::ok)
        .filter(|path| {
            !path.components().any(|c| {
                SKIPPED_DIRS
                    .iter()
                    .any(|skip| c.as_os_str().eq_ignore_ascii_case(skip))
            })
        })
        .filter(|path| path.is_file())
        .collect();
    found.sort();
    debug!("{} project file(s) under {}", found.len(), root.display());
    Ok(found)
}

/// Picks one project when the workspace holds several.
pub trait ProjectChooser {
    fn choose(&self, candidates: &[PathBuf]) -> Option<PathBuf>;
}

/// Asks on the terminal with a numbered list.
#[derive(Debug, Default)]
pub struct PromptChooser;

impl ProjectChooser for PromptChooser {
    fn choose(&self, candidates: &[PathBuf]) -> Option<PathBuf> {
        let mut stderr = std::io::stderr();
        for (i, path) in candidates.iter().enumerate() {
            let _ = writeln!(stderr, "  [{}] {}", i + 1, path.display());
        }
        let _ = write!(stderr, "Select a Delphi project file: ");
        let _ = stderr.flush();

        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer).ok()?;
        let index: usize = answer.trim().parse().ok()?;
        candidates.get(index.checked_sub(1)?).cloned()
    }
}

/// Resolve the project to use: `explicit` if given, the only project in
/// `root`, or whatever `chooser` picks among several.
pub fn select_project(
    root: &Path,
    explicit: Option<&Path>,
    chooser: &dyn ProjectChooser,
) -> Result<PathBuf, WorkspaceError> {
    if let Some(path) = explicit {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };
        return if path.is_file() {
            Ok(path)
        } else {
            Err(WorkspaceError::MissingProject { path })
        };
    }

    let mut candidates = find_project_files(root)?;
    match candidates.len() {
        0 => Err(WorkspaceError::NoProject {
            root: root.to_path_buf(),
        }),
        1 => Ok(candidates.remove(0)),
        _ => chooser.choose(&candidates).ok_or(WorkspaceError::NotSelected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct Pick(usize);

    impl ProjectChooser for Pick {
        fn choose(&self, candidates: &[PathBuf]) -> Option<PathBuf> {
            candidates.get(self.0).cloned()
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "<Project/>").unwrap();
    }

    #[test]
    fn empty_workspace_has_no_project() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            select_project(dir.path(), None, &Pick(0)),
            Err(WorkspaceError::NoProject { .. })
        ));
    }

    #[test]
    fn single_project_is_used_and_backups_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("app").join("App.dproj"));
        touch(&dir.path().join("app").join("__history").join("App.dproj"));
        touch(&dir.path().join("node_modules").join("x").join("Other.dproj"));

        let chosen = select_project(dir.path(), None, &Pick(9)).unwrap();
        assert_eq!(chosen, dir.path().join("app").join("App.dproj"));
    }

    #[test]
    fn several_projects_go_to_the_chooser() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a").join("A.dproj"));
        touch(&dir.path().join("b").join("B.dproj"));

        let chosen = select_project(dir.path(), None, &Pick(1)).unwrap();
        assert_eq!(chosen, dir.path().join("b").join("B.dproj"));
        assert!(matches!(
            select_project(dir.path(), None, &Pick(5)),
            Err(WorkspaceError::NotSelected)
        ));
    }

    #[test]
    fn explicit_project_is_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("App.dproj"));
        assert_eq!(
            select_project(dir.path(), Some(Path::new("App.dproj")), &Pick(0)).unwrap(),
            dir.path().join("App.dproj")
        );
        assert!(matches!(
            select_project(dir.path(), Some(Path::new("Nope.dproj")), &Pick(0)),
            Err(WorkspaceError::MissingProject { .. })
        ));
    }
}
