//! Map File Patcher.
//!
//! The Delphi linker names each unit's source in lines like
//!
//! ```text
//! Line numbers for Unit1(Unit1.pas) segment .text
//! ```
//!
//! using whatever path the compiler saw, which a debugger usually cannot
//! find. The patcher swaps the parenthesised part for the absolute path
//! from a [`UnitMapping`]. Everything else in the file, including bytes that
//! are not valid UTF-8 and line endings, is written back untouched.
//!
//! No locking is done: two patches of the same file at once will race.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::{debug, info};
use regex::bytes::{Captures, Regex};

use crate::mapping::UnitMapping;

/// The fragment runs up to the last `)` on the line, so paths such as
/// `C:\Program Files (x86)\...` stay whole.
static LINE_NUMBERS_FOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(Line numbers for [^\r\n(]*\()([^\r\n]*)(\)[^)\r\n]*)")
        .expect("map line pattern")
});

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("{path} is not a .map file")]
    WrongExtension { path: PathBuf },
    #[error("map file {path} does not exist")]
    NotFound { path: PathBuf },
    #[error("no source files were found to patch {path} with")]
    EmptyMapping { path: PathBuf },
    #[error("cannot back up {path} to {backup}: {source}")]
    Backup {
        path: PathBuf,
        backup: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a successful patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchReport {
    pub backup: PathBuf,
    /// Fragments replaced with a mapped path.
    pub rewritten: usize,
    /// Fragments with no mapping, each listed once.
    pub unmapped: Vec<String>,
}

/// `App.map` → `App.map.bak`.
pub fn backup_path(map_file: &Path) -> PathBuf {
    let mut name = map_file.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Rewrite fragments in map-file bytes. Returns the new content together
/// with the rewrite count and the unmapped fragments.
pub fn patch_content(content: &[u8], mapping: &UnitMapping) -> (Vec<u8>, usize, Vec<String>) {
    let mut rewritten = 0;
    let mut unmapped: Vec<String> = Vec::new();

    let patched = LINE_NUMBERS_FOR.replace_all(content, |caps: &Captures| {
        let fragment = String::from_utf8_lossy(&caps[2]);
        let mut line = caps[1].to_vec();
        match mapping.resolve(&fragment) {
            Some(path) => {
                rewritten += 1;
                line.extend_from_slice(path.to_string_lossy().as_bytes());
            }
            None => {
                if !unmapped.iter().any(|u| *u == fragment) {
                    unmapped.push(fragment.to_string());
                }
                line.extend_from_slice(&caps[2]);
            }
        }
        line.extend_from_slice(&caps[3]);
        line
    });

    (patched.into_owned(), rewritten, unmapped)
}

/// Patch `map_file` in place after copying it to `<name>.map.bak`.
///
/// Fails before touching anything when the file is not a `.map`, does not
/// exist, or `mapping` is empty. Unmapped fragments are reported but are not
/// an error.
pub async fn patch_map_file(
    map_file: &Path,
    mapping: &UnitMapping,
) -> Result<PatchReport, PatchError> {
    let path = map_file.to_path_buf();
    if !map_file
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("map"))
    {
        return Err(PatchError::WrongExtension { path });
    }
    if !tokio::fs::try_exists(map_file).await.unwrap_or(false) {
        return Err(PatchError::NotFound { path });
    }
    if mapping.is_empty() {
        return Err(PatchError::EmptyMapping { path });
    }

    let backup = backup_path(map_file);
    tokio::fs::copy(map_file, &backup)
        .await
        .map_err(|source| PatchError::Backup {
            path: path.clone(),
            backup: backup.clone(),
            source,
        })?;
    debug!("backed up {} to {}", map_file.display(), backup.display());

    let content = tokio::fs::read(map_file)
        .await
        .map_err(|source| PatchError::Io {
            path: path.clone(),
            source,
        })?;
    let (patched, rewritten, unmapped) = patch_content(&content, mapping);
    for fragment in &unmapped {
        info!("no source file known for {fragment}, left as is");
    }
    tokio::fs::write(map_file, patched)
        .await
        .map_err(|source| PatchError::Io {
            path: path.clone(),
            source,
        })?;

    Ok(PatchReport {
        backup,
        rewritten,
        unmapped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP: &str = "\r\n Start         Length     Name                   Class\r\n\
 0001:00401000 000A2B4CH .text                   CODE\r\n\r\n\
Line numbers for System(System.pas) segment .text\r\n\r\n\
   123 0001:00002F70   124 0001:00002F78\r\n\r\n\
Line numbers for Unit1(..\\old\\Unit1.pas) segment .text\r\n\r\n\
    28 0001:000A2A80    29 0001:000A2A94\r\n";

    fn mapping() -> UnitMapping {
        [PathBuf::from("/proj/src/Unit1.pas")].into_iter().collect()
    }

    #[test]
    fn rewrites_known_fragments_only() {
        let (out, rewritten, unmapped) = patch_content(MAP.as_bytes(), &mapping());
        let out = String::from_utf8(out).unwrap();
        assert_eq!(rewritten, 1);
        assert_eq!(unmapped, vec!["System.pas"]);
        assert!(out.contains("Line numbers for Unit1(/proj/src/Unit1.pas) segment .text\r\n"));
        assert!(out.contains("Line numbers for System(System.pas) segment .text\r\n"));
        assert_eq!(out.replace("/proj/src/Unit1.pas", r"..\old\Unit1.pas"), MAP);
    }

    #[test]
    fn non_utf8_bytes_pass_through() {
        let mut content = b"Name \xe9t\xe9\nLine numbers for A(a.pas) segment .text\n".to_vec();
        content.extend_from_slice(b"\xff\n");
        let (out, _, _) = patch_content(&content, &mapping());
        assert_eq!(out, content);
    }

    #[test]
    fn patching_twice_matches_patching_once() {
        let (once, _, _) = patch_content(MAP.as_bytes(), &mapping());
        let (twice, _, _) = patch_content(&once, &mapping());
        assert_eq!(once, twice);
    }

    #[test]
    fn fragments_with_parentheses_are_kept_whole() {
        let content = b"Line numbers for Foo(C:\\Program Files (x86)\\src\\Foo.pas) \
segment .text\r\n\
Line numbers for Bar(C:\\Projects (old)\\Bar.pas) segment .text\r\n";
        let mapping: UnitMapping = [PathBuf::from("/proj/src/Foo.pas")]
            .into_iter()
            .collect();

        let (out, rewritten, unmapped) = patch_content(content, &mapping);
        assert_eq!(rewritten, 1);
        assert_eq!(unmapped, vec![r"C:\Projects (old)\Bar.pas"]);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Line numbers for Foo(/proj/src/Foo.pas) segment .text\r\n\
Line numbers for Bar(C:\\Projects (old)\\Bar.pas) segment .text\r\n"
        );
    }

    #[test]
    fn backup_name_appends_bak() {
        assert_eq!(
            backup_path(Path::new("/out/App.map")),
            PathBuf::from("/out/App.map.bak")
        );
    }

    #[tokio::test]
    async fn patches_file_and_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let map = dir.path().join("App.map");
        std::fs::write(&map, MAP).unwrap();

        let report = patch_map_file(&map, &mapping()).await.unwrap();
        assert_eq!(report.rewritten, 1);
        assert_eq!(report.backup, dir.path().join("App.map.bak"));
        assert_eq!(std::fs::read_to_string(&report.backup).unwrap(), MAP);
        assert!(std::fs::read_to_string(&map).unwrap().contains("(/proj/src/Unit1.pas)"));
    }

    #[tokio::test]
    async fn second_patch_leaves_map_alone_but_refreshes_backup() {
        let dir = tempfile::tempdir().unwrap();
        let map = dir.path().join("App.map");
        std::fs::write(&map, MAP).unwrap();

        patch_map_file(&map, &mapping()).await.unwrap();
        let once = std::fs::read(&map).unwrap();
        assert_ne!(once, MAP.as_bytes());

        let report = patch_map_file(&map, &mapping()).await.unwrap();
        assert_eq!(report.rewritten, 1);
        assert_eq!(std::fs::read(&map).unwrap(), once);
        assert_eq!(std::fs::read(&report.backup).unwrap(), once);
    }

    #[tokio::test]
    async fn wrong_extension_is_rejected_without_writes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("build.txt");
        std::fs::write(&file, MAP).unwrap();

        let err = patch_map_file(&file, &mapping()).await.unwrap_err();
        assert!(matches!(err, PatchError::WrongExtension { .. }));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), MAP);
        assert!(!backup_path(&file).exists());
    }

    #[tokio::test]
    async fn missing_file_and_empty_mapping_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let map = dir.path().join("App.map");
        assert!(matches!(
            patch_map_file(&map, &mapping()).await,
            Err(PatchError::NotFound { .. })
        ));

        std::fs::write(&map, MAP).unwrap();
        assert!(matches!(
            patch_map_file(&map, &UnitMapping::new()).await,
            Err(PatchError::EmptyMapping { .. })
        ));
        assert!(!backup_path(&map).exists());
    }
}
