//! Mapping Builder: lowercase file name → absolute source path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::paths;

/// Case-insensitive lookup from a unit's file name to where it lives.
///
/// Built from an ordered list of files; when two files share a name the one
/// inserted last wins, so callers put the paths they trust least first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitMapping {
    entries: HashMap<String, PathBuf>,
}

fn key_of(name: &str) -> String {
    paths::basename(name).to_lowercase()
}

impl UnitMapping {
    /// An empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` under its lowercase file name, replacing any earlier
    /// file with the same name. Paths without a file name are ignored.
    pub fn insert(&mut self, path: PathBuf) {
        let key = key_of(&path.to_string_lossy());
        if key.is_empty() {
            return;
        }
        self.entries.insert(key, path);
    }

    /// Look up the file a map-file fragment refers to. Only the fragment's
    /// file name is used, compared without regard to case.
    pub fn resolve(&self, fragment: &str) -> Option<&Path> {
        self.entries.get(&key_of(fragment)).map(PathBuf::as_path)
    }

    /// Number of distinct file names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(lowercase name, path)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_path()))
    }
}

impl FromIterator<PathBuf> for UnitMapping {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        let mut mapping = Self::new();
        for path in iter {
            mapping.insert(path);
        }
        mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_lowercase_basenames() {
        let mapping: UnitMapping = [
            PathBuf::from(r"C:\src\MainForm.pas"),
            PathBuf::from(r"C:\src\inc\Defs.INC"),
        ]
        .into_iter()
        .collect();

        let mut keys: Vec<_> = mapping.iter().map(|(k, _)| k.to_string()).collect();
        keys.sort();
        assert_eq!(keys, vec!["defs.inc", "mainform.pas"]);
    }

    #[test]
    fn later_entries_win() {
        let mapping: UnitMapping = [
            PathBuf::from("/first/Utils.pas"),
            PathBuf::from("/second/utils.PAS"),
        ]
        .into_iter()
        .collect();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.resolve("Utils.pas"), Some(Path::new("/second/utils.PAS")));
    }

    #[test]
    fn lookup_ignores_fragment_directory_and_case() {
        let mapping: UnitMapping = [PathBuf::from("/proj/units/MyUnit.pas")].into_iter().collect();
        assert_eq!(
            mapping.resolve(r"..\..\old\build\MYUNIT.pas"),
            Some(Path::new("/proj/units/MyUnit.pas"))
        );
        assert_eq!(mapping.resolve("Other.pas"), None);
    }

    #[test]
    fn empty_by_default() {
        assert!(UnitMapping::new().is_empty());
    }
}
