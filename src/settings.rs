//! Tool configuration.
//!
//! Read from `vsdelphi.json` in the workspace root (or an explicit file),
//! using the same camelCase keys the editor settings had:
//!
//! ```json
//! {
//!     "rsvarsPath": "C:\\Program Files (x86)\\Embarcadero\\Studio\\22.0\\bin\\rsvars.bat",
//!     "bdsDir": "C:\\Program Files (x86)\\Embarcadero\\Studio\\22.0",
//!     "registryKey": "Software\\Embarcadero\\BDS\\22.0"
//! }
//! ```
//!
//! Any key can be overridden with `VSDELPHI_<KEY>` in the environment, for
//! example `VSDELPHI_RSVARS_PATH`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::symbols::DEFAULT_CONVERTER;

pub const FILE_NAME: &str = "vsdelphi.json";
pub const DEFAULT_DEBUGGER: &str = "windbg";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Unable to obtain {key} from config. Make sure it is set.")]
    Missing { key: &'static str },
    #[error("cannot read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub rsvars_path: Option<String>,
    pub bds_dir: Option<String>,
    pub registry_key: Option<String>,
    pub map2pdb_path: Option<String>,
    pub debugger: Option<String>,
}

/// `(json key, environment variable)` for every setting.
const ENV_KEYS: [(&str, &str); 5] = [
    ("rsvarsPath", "VSDELPHI_RSVARS_PATH"),
    ("bdsDir", "VSDELPHI_BDS_DIR"),
    ("registryKey", "VSDELPHI_REGISTRY_KEY"),
    ("map2pdbPath", "VSDELPHI_MAP2PDB_PATH"),
    ("debugger", "VSDELPHI_DEBUGGER"),
];

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Settings {
    pub fn from_json(text: &str, path: &Path) -> Result<Self, SettingsError> {
        serde_json::from_str(text).map_err(|source| SettingsError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `explicit` if given (it must exist), else `<workspace>/vsdelphi.json`
    /// if present, else defaults. Environment overrides are applied last.
    pub async fn load(explicit: Option<&Path>, workspace: &Path) -> Result<Self, SettingsError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default = workspace.join(FILE_NAME);
                tokio::fs::try_exists(&default)
                    .await
                    .unwrap_or(false)
                    .then_some(default)
            }
        };
        let settings = match path {
            Some(path) => {
                let text = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|source| SettingsError::Io {
                        path: path.clone(),
                        source,
                    })?;
                Self::from_json(&text, &path)?
            }
            None => Self::default(),
        };
        Ok(settings.with_overrides(|var| std::env::var(var).ok()))
    }

    /// Apply overrides; `lookup` maps an environment variable name to its value.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for (key, var) in ENV_KEYS {
            let Some(value) = lookup(var) else { continue };
            let slot = match key {
                "rsvarsPath" => &mut self.rsvars_path,
                "bdsDir" => &mut self.bds_dir,
                "registryKey" => &mut self.registry_key,
                "map2pdbPath" => &mut self.map2pdb_path,
                _ => &mut self.debugger,
            };
            *slot = Some(value);
        }
        self
    }

    pub fn require_rsvars_path(&self) -> Result<&str, SettingsError> {
        present(&self.rsvars_path).ok_or(SettingsError::Missing { key: "rsvarsPath" })
    }

    pub fn require_bds_dir(&self) -> Result<&str, SettingsError> {
        present(&self.bds_dir).ok_or(SettingsError::Missing { key: "bdsDir" })
    }

    pub fn require_registry_key(&self) -> Result<&str, SettingsError> {
        present(&self.registry_key).ok_or(SettingsError::Missing { key: "registryKey" })
    }

    pub fn map2pdb(&self) -> &str {
        present(&self.map2pdb_path).unwrap_or(DEFAULT_CONVERTER)
    }

    pub fn debugger(&self) -> &str {
        present(&self.debugger).unwrap_or(DEFAULT_DEBUGGER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_camel_case_keys() {
        let settings = Settings::from_json(
            r#"{
                "rsvarsPath": "C:\\Studio\\bin\\rsvars.bat",
                "registryKey": "Software\\Embarcadero\\BDS\\22.0"
            }"#,
            Path::new("vsdelphi.json"),
        )
        .unwrap();
        assert_eq!(settings.require_rsvars_path().unwrap(), r"C:\Studio\bin\rsvars.bat");
        assert_eq!(
            settings.require_registry_key().unwrap(),
            r"Software\Embarcadero\BDS\22.0"
        );
        assert_eq!(settings.map2pdb(), DEFAULT_CONVERTER);
        assert_eq!(settings.debugger(), DEFAULT_DEBUGGER);
    }

    #[test]
    fn missing_and_blank_keys_are_reported_by_name() {
        let settings = Settings::from_json(r#"{ "bdsDir": "  " }"#, Path::new("x.json")).unwrap();
        let err = settings.require_bds_dir().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to obtain bdsDir from config. Make sure it is set."
        );
        assert!(matches!(
            settings.require_rsvars_path(),
            Err(SettingsError::Missing { key: "rsvarsPath" })
        ));
    }

    #[test]
    fn environment_overrides_file_values() {
        let settings = Settings {
            rsvars_path: Some("from-file.bat".into()),
            ..Settings::default()
        }
        .with_overrides(|var| match var {
            "VSDELPHI_RSVARS_PATH" => Some("from-env.bat".into()),
            "VSDELPHI_DEBUGGER" => Some("windbgx".into()),
            _ => None,
        });
        assert_eq!(settings.require_rsvars_path().unwrap(), "from-env.bat");
        assert_eq!(settings.debugger(), "windbgx");
    }

    #[tokio::test]
    async fn workspace_file_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(None, dir.path()).await.unwrap();
        assert_eq!(settings.bds_dir, None);

        std::fs::write(dir.path().join(FILE_NAME), r#"{ "bdsDir": "C:\\Studio" }"#).unwrap();
        let settings = Settings::load(None, dir.path()).await.unwrap();
        assert_eq!(settings.bds_dir.as_deref(), Some(r"C:\Studio"));
    }

    #[tokio::test]
    async fn explicit_file_must_exist_and_parse() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(
            Settings::load(Some(&missing), dir.path()).await,
            Err(SettingsError::Io { .. })
        ));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ rsvarsPath: ").unwrap();
        assert!(matches!(
            Settings::load(Some(&broken), dir.path()).await,
            Err(SettingsError::Json { .. })
        ));
    }
}
