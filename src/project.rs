//! Project Descriptor Reader.
//!
//! A `.dproj` file is parsed with `roxmltree` into a light [`ProjectFile`]
//! (property groups as raw tag/value maps plus the item-group entries we
//! care about), and a [`DescriptorReader`] turns that into the
//! [`ProjectDescriptor`] the debug flow works from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::condition::{self, ConditionError};
use crate::paths;

const SEARCH_PATH_TAG: &str = "DCC_UnitSearchPath";
const SEARCH_PATH_SELF: &str = "$(DCC_UnitSearchPath)";

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("cannot read project file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed project file {path}: {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },
    #[error("no <MainSource> declared in {path}")]
    MissingMainSource { path: PathBuf },
    #[error("build configuration '{0}' not found")]
    UnknownConfiguration(String),
    #[error(transparent)]
    Condition(#[from] ConditionError),
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Raw project file
// ═══════════════════════════════════════════════════════════════════════════════

/// One child element of a `<PropertyGroup>`, e.g.
/// `<Config Condition="'$(Config)'==''">Debug</Config>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: String,
    pub condition: Option<String>,
}

/// `<PropertyGroup>`: optional condition plus its properties in document
/// order. Order matters: a property may refer to one declared above it.
#[derive(Debug, Clone, Default)]
pub struct PropertyGroup {
    pub condition: Option<String>,
    pub properties: Vec<Property>,
}

impl PropertyGroup {
    /// Value of the first property named `tag`, whatever its condition.
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.name == tag)
            .map(|p| p.value.as_str())
    }
}

/// `<BuildConfiguration Include="Debug"><Key>Cfg_1</Key>...`
#[derive(Debug, Clone, Default)]
pub struct BuildConfiguration {
    pub name: String,
    pub key: String,
    pub cfg_parent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProjectFile {
    path: PathBuf,
    directory: PathBuf,
    pub property_groups: Vec<PropertyGroup>,
    /// `Include` of every `<DCCReference>`, in document order.
    pub references: Vec<String>,
    pub build_configurations: Vec<BuildConfiguration>,
}

impl ProjectFile {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ProjectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let path = std::path::absolute(path).map_err(|source| ProjectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&source, path)
    }

    /// Like [`ProjectFile::from_file`], reading through `tokio::fs`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ProjectError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let path = std::path::absolute(path).map_err(|source| ProjectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&source, path)
    }

    /// Parse XML text; `path` is where the file is taken to live.
    pub fn parse(source: &str, path: PathBuf) -> Result<Self, ProjectError> {
        let doc = roxmltree::Document::parse(source).map_err(|source| ProjectError::Xml {
            path: path.clone(),
            source,
        })?;

        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut project = Self {
            path,
            directory,
            property_groups: Vec::new(),
            references: Vec::new(),
            build_configurations: Vec::new(),
        };

        for node in doc.root_element().children().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "PropertyGroup" => project.property_groups.push(PropertyGroup {
                    condition: node.attribute("Condition").map(String::from),
                    properties: node
                        .children()
                        .filter(|c| c.is_element())
                        .map(|c| Property {
                            name: c.tag_name().name().to_string(),
                            value: c.text().unwrap_or("").trim().to_string(),
                            condition: c.attribute("Condition").map(String::from),
                        })
                        .collect(),
                }),
                "ItemGroup" => project.parse_item_group(&node),
                _ => {}
            }
        }

        Ok(project)
    }

    fn parse_item_group(&mut self, node: &roxmltree::Node) {
        for item in node.children().filter(|n| n.is_element()) {
            let include = item.attribute("Include").unwrap_or("").to_string();
            match item.tag_name().name() {
                "DCCReference" if !include.is_empty() => self.references.push(include),
                "BuildConfiguration" => self.build_configurations.push(BuildConfiguration {
                    name: include,
                    key: child_text(&item, "Key").unwrap_or_default(),
                    cfg_parent: child_text(&item, "CfgParent"),
                }),
                _ => {}
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Value from the first property group, in document order, that
    /// declares `tag` at all.
    pub fn first_value(&self, tag: &str) -> Option<&str> {
        self.property_groups.iter().find_map(|pg| pg.get(tag))
    }

    /// Every `DCC_UnitSearchPath` entry from every group, in document order.
    /// The self-reference placeholder and empty entries are dropped.
    pub fn unit_search_paths(&self) -> Vec<String> {
        self.property_groups
            .iter()
            .filter_map(|pg| pg.get(SEARCH_PATH_TAG))
            .flat_map(|list| list.split(';'))
            .map(str::trim)
            .filter(|entry| !entry.is_empty() && *entry != SEARCH_PATH_SELF)
            .map(String::from)
            .collect()
    }

    /// MSBuild variables for one configuration/platform, derived from the
    /// `<BuildConfiguration>` chain: each key up to the root is `true`, as is
    /// `{key}_{platform}`.
    fn build_variables(
        &self,
        config: &str,
        platform: &str,
    ) -> Result<HashMap<String, String>, ProjectError> {
        let mut vars = HashMap::new();
        vars.insert("Config".to_string(), config.to_string());
        vars.insert("Configuration".to_string(), config.to_string());
        vars.insert("Platform".to_string(), platform.to_string());

        if !self.build_configurations.iter().any(|bc| bc.name == config) {
            return Err(ProjectError::UnknownConfiguration(config.to_string()));
        }

        let mut current = Some(config.to_string());
        let mut seen = Vec::new();
        while let Some(name) = current.take() {
            if seen.contains(&name) {
                break;
            }
            let Some(bc) = self.build_configurations.iter().find(|bc| bc.name == name) else {
                break;
            };
            vars.insert(bc.key.clone(), "true".to_string());
            vars.insert(format!("{}_{platform}", bc.key), "true".to_string());
            current = bc.cfg_parent.clone();
            seen.push(name);
        }

        Ok(vars)
    }

    /// Merge every property group whose condition holds for the given
    /// configuration/platform, later groups overriding earlier ones.
    ///
    /// Properties are applied in document order and `$(Var)` references are
    /// expanded as values accumulate, so a property sees the ones declared
    /// above it. A property's own `Condition` is checked against the values
    /// in force at that point.
    pub fn active_properties(
        &self,
        config: &str,
        platform: &str,
        env: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>, ProjectError> {
        let build_vars = self.build_variables(config, platform)?;
        let mut vars = env.clone();
        vars.extend(build_vars.clone());
        let mut merged = HashMap::new();

        for pg in &self.property_groups {
            if !holds(pg.condition.as_deref(), &vars)? {
                continue;
            }
            for prop in &pg.properties {
                if !holds(prop.condition.as_deref(), &vars)? {
                    continue;
                }
                let value = expand_vars(&prop.value, &vars);
                merged.insert(prop.name.clone(), value.clone());
                vars.insert(prop.name.clone(), value);
            }
            // the requested selection beats any <Config>/<Platform> default
            vars.extend(build_vars.clone());
        }

        Ok(merged)
    }
}

/// Absent conditions hold.
fn holds(cond: Option<&str>, vars: &HashMap<String, String>) -> Result<bool, ProjectError> {
    match cond {
        Some(cond) => Ok(condition::evaluate(cond, vars)?),
        None => Ok(true),
    }
}

fn child_text(parent: &roxmltree::Node, tag: &str) -> Option<String> {
    parent
        .children()
        .find(|c| c.is_element() && c.tag_name().name() == tag)
        .and_then(|c| c.text())
        .map(|t| t.trim().to_string())
}

/// Expand `$(Var)` references that `vars` knows; unknown ones stay verbatim.
pub fn expand_vars(s: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("$(") {
        let Some(len) = rest[start + 2..].find(')') else {
            break;
        };
        let name = &rest[start + 2..start + 2 + len];
        out.push_str(&rest[..start]);
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + 3 + len]),
        }
        rest = &rest[start + 3 + len..];
    }
    out.push_str(rest);
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
//  Descriptor
// ═══════════════════════════════════════════════════════════════════════════════

/// What the build and debug flows need to know about a project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDescriptor {
    pub project_path: PathBuf,
    pub main_source: PathBuf,
    pub executable: PathBuf,
    /// Raw search-path entries, relative ones still relative to the project.
    pub unit_search_paths: Vec<String>,
    /// `<DCCReference>` units resolved against the project directory.
    pub references: Vec<PathBuf>,
    /// Target platform the output path was resolved for, when known.
    pub platform: Option<String>,
    pub icon: Option<PathBuf>,
}

impl ProjectDescriptor {
    pub fn project_dir(&self) -> &Path {
        self.project_path.parent().unwrap_or(Path::new(""))
    }

    /// The linker writes `<exe name>.map` next to the executable.
    pub fn map_file(&self) -> PathBuf {
        self.executable.with_extension("map")
    }
}

/// Which property values decide the output directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum OutputSelection {
    /// `$(Platform)`/`$(Config)` come from the first property group's own
    /// declarations, whatever configuration the IDE last built.
    #[default]
    FirstGroup,
    /// Evaluate group conditions for this configuration/platform pair.
    Active { config: String, platform: String },
}

impl OutputSelection {
    /// MSBuild `/p:` switches that build what this selection resolves, so
    /// the map file patched afterwards is the one just linked.
    pub fn msbuild_properties(&self) -> Vec<String> {
        match self {
            OutputSelection::FirstGroup => Vec::new(),
            OutputSelection::Active { config, platform } => vec![
                format!("/p:Config={config}"),
                format!("/p:Platform={platform}"),
            ],
        }
    }
}

pub trait DescriptorReader {
    fn read(&self, project: &Path) -> Result<ProjectDescriptor, ProjectError>;
}

/// [`DescriptorReader`] for RAD Studio `.dproj` files.
///
/// ```no_run
/// use vsdelphi::project::{DescriptorReader, DprojReader};
///
/// let descriptor = DprojReader::new()
///     .env_var("BDS", r"C:\Program Files (x86)\Embarcadero\Studio\22.0")
///     .read("App.dproj".as_ref())
///     .unwrap();
/// println!("{}", descriptor.executable.display());
/// ```
#[derive(Debug, Clone, Default)]
pub struct DprojReader {
    env: HashMap<String, String>,
    selection: OutputSelection,
}

impl DprojReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge variables used to expand `$(BDS)`-style references in search
    /// paths. Later calls override earlier values for the same key.
    pub fn env(mut self, vars: HashMap<String, String>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn selection(mut self, selection: OutputSelection) -> Self {
        self.selection = selection;
        self
    }

    /// [`DescriptorReader::read`] without blocking the runtime.
    pub async fn load(&self, project: &Path) -> Result<ProjectDescriptor, ProjectError> {
        self.describe(&ProjectFile::load(project).await?)
    }

    /// Build a descriptor from an already parsed file.
    pub fn describe(&self, file: &ProjectFile) -> Result<ProjectDescriptor, ProjectError> {
        let dir = file.directory();
        let main_raw = file
            .first_value("MainSource")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProjectError::MissingMainSource {
                path: file.path().to_path_buf(),
            })?;
        let main_source = paths::resolve(dir, main_raw);

        let (executable, platform) = match &self.selection {
            OutputSelection::FirstGroup => (
                first_group_executable(file, &main_source),
                file.property_groups
                    .first()
                    .and_then(|pg| pg.get("Platform"))
                    .map(String::from),
            ),
            OutputSelection::Active { config, platform } => {
                let props = file.active_properties(config, platform, &self.env)?;
                let exe = executable_from(
                    dir,
                    props.get("DCC_ExeOutput").map(String::as_str),
                    props.get("SanitizedProjectName").map(String::as_str),
                    &main_source,
                );
                (exe, Some(platform.clone()))
            }
        };

        let unit_search_paths = file
            .unit_search_paths()
            .iter()
            .map(|entry| expand_vars(entry, &self.env))
            .collect();

        Ok(ProjectDescriptor {
            project_path: file.path().to_path_buf(),
            main_source,
            executable,
            unit_search_paths,
            references: file
                .references
                .iter()
                .map(|r| paths::resolve(dir, r))
                .collect(),
            platform,
            icon: file
                .first_value("Icon_MainIcon")
                .filter(|s| !s.is_empty())
                .map(|icon| paths::resolve(dir, &expand_vars(icon, &self.env))),
        })
    }
}

impl DescriptorReader for DprojReader {
    fn read(&self, project: &Path) -> Result<ProjectDescriptor, ProjectError> {
        self.describe(&ProjectFile::from_file(project)?)
    }
}

/// `$(Platform)` and `$(Config)` in `DCC_ExeOutput` are taken from the first
/// property group only.
fn first_group_executable(file: &ProjectFile, main_source: &Path) -> PathBuf {
    let first = file.property_groups.first();
    let mut placeholders = HashMap::new();
    let config = first.and_then(|pg| pg.get("Config").or_else(|| pg.get("Configuration")));
    if let Some(config) = config {
        placeholders.insert("Config".to_string(), config.to_string());
    }
    if let Some(platform) = first.and_then(|pg| pg.get("Platform")) {
        placeholders.insert("Platform".to_string(), platform.to_string());
    }

    let out_dir = file.first_value("DCC_ExeOutput").map(|raw| {
        let expanded = expand_vars(raw, &placeholders);
        if expanded.contains("$(Platform)") || expanded.contains("$(Config)") {
            warn!("unresolved placeholder left in output directory: {expanded}");
        }
        expanded
    });

    executable_from(
        file.directory(),
        out_dir.as_deref(),
        file.first_value("SanitizedProjectName"),
        main_source,
    )
}

fn executable_from(
    project_dir: &Path,
    out_dir: Option<&str>,
    name: Option<&str>,
    main_source: &Path,
) -> PathBuf {
    let name = name.filter(|n| !n.is_empty());
    let out_dir = out_dir.filter(|d| !d.is_empty());
    if out_dir.is_none() || name.is_none() {
        debug!("no complete output declaration, deriving executable from main source");
    }

    let dir = match out_dir {
        Some(raw) => paths::resolve(project_dir, raw),
        None => main_source.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    let stem = match name {
        Some(n) => n.to_string(),
        None => main_source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    dir.join(format!("{stem}.exe"))
}
