pub mod commands;
pub mod condition;
pub mod discovery;
pub mod env_script;
pub mod launch;
pub mod mapfile;
pub mod mapping;
pub mod msbuild;
pub mod paths;
pub mod process;
pub mod project;
pub mod registry;
pub mod reporter;
pub mod settings;
pub mod symbols;
pub mod workspace;

pub use discovery::discover_units;
pub use env_script::EnvScript;
pub use launch::{DebugConfiguration, DebugHost, LaunchStore};
pub use mapfile::{PatchError, PatchReport, patch_map_file};
pub use mapping::UnitMapping;
pub use project::{DescriptorReader, DprojReader, OutputSelection, ProjectDescriptor, ProjectError};
pub use settings::Settings;
