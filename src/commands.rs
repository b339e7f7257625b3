//! The user-facing workflows: build, clean, run, map2pdb and debug.
//!
//! Each workflow resolves the project, does its work and short-circuits on
//! the first failure; nothing downstream of a failed build runs. Shared
//! collaborators live in [`Services`], constructed once by the binary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::discovery;
use crate::env_script::EnvScript;
use crate::launch::{self, DebugConfiguration, DebugHost, LaunchStore, NativeDebugger};
use crate::mapfile::{self, PatchReport};
use crate::mapping::UnitMapping;
use crate::msbuild::{self, BuildRequest};
use crate::paths;
use crate::process::{self, CommandSpec, ProcessError};
use crate::project::{DprojReader, OutputSelection, ProjectDescriptor};
use crate::registry;
use crate::reporter::Reporter;
use crate::settings::Settings;
use crate::symbols;
use crate::workspace::{self, ProjectChooser, PromptChooser};

const DEFAULT_PLATFORM: &str = "Win32";

/// Everything the workflows share, built once per invocation.
pub struct Services {
    workspace: PathBuf,
    settings: Settings,
    project: Option<PathBuf>,
    reporter: Box<dyn Reporter>,
    chooser: Box<dyn ProjectChooser>,
    debug_host: Box<dyn DebugHost>,
}

impl Services {
    /// Services for `workspace` that prompt for a project when several
    /// exist and debug with the configured native debugger.
    pub fn new(
        workspace: impl Into<PathBuf>,
        settings: Settings,
        reporter: Box<dyn Reporter>,
    ) -> Self {
        let debug_host = Box::new(NativeDebugger::new(settings.debugger()));
        Self {
            workspace: workspace.into(),
            settings,
            project: None,
            reporter,
            chooser: Box::new(PromptChooser),
            debug_host,
        }
    }

    /// Use this project file instead of searching the workspace.
    pub fn project(mut self, project: impl Into<PathBuf>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Replace the interactive project prompt.
    pub fn chooser(mut self, chooser: Box<dyn ProjectChooser>) -> Self {
        self.chooser = chooser;
        self
    }

    pub fn debug_host(mut self, host: Box<dyn DebugHost>) -> Self {
        self.debug_host = host;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn select_project(&self) -> Result<PathBuf> {
        let project = workspace::select_project(
            &self.workspace,
            self.project.as_deref(),
            self.chooser.as_ref(),
        )?;
        info!("using project {}", project.display());
        Ok(project)
    }

    fn say(&self, line: impl AsRef<str>) {
        self.reporter.line(line.as_ref());
    }

    // ── build / clean / run ──────────────────────────────────────────────

    /// MSBuild invocation for `project`: extra arguments first, then the
    /// switches selecting `selection`'s configuration and platform.
    pub fn build_request(
        &self,
        project: &Path,
        extra_args: &[String],
        selection: &OutputSelection,
    ) -> Result<BuildRequest> {
        let rsvars = self.settings.require_rsvars_path()?;
        Ok(BuildRequest::new(rsvars, project)
            .args(extra_args.iter().cloned())
            .args(selection.msbuild_properties()))
    }

    /// Build the project and return its path.
    pub async fn build(&self, extra_args: &[String]) -> Result<PathBuf> {
        self.build_selected(extra_args, &OutputSelection::FirstGroup)
            .await
    }

    async fn build_selected(
        &self,
        extra_args: &[String],
        selection: &OutputSelection,
    ) -> Result<PathBuf> {
        self.settings.require_rsvars_path()?;
        let project = self.select_project()?;
        self.msbuild(self.build_request(&project, extra_args, selection)?)
            .await?;
        Ok(project)
    }

    /// Run the `Clean` target.
    pub async fn clean(&self, extra_args: &[String]) -> Result<()> {
        self.settings.require_rsvars_path()?;
        let project = self.select_project()?;
        let request = self.build_request(&project, extra_args, &OutputSelection::FirstGroup)?;
        self.msbuild(request.clean()).await
    }

    async fn msbuild(&self, request: BuildRequest) -> Result<()> {
        let result = msbuild::run_build(&request, self.reporter.as_ref()).await;
        match &result {
            Ok(_) => self.say("Build process exited with code 0"),
            Err(ProcessError::Failed { code, .. }) => {
                self.say(format!("Build process exited with code {code}"))
            }
            Err(e @ ProcessError::Spawn { .. }) => {
                self.say(format!("Build process failed to start: {e}"))
            }
            Err(e @ ProcessError::Io { .. }) => self.say(format!("Build process failed: {e}")),
        }
        result
            .map(drop)
            .with_context(|| format!("build of {} failed", request.project.display()))
    }

    /// Build, then run the executable until it exits.
    pub async fn run(&self, extra_args: &[String]) -> Result<()> {
        let project = self.build(extra_args).await?;
        let descriptor = DprojReader::new().load(&project).await?;
        let exe = &descriptor.executable;

        let mut spec = CommandSpec::new(exe.to_string_lossy());
        if let Some(dir) = exe.parent() {
            spec = spec.current_dir(dir);
        }
        process::run_streamed(&spec, self.reporter.as_ref())
            .await
            .with_context(|| format!("running {} failed", exe.display()))?;
        Ok(())
    }

    // ── map2pdb / debug ──────────────────────────────────────────────────

    /// Patch the project's map file with absolute source paths and convert
    /// it to PDB.
    pub async fn map2pdb(&self, selection: OutputSelection) -> Result<ProjectDescriptor> {
        let project = self.select_project()?;
        self.map2pdb_for(&project, selection).await
    }

    async fn map2pdb_for(
        &self,
        project: &Path,
        selection: OutputSelection,
    ) -> Result<ProjectDescriptor> {
        let bds_dir = self.settings.require_bds_dir()?;
        let registry_key = self.settings.require_registry_key()?;

        let vars = self.environment(bds_dir).await;
        let descriptor = DprojReader::new()
            .env(vars.clone())
            .selection(selection)
            .load(project)
            .await?;

        let platform = descriptor.platform.as_deref().unwrap_or(DEFAULT_PLATFORM);
        let library: Vec<PathBuf> = registry::browsing_paths(registry_key, platform, &vars)
            .await
            .into_iter()
            .filter(|entry| {
                let resolved = !entry.contains("$(");
                if !resolved {
                    debug!("skipping library path with unknown variables: {entry}");
                }
                resolved
            })
            .map(|entry| paths::resolve(descriptor.project_dir(), &entry))
            .collect();

        let units = discovery::discover_units(&descriptor, &library).await;
        let mapping: UnitMapping = units.into_iter().collect();
        info!("{} source file(s) known", mapping.len());

        let map_file = descriptor.map_file();
        let report = mapfile::patch_map_file(&map_file, &mapping).await?;
        self.report_patch(&map_file, &report);

        symbols::convert(self.settings.map2pdb(), &map_file, self.reporter.as_ref())
            .await
            .context("map2pdb failed")?;
        Ok(descriptor)
    }

    fn report_patch(&self, map_file: &Path, report: &PatchReport) {
        self.say(format!(
            "Patched {}: {} path(s) rewritten, {} left unmapped (backup: {})",
            map_file.display(),
            report.rewritten,
            report.unmapped.len(),
            report.backup.display()
        ));
    }

    /// `$(BDS)`-style variables: the environment script when readable, with
    /// `BDS` always taken from settings.
    async fn environment(&self, bds_dir: &str) -> HashMap<String, String> {
        let mut vars = match self.settings.require_rsvars_path() {
            Ok(script) => match EnvScript::read(script).await {
                Ok(script) => script.into_vars(),
                Err(e) => {
                    warn!("cannot read environment script {script}: {e}");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        vars.insert("BDS".to_string(), bds_dir.to_string());
        vars
    }

    /// Build, patch symbols, then start a debug session.
    pub async fn debug(
        &self,
        extra_args: &[String],
        selection: OutputSelection,
    ) -> Result<DebugConfiguration> {
        let project = self.build_selected(extra_args, &selection).await?;
        let descriptor = self.map2pdb_for(&project, selection).await?;
        let store = LaunchStore::in_workspace(&self.workspace);
        let config =
            launch::launch(&store, self.debug_host.as_ref(), &descriptor.executable).await?;
        self.say(format!("Started {}", config.name));
        Ok(config)
    }
}
