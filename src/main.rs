use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use flexi_logger::Logger;

use vsdelphi::commands::Services;
use vsdelphi::project::OutputSelection;
use vsdelphi::reporter::OutputChannel;
use vsdelphi::settings::Settings;

#[derive(Parser)]
#[command(
    name = "vsdelphi",
    version,
    about = "Build, run and debug Delphi projects"
)]
struct Cli {
    /// Workspace root searched for .dproj files and vsdelphi.json
    /// (defaults to the current directory)
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,
    /// Project file to use instead of searching the workspace
    #[arg(long, global = true)]
    project: Option<PathBuf>,
    /// Settings file (defaults to <workspace>/vsdelphi.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Log specification, e.g. `debug` or `info,vsdelphi::discovery=trace`
    /// (also VSDELPHI_LOG)
    #[arg(long = "log-level", global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project with MSBuild
    Build {
        /// Extra MSBuild arguments (after `--`)
        #[arg(last = true)]
        msbuild_args: Vec<String>,
    },
    /// Build, then run the executable
    Run {
        #[arg(last = true)]
        msbuild_args: Vec<String>,
    },
    /// Run the Clean target
    Clean {
        #[arg(last = true)]
        msbuild_args: Vec<String>,
    },
    /// Build, patch the map file, convert it to PDB and start the debugger
    Debug {
        #[command(flatten)]
        output: OutputArgs,
        #[arg(last = true)]
        msbuild_args: Vec<String>,
    },
    /// Patch the map file with absolute source paths and convert it to PDB
    Map2pdb {
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct OutputArgs {
    /// Resolve the output directory for this configuration (requires --platform)
    #[arg(long, requires = "platform")]
    config: Option<String>,
    /// Resolve the output directory for this platform (requires --config)
    #[arg(long, requires = "config")]
    platform: Option<String>,
}

impl OutputArgs {
    fn selection(self) -> OutputSelection {
        match (self.config, self.platform) {
            (Some(config), Some(platform)) => OutputSelection::Active { config, platform },
            _ => OutputSelection::FirstGroup,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let spec = cli
        .log_level
        .clone()
        .or_else(|| std::env::var("VSDELPHI_LOG").ok())
        .unwrap_or_else(|| "info".to_string());
    let _logger = match Logger::try_with_str(&spec).and_then(|logger| logger.start()) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("warning: logging disabled: {e}");
            None
        }
    };

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let workspace = match cli.workspace {
        Some(dir) => dir,
        None => std::env::current_dir().context("cannot determine the current directory")?,
    };
    let settings = Settings::load(cli.settings.as_deref(), &workspace).await?;

    let channel = OutputChannel::new("Delphi Build");
    channel.show();
    let mut services = Services::new(&workspace, settings, Box::new(channel));
    if let Some(project) = cli.project {
        services = services.project(project);
    }

    match cli.cmd {
        Commands::Build { msbuild_args } => {
            services.build(&msbuild_args).await?;
        }
        Commands::Run { msbuild_args } => services.run(&msbuild_args).await?,
        Commands::Clean { msbuild_args } => services.clean(&msbuild_args).await?,
        Commands::Debug {
            output,
            msbuild_args,
        } => {
            services.debug(&msbuild_args, output.selection()).await?;
        }
        Commands::Map2pdb { output } => {
            services.map2pdb(output.selection()).await?;
        }
    }
    Ok(())
}
