use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use owo_colors::OwoColorize;
use url::Url;

use quarry::commands::{self, ExitStatus, InstallOptions, UninstallOptions, UseFlagsOptions};
use quarry::git::GitSnapshot;
use quarry::logging;
use quarry::Printer;
use quarry_install::ProcessRunner;
use quarry_project::ProjectLayout;
use quarry_registry::HttpRegistry;
use quarry_resolver::Strategy;

#[derive(Parser)]
#[command(name = "quarry", author, version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Do not print any output.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    quiet: bool,

    /// Use verbose output.
    #[arg(global = true, long, short, conflicts_with = "quiet")]
    verbose: bool,

    /// The project directory to operate on.
    #[arg(global = true, long, default_value = ".")]
    project: PathBuf,

    /// The registry to fetch packages and recipes from.
    #[arg(global = true, long, env = "QUARRY_REGISTRY")]
    registry: Option<Url>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve, build, and install packages into the project.
    Install(InstallArgs),
    /// Remove packages (and their dependents) from the project.
    Uninstall(UninstallArgs),
    /// Show or edit the project's USE flags.
    Use(UseArgs),
    /// List the installed packages.
    List,
    /// Create a new project in the current directory.
    Init(InitArgs),
}

#[derive(Args)]
struct InstallArgs {
    /// Packages to install, as `name` or `name@<range>`. With no packages,
    /// installs the manifest's dependencies.
    package: Vec<String>,

    /// Reinstall even when the lock already satisfies the request.
    #[arg(long)]
    force: bool,

    /// The strategy used for resolving versions.
    #[arg(long, value_enum, default_value_t = StrategyArg::Favored)]
    strategy: StrategyArg,
}

#[derive(Args)]
struct UninstallArgs {
    /// Packages to remove.
    #[arg(required = true)]
    package: Vec<String>,

    /// Also remove dependencies nothing needs anymore.
    #[arg(long)]
    autoremove: bool,
}

#[derive(Args)]
struct UseArgs {
    /// Flags to set, as `+name` or `-name`.
    flag: Vec<String>,

    /// Flag names to drop from the selection.
    #[arg(long)]
    remove: Vec<String>,
}

#[derive(Args)]
struct InitArgs {
    /// The project name.
    name: String,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StrategyArg {
    /// Newest versions first.
    Latest,
    /// Prefer the versions pinned in the lock.
    Favored,
    /// Only the versions pinned in the lock.
    Locked,
}

impl From<StrategyArg> for Strategy {
    fn from(strategy: StrategyArg) -> Self {
        match strategy {
            StrategyArg::Latest => Strategy::Latest,
            StrategyArg::Favored => Strategy::Favored,
            StrategyArg::Locked => Strategy::Locked,
        }
    }
}

const DEFAULT_REGISTRY: &str = "https://registry.quarry.sh";

fn inner() -> Result<ExitStatus> {
    let cli = Cli::parse();

    logging::setup_logging(if cli.verbose {
        logging::Level::Verbose
    } else {
        logging::Level::Default
    });

    let printer = if cli.quiet {
        Printer::Quiet
    } else if cli.verbose {
        Printer::Verbose
    } else {
        Printer::Default
    };

    let layout = ProjectLayout::new(&cli.project);

    match cli.command {
        Commands::Install(args) => {
            let registry_url = match cli.registry {
                Some(url) => url,
                None => Url::parse(DEFAULT_REGISTRY)?,
            };
            let mut registry = HttpRegistry::new(registry_url)?;
            let mut runner = ProcessRunner;
            let mut snapshot = GitSnapshot::new(layout.container_dir());
            commands::install(
                &layout,
                &mut registry,
                &mut runner,
                &mut snapshot,
                &InstallOptions {
                    packages: args.package,
                    force: args.force,
                    strategy: args.strategy.into(),
                },
                printer,
            )
        }
        Commands::Uninstall(args) => {
            let mut snapshot = GitSnapshot::new(layout.container_dir());
            commands::uninstall(
                &layout,
                &mut snapshot,
                &UninstallOptions {
                    packages: args.package,
                    autoremove: args.autoremove,
                },
                printer,
            )
        }
        Commands::Use(args) => commands::use_flags(
            &layout,
            &UseFlagsOptions {
                flags: args.flag,
                remove: args.remove,
            },
            printer,
        ),
        Commands::List => commands::list(&layout, printer),
        Commands::Init(args) => commands::init(&layout, &args.name, printer),
    }
}

fn main() -> ExitCode {
    match inner() {
        Ok(status) => status.into(),
        Err(err) => {
            let mut causes = err.chain();
            anstream::eprintln!(
                "{}: {}",
                "error".red().bold(),
                causes.next().map(ToString::to_string).unwrap_or_default()
            );
            for cause in causes {
                anstream::eprintln!("  {}: {cause}", "Caused by".red().bold());
            }
            ExitStatus::Error.into()
        }
    }
}
