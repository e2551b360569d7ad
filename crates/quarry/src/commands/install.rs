use anyhow::Result;
use indexmap::IndexMap;

use quarry_install::{Installer, ShellRunner};
use quarry_planner::{ActionKind, Plan};
use quarry_project::{Lock, Manifest, ProjectLayout, Snapshot};
use quarry_registry::Registry;
use quarry_resolver::{resolve, ResolveError, Strategy};

use crate::commands::ExitStatus;
use crate::printer::Printer;

#[derive(Debug, Default, Clone)]
pub struct InstallOptions {
    /// `name` or `name@<range-expr>` arguments. Empty means "install the
    /// manifest's dependencies".
    pub packages: Vec<String>,
    pub force: bool,
    pub strategy: Strategy,
}

/// Resolves, plans, and transactionally installs.
///
/// The transaction is framed by the snapshot API and the dirty sentinel: a
/// sentinel left behind by an earlier run is rolled back first, the sentinel
/// is created for the duration of the transaction, and a successful
/// transaction is folded into the snapshot before the sentinel is removed.
/// On failure the sentinel stays, so the next run starts with a rollback.
pub fn install<R: Registry, S: ShellRunner, V: Snapshot>(
    layout: &ProjectLayout,
    registry: &mut R,
    runner: &mut S,
    snapshot: &mut V,
    options: &InstallOptions,
    printer: Printer,
) -> Result<ExitStatus> {
    snapshot.ensure_ready()?;
    if layout.is_dirty() {
        // A previous transaction did not complete; roll it back.
        tracing::warn!("found an incomplete transaction, rolling back");
        snapshot.reset_hard()?;
        snapshot.clean()?;
        layout.clear_dirty()?;
    }

    let mut manifest = Manifest::read(&layout.manifest_path())?;
    let mut lock = Lock::read(&layout.lock_path())?;

    let explicit = parse_package_arguments(&options.packages)?;

    layout.mark_dirty()?;

    let resolution = match resolve(
        &mut *registry,
        &manifest,
        &lock,
        &explicit,
        options.strategy,
    ) {
        Ok(resolution) => resolution,
        Err(ResolveError::Unsat { message }) => {
            // Unsatisfiable: report and leave every file untouched.
            anstream::eprint!("{message}");
            layout.clear_dirty()?;
            return Ok(ExitStatus::Failure);
        }
        Err(err) => {
            layout.clear_dirty()?;
            return Err(err.into());
        }
    };

    let global_use = manifest.use_flag_map();
    let plan = quarry_planner::plan(
        &resolution,
        &lock,
        &manifest,
        &explicit,
        &global_use,
        options.force,
    );

    if plan.is_empty() || plan.installs().count() == 0 {
        if !printer.is_quiet() {
            anstream::println!("Nothing to install!");
        }
        layout.clear_dirty()?;
        return Ok(ExitStatus::Success);
    }

    if !printer.is_quiet() {
        anstream::println!("The following packages will be installed:");
        print_plan(&plan);
    }

    let report = Installer::new(
        registry,
        runner,
        layout,
        &mut manifest,
        &mut lock,
        std::env::consts::OS,
        std::env::consts::ARCH,
    )
    .install(&plan)?;

    snapshot.amend()?;
    layout.clear_dirty()?;

    if !printer.is_quiet() {
        anstream::println!("Installed {} package(s)", report.installed.len());
    }
    Ok(ExitStatus::Success)
}

/// Parses `name` / `name@<range-expr>` command-line arguments.
fn parse_package_arguments(packages: &[String]) -> Result<IndexMap<String, String>> {
    let mut explicit = IndexMap::new();
    for argument in packages {
        let (name, range_expr) = match argument.split_once('@') {
            Some((name, range_expr)) => (name, range_expr),
            None => (argument.as_str(), ""),
        };
        if name.is_empty() {
            anyhow::bail!("invalid package argument `{argument}`");
        }
        explicit.insert(name.to_string(), range_expr.to_string());
    }
    Ok(explicit)
}

fn print_plan(plan: &Plan) {
    for action in &plan.actions {
        match action.kind {
            ActionKind::AlreadyInstalled => {}
            ActionKind::Direct => {
                if action.exists_in_lock && !action.exact_use_flags {
                    anstream::println!(
                        "{}@{} (USE flags changed)",
                        action.name,
                        action.version
                    );
                } else {
                    anstream::println!("{}@{}", action.name, action.version);
                }
            }
            ActionKind::ReverseDependency => {
                anstream::println!("{}@{} (reverse dependency)", action.name, action.version);
            }
            ActionKind::Dependency => {
                anstream::println!("{}@{} (dependency)", action.name, action.version);
            }
        }
    }
}
