use anyhow::Result;

use quarry_project::{Lock, Manifest, ProjectLayout, Snapshot};

use crate::commands::ExitStatus;
use crate::printer::Printer;

#[derive(Debug, Default, Clone)]
pub struct UninstallOptions {
    pub packages: Vec<String>,
    /// Also remove dependencies orphaned by the removal.
    pub autoremove: bool,
}

/// Removes packages, their dependents, and (optionally) their orphans.
pub fn uninstall<V: Snapshot>(
    layout: &ProjectLayout,
    snapshot: &mut V,
    options: &UninstallOptions,
    printer: Printer,
) -> Result<ExitStatus> {
    snapshot.ensure_ready()?;
    if layout.is_dirty() {
        tracing::warn!("found an incomplete transaction, rolling back");
        snapshot.reset_hard()?;
        snapshot.clean()?;
        layout.clear_dirty()?;
    }

    let mut manifest = Manifest::read(&layout.manifest_path())?;
    let mut lock = Lock::read(&layout.lock_path())?;

    layout.mark_dirty()?;

    let report = quarry_install::uninstall(
        layout,
        &mut manifest,
        &mut lock,
        &options.packages,
        options.autoremove,
    )?;

    snapshot.amend()?;
    layout.clear_dirty()?;

    if !printer.is_quiet() {
        if report.removed.is_empty() {
            anstream::println!("Nothing to uninstall!");
        } else {
            anstream::println!("The following packages were uninstalled:");
            for name in &report.removed {
                anstream::println!("{name}");
            }
        }
    }
    Ok(ExitStatus::Success)
}
