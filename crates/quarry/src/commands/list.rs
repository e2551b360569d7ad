use anyhow::Result;

use quarry_project::{Lock, ProjectLayout};

use crate::commands::ExitStatus;
use crate::printer::Printer;

/// Lists the packages recorded in the lock.
pub fn list(layout: &ProjectLayout, printer: Printer) -> Result<ExitStatus> {
    let lock = Lock::read(&layout.lock_path())?;

    if printer.is_quiet() {
        return Ok(ExitStatus::Success);
    }

    if lock.packages.is_empty() {
        anstream::println!("No packages installed.");
        return Ok(ExitStatus::Success);
    }

    for (name, package) in &lock.packages {
        let direct = if lock.dependencies.contains_key(name) {
            ""
        } else {
            " (dependency)"
        };
        if package.use_flags.is_empty() {
            anstream::println!("{name}@{}{direct}", package.version);
        } else {
            let flags = package
                .use_flags
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            anstream::println!("{name}@{} [{flags}]{direct}", package.version);
        }
    }
    Ok(ExitStatus::Success)
}
