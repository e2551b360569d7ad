use anyhow::Result;

use quarry_project::{Manifest, ProjectLayout};

use crate::commands::ExitStatus;
use crate::printer::Printer;

/// Scaffolds a new project: the manifest and the container directories.
pub fn init(layout: &ProjectLayout, name: &str, printer: Printer) -> Result<ExitStatus> {
    if layout.manifest_path().exists() {
        anyhow::bail!(
            "`{}` is already a quarry project",
            layout.root().display()
        );
    }

    let manifest = Manifest::new(name);
    layout.ensure_skeleton()?;
    manifest.write(&layout.manifest_path())?;

    if !printer.is_quiet() {
        anstream::println!("Initialized project `{name}`");
    }
    Ok(ExitStatus::Success)
}
