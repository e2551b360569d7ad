use anyhow::Result;

use quarry_project::{Manifest, ProjectLayout, UseFlag};

use crate::commands::ExitStatus;
use crate::printer::Printer;

#[derive(Debug, Default, Clone)]
pub struct UseFlagsOptions {
    /// Flags to merge into the selection, written `+name` or `-name`.
    pub flags: Vec<String>,
    /// Flag names to drop from the selection entirely.
    pub remove: Vec<String>,
}

/// Shows or edits the project's USE-flag selection.
///
/// Editing only rewrites the manifest; the next install rebuilds whatever
/// the changed flags affect.
pub fn use_flags(
    layout: &ProjectLayout,
    options: &UseFlagsOptions,
    printer: Printer,
) -> Result<ExitStatus> {
    let mut manifest = Manifest::read(&layout.manifest_path())?;

    if options.flags.is_empty() && options.remove.is_empty() {
        if !printer.is_quiet() {
            for flag in &manifest.use_flags {
                anstream::println!("{flag}");
            }
        }
        return Ok(ExitStatus::Success);
    }

    let mut parsed = Vec::with_capacity(options.flags.len());
    for flag in &options.flags {
        parsed.push(flag.parse::<UseFlag>()?);
    }
    manifest.merge_use_flags(&parsed);
    manifest.remove_use_flags(&options.remove);
    manifest.write(&layout.manifest_path())?;

    if !printer.is_quiet() {
        anstream::println!(
            "USE flags: {}",
            manifest
                .use_flags
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        );
    }
    Ok(ExitStatus::Success)
}
