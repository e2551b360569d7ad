use std::collections::BTreeSet;

use quarry_project::{Lock, Manifest, ProjectLayout};

use crate::InstallError;

/// The packages removed by an uninstall.
#[derive(Debug, Default)]
pub struct UninstallReport {
    pub removed: Vec<String>,
}

/// Removes packages from the install tree, the lock, and (for direct
/// requirements) the manifest.
///
/// The removal set expands through the reverse-dependency graph: whatever
/// depends on a removed package is removed as well. With `autoremove`,
/// dependencies orphaned by the removal are swept too, unless they are
/// direct requirements. The manifest and lock are persisted after the files
/// are gone.
pub fn uninstall(
    layout: &ProjectLayout,
    manifest: &mut Manifest,
    lock: &mut Lock,
    names: &[String],
    autoremove: bool,
) -> Result<UninstallReport, InstallError> {
    let mut removals: BTreeSet<String> = names
        .iter()
        .filter(|name| lock.package(name).is_some())
        .cloned()
        .collect();

    // Everything that depends on a removed package goes too.
    let mut reverse_dependencies = lock.reverse_dependency_names();
    loop {
        let expansion: BTreeSet<String> = removals
            .iter()
            .filter_map(|name| reverse_dependencies.get(name))
            .flatten()
            .filter(|rdep| !removals.contains(*rdep))
            .cloned()
            .collect();
        if expansion.is_empty() {
            break;
        }
        removals.extend(expansion);
    }

    let dependencies = lock.dependency_names();
    loop {
        let mut changed = false;

        // Forget reverse-dependency edges originating in the removal set.
        for removal in &removals {
            let Some(deps) = dependencies.get(removal) else {
                continue;
            };
            for dep in deps {
                if manifest.dependencies.contains_key(dep) {
                    // A direct requirement stays installed.
                    continue;
                }
                if let Some(rdeps) = reverse_dependencies.get_mut(dep) {
                    if rdeps.remove(removal) {
                        changed = true;
                    }
                }
            }
        }

        // Orphans: dependencies of removed packages that nothing needs
        // anymore and that were not asked for directly.
        if autoremove {
            let orphans: BTreeSet<String> = removals
                .iter()
                .filter_map(|name| dependencies.get(name))
                .flatten()
                .filter(|dep| {
                    !removals.contains(*dep)
                        && lock.package(dep).is_some()
                        && !manifest.dependencies.contains_key(*dep)
                        && reverse_dependencies
                            .get(*dep)
                            .is_none_or(BTreeSet::is_empty)
                })
                .cloned()
                .collect();
            if !orphans.is_empty() {
                removals.extend(orphans);
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    let mut report = UninstallReport::default();
    for name in &removals {
        remove_package_files(layout, lock, name)?;
        lock.remove_package(name);
        manifest.remove_dependency(name);
        report.removed.push(name.clone());
    }

    manifest.write(&layout.manifest_path())?;
    lock.write(&layout.lock_path())?;

    Ok(report)
}

/// Deletes a package's recorded files and any directories left empty.
fn remove_package_files(
    layout: &ProjectLayout,
    lock: &Lock,
    package: &str,
) -> Result<(), InstallError> {
    let Some(locked) = lock.package(package) else {
        return Ok(());
    };
    let install_dir = layout.install_dir();

    let mut parents: BTreeSet<std::path::PathBuf> = BTreeSet::new();
    for file in &locked.files {
        let path = install_dir.join(file);
        match fs_err::remove_file(&path) {
            Ok(()) => tracing::debug!("removed {}", path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        if let Some(parent) = path.parent() {
            parents.insert(parent.to_path_buf());
        }
    }

    // Clean up empty directories, deepest first, walking up to the install
    // root.
    for parent in parents.iter().rev() {
        let mut dir = parent.as_path();
        loop {
            if dir == install_dir || !dir.starts_with(&install_dir) {
                break;
            }
            let mut entries = match fs_err::read_dir(dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => break,
                Err(err) => return Err(err.into()),
            };
            if entries.next().is_some() {
                break;
            }
            fs_err::remove_dir(dir)?;
            tracing::debug!("removed directory {}", dir.display());
            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
    }

    Ok(())
}
