use std::path::Path;

use indexmap::IndexMap;

use quarry_planner::{ActionKind, Plan, PlannedAction};
use quarry_project::{Lock, LockedPackage, Manifest, ProjectLayout, UseFlag};
use quarry_registry::{Recipe, Registry};

use crate::fsmonitor::FsMonitor;
use crate::runner::ShellRunner;
use crate::script::assemble_install_script;
use crate::InstallError;

/// The outcome of a successful transaction.
#[derive(Debug, Default)]
pub struct InstallReport {
    /// Packages built, in execution order.
    pub installed: Vec<String>,
    /// Packages skipped because they were already satisfied.
    pub skipped: Vec<String>,
}

/// Executes a plan transactionally.
///
/// For every action: back up the files the lock records for the package,
/// delete them, build the new version inside the filesystem monitor, and
/// update the in-memory lock with the captured files. If any action fails,
/// every backup taken in this transaction is restored and neither the
/// manifest nor the lock is written. Only after the last action succeeds are
/// both persisted atomically and the backups discarded.
pub struct Installer<'a, R: Registry, S: ShellRunner> {
    registry: &'a mut R,
    runner: &'a mut S,
    layout: &'a ProjectLayout,
    manifest: &'a mut Manifest,
    lock: &'a mut Lock,
    os: String,
    arch: String,
}

impl<'a, R: Registry, S: ShellRunner> Installer<'a, R, S> {
    pub fn new(
        registry: &'a mut R,
        runner: &'a mut S,
        layout: &'a ProjectLayout,
        manifest: &'a mut Manifest,
        lock: &'a mut Lock,
        os: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            runner,
            layout,
            manifest,
            lock,
            os: os.into(),
            arch: arch.into(),
        }
    }

    pub fn install(&mut self, plan: &Plan) -> Result<InstallReport, InstallError> {
        self.layout.ensure_skeleton()?;
        let global_use = self.manifest.use_flag_map();

        let mut report = InstallReport::default();
        // Packages whose previous files sit in the backup staging area; on
        // failure they are restored in reverse order.
        let mut backed_up: Vec<String> = Vec::new();

        for action in &plan.actions {
            if action.kind == ActionKind::AlreadyInstalled {
                report.skipped.push(action.name.clone());
                continue;
            }

            match self.install_one(action, &global_use, &mut backed_up) {
                Ok(()) => report.installed.push(action.name.clone()),
                Err(err) => {
                    tracing::warn!("installing {} failed, rolling back", action.name);
                    for package in backed_up.iter().rev() {
                        if let Err(restore_err) = self.restore_backup(package) {
                            tracing::warn!(
                                "could not restore `{package}` from its backup: {restore_err}"
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }

        // The transaction succeeded: persist the manifest and lock together,
        // then drop the backups. A leftover backup directory is only noise.
        self.manifest.write(&self.layout.manifest_path())?;
        self.lock.write(&self.layout.lock_path())?;
        for package in &backed_up {
            let backup_dir = self.layout.package_temp_dir(package);
            if let Err(err) = fs_err::remove_dir_all(&backup_dir) {
                tracing::warn!(
                    "could not remove the backup directory {}: {err}",
                    backup_dir.display()
                );
            }
        }

        Ok(report)
    }

    fn install_one(
        &mut self,
        action: &PlannedAction,
        global_use: &IndexMap<String, bool>,
        backed_up: &mut Vec<String>,
    ) -> Result<(), InstallError> {
        let version = action.version.to_string();
        tracing::debug!("installing {} {version}", action.name);

        if action.exists_in_lock {
            self.backup_package_files(&action.name)?;
            backed_up.push(action.name.clone());
            self.delete_package_files(&action.name)?;
        }

        let recipe =
            self.registry
                .fetch_recipe(&action.name, &version, &self.os, &self.arch)?;
        self.write_patches(&action.name, &version, &recipe)?;

        let script = assemble_install_script(
            &action.name,
            &version,
            &self.layout.build_dir(),
            &self.layout.install_dir(),
            &recipe.install_script,
        );
        let script_path = self
            .layout
            .build_dir()
            .join(format!("install-{}-{version}.sh", action.name));
        fs_err::write(&script_path, script)?;
        set_executable(&script_path)?;

        let monitor = FsMonitor::begin(&self.layout.install_dir())?;
        let status = self.runner.run(&script_path)?;
        if !status.success() {
            return Err(InstallError::BuildFailed {
                package: action.name.clone(),
                version,
                code: status.code(),
            });
        }
        let new_files = monitor.end(&self.layout.install_dir())?;

        // The flags the package was built with: the global selection
        // restricted to the flags it declares.
        let use_flags: Vec<UseFlag> = recipe
            .iuse
            .iter()
            .filter(|flag| global_use.get(&flag.name).copied() == Some(flag.enabled))
            .cloned()
            .collect();

        let direct_requirement = action.direct_requirement.as_deref().map(|requirement| {
            if requirement.is_empty() {
                // The user named the package without a version; pin the
                // caret-expanded range of what was built.
                format!("^{version}")
            } else {
                requirement.to_string()
            }
        });
        if let Some(requirement) = &direct_requirement {
            self.manifest.set_dependency(&action.name, requirement);
        }

        self.lock.upsert_package(
            &action.name,
            LockedPackage {
                version,
                requires: recipe.dependencies.clone(),
                iuse: recipe.iuse.clone(),
                use_flags,
                files: new_files,
            },
            direct_requirement.as_deref(),
        );

        Ok(())
    }

    /// Copies every lock-recorded file of a package into its backup staging
    /// directory, preserving the relative tree.
    fn backup_package_files(&self, package: &str) -> Result<(), InstallError> {
        let Some(locked) = self.lock.package(package) else {
            return Ok(());
        };

        let backup_dir = self.layout.package_temp_dir(package);
        if backup_dir.exists() {
            fs_err::remove_dir_all(&backup_dir)?;
        }
        fs_err::create_dir_all(&backup_dir)?;

        let install_dir = self.layout.install_dir();
        for file in &locked.files {
            let source = install_dir.join(file);
            if !source.exists() {
                tracing::warn!("`{file}` is recorded for {package} but missing on disk");
                continue;
            }
            let target = backup_dir.join(file);
            if let Some(parent) = target.parent() {
                fs_err::create_dir_all(parent)?;
            }
            fs_err::copy(&source, &target)?;
        }
        Ok(())
    }

    /// Removes a package's lock-recorded files from the install tree.
    fn delete_package_files(&self, package: &str) -> Result<(), InstallError> {
        let Some(locked) = self.lock.package(package) else {
            return Ok(());
        };
        let install_dir = self.layout.install_dir();
        for file in &locked.files {
            let path = install_dir.join(file);
            match fs_err::remove_file(&path) {
                Ok(()) => tracing::debug!("removed {}", path.display()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Restores a package's backup into the install tree, overwriting any
    /// partial new state.
    fn restore_backup(&self, package: &str) -> Result<(), InstallError> {
        let backup_dir = self.layout.package_temp_dir(package);
        if !backup_dir.exists() {
            return Ok(());
        }
        let install_dir = self.layout.install_dir();
        for entry in walkdir::WalkDir::new(&backup_dir) {
            let entry = entry.map_err(|err| {
                InstallError::Io(err.into_io_error().unwrap_or_else(|| {
                    std::io::Error::other("walk of the backup directory failed")
                }))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&backup_dir)
                .expect("backup entries live below the backup dir");
            let target = install_dir.join(relative);
            if let Some(parent) = target.parent() {
                fs_err::create_dir_all(parent)?;
            }
            fs_err::copy(entry.path(), &target)?;
        }
        Ok(())
    }

    /// Drops the recipe's patches into the source area, named so a recipe
    /// body can locate them.
    fn write_patches(
        &self,
        package: &str,
        version: &str,
        recipe: &Recipe,
    ) -> Result<(), InstallError> {
        for (filename, payload) in &recipe.patches {
            let path = self
                .layout
                .source_dir()
                .join(format!("patch-{package}-{version}-{filename}"));
            if let Some(parent) = path.parent() {
                fs_err::create_dir_all(parent)?;
            }
            fs_err::write(&path, payload)?;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs_err::metadata(path)?.permissions();
    permissions.set_mode(0o744);
    fs_err::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
