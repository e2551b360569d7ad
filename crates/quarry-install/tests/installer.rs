//! Transaction tests: the installer must leave either the fully new state
//! or the exact old state behind, never a mixture.

#![cfg(unix)]

use std::collections::BTreeMap;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use quarry_install::{Installer, ShellRunner};
use quarry_planner::{ActionKind, Plan, PlannedAction};
use quarry_project::{Lock, LockedPackage, Manifest, ProjectLayout};
use quarry_registry::MemoryRegistry;

/// A runner that pretends to build: it drops the configured files into the
/// install tree instead of executing the script, and can be told to fail
/// for specific packages.
#[derive(Default)]
struct FakeRunner {
    install_root: PathBuf,
    /// Files to create per package name, with contents.
    outputs: BTreeMap<String, Vec<(String, String)>>,
    /// Packages whose build exits non-zero.
    failing: Vec<String>,
    invocations: Vec<String>,
}

impl FakeRunner {
    fn new(install_root: &Path) -> Self {
        Self {
            install_root: install_root.to_path_buf(),
            ..Self::default()
        }
    }

    fn produces(&mut self, package: &str, files: &[(&str, &str)]) {
        self.outputs.insert(
            package.to_string(),
            files
                .iter()
                .map(|(path, contents)| ((*path).to_string(), (*contents).to_string()))
                .collect(),
        );
    }

    fn fails(&mut self, package: &str) {
        self.failing.push(package.to_string());
    }
}

impl ShellRunner for FakeRunner {
    fn run(&mut self, script: &Path) -> std::io::Result<ExitStatus> {
        // Scripts are named install-<package>-<version>.sh.
        let stem = script
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        let package = stem
            .strip_prefix("install-")
            .and_then(|rest| rest.rsplit_once('-'))
            .map(|(package, _)| package.to_string())
            .unwrap_or_default();
        self.invocations.push(package.clone());

        if self.failing.contains(&package) {
            // Wait status encoding: exit code 1.
            return Ok(ExitStatus::from_raw(256));
        }
        if let Some(files) = self.outputs.get(&package) {
            for (path, contents) in files {
                let target = self.install_root.join(path);
                fs_err::create_dir_all(target.parent().unwrap())?;
                fs_err::write(target, contents)?;
            }
        }
        Ok(ExitStatus::from_raw(0))
    }
}

fn project() -> (tempfile::TempDir, ProjectLayout) {
    let dir = tempfile::tempdir().unwrap();
    let layout = ProjectLayout::new(dir.path());
    layout.ensure_skeleton().unwrap();
    (dir, layout)
}

fn action(name: &str, version: &str, kind: ActionKind, lock: &Lock) -> PlannedAction {
    PlannedAction {
        name: name.to_string(),
        version: version.parse().unwrap(),
        kind,
        direct_requirement: match kind {
            ActionKind::Direct => Some(String::new()),
            _ => None,
        },
        exists_in_lock: lock.package(name).is_some(),
        exact_in_lock: false,
        exact_use_flags: true,
    }
}

#[test]
fn successful_transaction_records_files_and_persists() {
    let (_dir, layout) = project();
    let mut registry = MemoryRegistry::new();
    registry.add_package("a", "1.0.0", &[("b", ">=1.0.0,<4.0.0")]);
    registry.add_package("b", "1.5.0", &[]);
    registry.add_recipe("a", "1.0.0", "true\n", &[], &[("b", ">=1.0.0,<4.0.0")]);
    registry.add_recipe("b", "1.5.0", "true\n", &[], &[]);

    let mut runner = FakeRunner::new(&layout.install_dir());
    runner.produces("a", &[("bin/a", "a binary")]);
    runner.produces("b", &[("lib/libb.so", "b library")]);

    let mut manifest = Manifest::new("demo");
    let mut lock = Lock::default();
    let plan = Plan {
        actions: vec![
            action("b", "1.5.0", ActionKind::Dependency, &lock),
            action("a", "1.0.0", ActionKind::Direct, &lock),
        ],
    };

    let report = Installer::new(
        &mut registry,
        &mut runner,
        &layout,
        &mut manifest,
        &mut lock,
        "Linux",
        "x86_64",
    )
    .install(&plan)
    .unwrap();

    assert_eq!(report.installed, ["b", "a"]);
    assert_eq!(runner.invocations, ["b", "a"]);

    // Every recorded file exists under the install root.
    let a = lock.package("a").unwrap();
    assert_eq!(a.version, "1.0.0");
    assert_eq!(a.files, ["bin/a"]);
    assert_eq!(a.requires.get("b").unwrap(), ">=1.0.0,<4.0.0");
    let b = lock.package("b").unwrap();
    assert_eq!(b.files, ["lib/libb.so"]);
    for package in lock.packages.values() {
        for file in &package.files {
            assert!(layout.install_dir().join(file).exists(), "missing {file}");
        }
    }

    // The bare install was caret-expanded into the manifest and the lock's
    // dependencies section; transitives were not.
    assert_eq!(manifest.dependencies.get("a").unwrap(), "^1.0.0");
    assert!(!manifest.dependencies.contains_key("b"));
    assert_eq!(lock.dependencies.get("a").unwrap(), "^1.0.0");

    // Both files were persisted.
    let manifest_on_disk = Manifest::read(&layout.manifest_path()).unwrap();
    assert_eq!(manifest_on_disk, manifest);
    let lock_on_disk = Lock::read(&layout.lock_path()).unwrap();
    assert_eq!(lock_on_disk, lock);

    // Backups were cleaned up.
    assert!(!layout.package_temp_dir("a").exists());
}

#[test]
fn failed_build_rolls_back_previous_files() {
    let (_dir, layout) = project();
    let mut registry = MemoryRegistry::new();
    registry.add_package("a", "2.0.0", &[]);
    registry.add_recipe("a", "2.0.0", "false\n", &[], &[]);

    // a 1.0.0 is installed with one file on disk.
    let mut manifest = Manifest::new("demo");
    manifest.set_dependency("a", "^1.0.0");
    let mut lock = Lock::default();
    lock.upsert_package(
        "a",
        LockedPackage {
            version: "1.0.0".to_string(),
            files: vec!["bin/a".to_string()],
            ..LockedPackage::default()
        },
        Some("^1.0.0"),
    );
    fs_err::create_dir_all(layout.install_dir().join("bin")).unwrap();
    fs_err::write(layout.install_dir().join("bin/a"), b"old contents").unwrap();

    let manifest_before = manifest.clone();
    let lock_before = lock.clone();

    let mut runner = FakeRunner::new(&layout.install_dir());
    runner.produces("a", &[("bin/a", "new partial contents")]);
    runner.fails("a");

    let plan = Plan {
        actions: vec![action("a", "2.0.0", ActionKind::Direct, &lock)],
    };
    let error = Installer::new(
        &mut registry,
        &mut runner,
        &layout,
        &mut manifest,
        &mut lock,
        "Linux",
        "x86_64",
    )
    .install(&plan)
    .unwrap_err();
    assert!(error.to_string().contains("a@2.0.0"), "error was: {error}");

    // The old file is back, bit for bit.
    let contents = fs_err::read(layout.install_dir().join("bin/a")).unwrap();
    assert_eq!(contents, b"old contents");

    // Neither the manifest nor the lock changed, in memory or on disk.
    assert_eq!(manifest, manifest_before);
    assert_eq!(lock, lock_before);
    assert!(!layout.manifest_path().exists());
    assert!(!layout.lock_path().exists());
}

#[test]
fn failure_restores_every_package_of_the_transaction() {
    let (_dir, layout) = project();
    let mut registry = MemoryRegistry::new();
    registry.add_package("a", "2.0.0", &[]);
    registry.add_package("b", "2.0.0", &[]);
    registry.add_recipe("a", "2.0.0", "true\n", &[], &[]);
    registry.add_recipe("b", "2.0.0", "false\n", &[], &[]);

    let mut manifest = Manifest::new("demo");
    let mut lock = Lock::default();
    for (name, file) in [("a", "bin/a"), ("b", "bin/b")] {
        lock.upsert_package(
            name,
            LockedPackage {
                version: "1.0.0".to_string(),
                files: vec![file.to_string()],
                ..LockedPackage::default()
            },
            Some("^1.0.0"),
        );
        let path = layout.install_dir().join(file);
        fs_err::create_dir_all(path.parent().unwrap()).unwrap();
        fs_err::write(path, format!("old {name}")).unwrap();
    }

    let mut runner = FakeRunner::new(&layout.install_dir());
    runner.produces("a", &[("bin/a", "new a")]);
    runner.fails("b");

    let plan = Plan {
        actions: vec![
            action("a", "2.0.0", ActionKind::Direct, &lock),
            action("b", "2.0.0", ActionKind::Direct, &lock),
        ],
    };
    Installer::new(
        &mut registry,
        &mut runner,
        &layout,
        &mut manifest,
        &mut lock,
        "Linux",
        "x86_64",
    )
    .install(&plan)
    .unwrap_err();

    // a had already been rebuilt when b failed; both are restored.
    assert_eq!(
        fs_err::read(layout.install_dir().join("bin/a")).unwrap(),
        b"old a"
    );
    assert_eq!(
        fs_err::read(layout.install_dir().join("bin/b")).unwrap(),
        b"old b"
    );
}

#[test]
fn already_installed_actions_are_skipped() {
    let (_dir, layout) = project();
    let mut registry = MemoryRegistry::new();
    let mut runner = FakeRunner::new(&layout.install_dir());
    let mut manifest = Manifest::new("demo");
    let mut lock = Lock::default();

    let plan = Plan {
        actions: vec![PlannedAction {
            name: "a".to_string(),
            version: "1.0.0".parse().unwrap(),
            kind: ActionKind::AlreadyInstalled,
            direct_requirement: Some("^1.0.0".to_string()),
            exists_in_lock: true,
            exact_in_lock: true,
            exact_use_flags: true,
        }],
    };
    let report = Installer::new(
        &mut registry,
        &mut runner,
        &layout,
        &mut manifest,
        &mut lock,
        "Linux",
        "x86_64",
    )
    .install(&plan)
    .unwrap();

    assert!(report.installed.is_empty());
    assert_eq!(report.skipped, ["a"]);
    assert!(runner.invocations.is_empty());
}

#[test]
fn use_flags_recorded_are_the_declared_intersection() {
    let (_dir, layout) = project();
    let mut registry = MemoryRegistry::new();
    registry.add_package("c", "1.0.0", &[]);
    registry.add_recipe("c", "1.0.0", "true\n", &["+ssl", "-static"], &[]);

    let mut runner = FakeRunner::new(&layout.install_dir());
    runner.produces("c", &[("lib/c.so", "c")]);

    let mut manifest = Manifest::new("demo");
    manifest.merge_use_flags(&[
        "+ssl".parse().unwrap(),
        "+lto".parse().unwrap(),
        "-static".parse().unwrap(),
    ]);
    let mut lock = Lock::default();

    let plan = Plan {
        actions: vec![action("c", "1.0.0", ActionKind::Direct, &lock)],
    };
    Installer::new(
        &mut registry,
        &mut runner,
        &layout,
        &mut manifest,
        &mut lock,
        "Linux",
        "x86_64",
    )
    .install(&plan)
    .unwrap();

    let c = lock.package("c").unwrap();
    // iuse comes from the recipe; use is the global selection restricted to
    // the declared flags (lto is not declared, so it is not recorded).
    assert_eq!(c.iuse.len(), 2);
    let recorded: Vec<String> = c.use_flags.iter().map(ToString::to_string).collect();
    assert_eq!(recorded, ["+ssl", "-static"]);
}
