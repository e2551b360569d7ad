//! The execution planner: compares the solver's target state against the
//! installed state recorded in the lock and emits a minimal, topologically
//! ordered list of install actions.
//!
//! Classification starts from the packages the user asked for (or forced)
//! and flows outward to a fixed point: reverse dependencies of anything
//! rebuilt are rebuilt too, newly needed transitives are installed, and
//! whatever is already present at the exact version with the exact USE
//! flags is left alone.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;

use quarry_project::{Lock, LockedPackage, Manifest, UseFlag};
use quarry_resolver::Resolution;
use quarry_version::Version;

/// Why a package appears in the plan.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ActionKind {
    /// Requested by the user, or out of date relative to the request.
    Direct,
    /// Rebuilt because something it depends on changes.
    ReverseDependency,
    /// A newly needed transitive dependency.
    Dependency,
    /// Present at the exact version with the exact USE flags; no work.
    AlreadyInstalled,
}

/// Internal marker used while the classification runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Mark {
    Unknown,
    Direct,
    ReverseDependency,
    Dependency,
    AlreadyInstalled,
}

/// One entry of the plan.
#[derive(Clone, Debug)]
pub struct PlannedAction {
    pub name: String,
    pub version: Version,
    pub kind: ActionKind,
    /// The range expression the user wrote; `Some("")` means the package was
    /// named without a version, `None` that it is only a transitive.
    pub direct_requirement: Option<String>,
    /// Any version of this package is recorded in the lock, so its files
    /// must be backed up before rebuilding.
    pub exists_in_lock: bool,
    pub exact_in_lock: bool,
    pub exact_use_flags: bool,
}

/// The ordered action list. Empty when there is nothing to do.
#[derive(Clone, Debug, Default)]
pub struct Plan {
    pub actions: Vec<PlannedAction>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// The actions that actually build something.
    pub fn installs(&self) -> impl Iterator<Item = &PlannedAction> {
        self.actions
            .iter()
            .filter(|action| action.kind != ActionKind::AlreadyInstalled)
    }
}

/// Computes the execution plan for a resolution.
///
/// `explicit` holds the requirements named on the command line (overriding
/// the manifest), `global_use` the current USE-flag selection, and `force`
/// reinstalls direct requirements even when they are already exact.
pub fn plan(
    resolution: &Resolution,
    lock: &Lock,
    manifest: &Manifest,
    explicit: &IndexMap<String, String>,
    global_use: &IndexMap<String, bool>,
    force: bool,
) -> Plan {
    let mut requirements: IndexMap<String, String> = manifest.dependencies.clone();
    for (name, range_expr) in explicit {
        requirements.insert(name.clone(), range_expr.clone());
    }

    // Dependency edges: the lock's recorded edges, overridden per package by
    // what the solver discovered.
    let mut dependencies_map = lock.dependency_names();
    for (name, deps) in &resolution.dependencies {
        dependencies_map.insert(name.clone(), deps.clone());
    }
    let mut reverse_dependencies_map = lock.reverse_dependency_names();

    // Initial classification.
    let mut entries: Vec<(PlannedAction, Mark)> = resolution
        .packages
        .iter()
        .map(|package| {
            let locked = lock.package(&package.name);
            let exists_in_lock = locked.is_some();
            let exact_in_lock = locked.is_some_and(|locked| {
                locked
                    .version
                    .parse::<Version>()
                    .is_ok_and(|version| version == package.version)
            });
            let exact_use_flags = locked.is_none_or(|locked| use_flags_match(global_use, locked));
            let direct_requirement = requirements.get(&package.name).cloned();

            let mark = if force {
                Mark::Direct
            } else if direct_requirement.is_some() && (!exact_in_lock || !exact_use_flags) {
                Mark::Direct
            } else {
                Mark::Unknown
            };

            let action = PlannedAction {
                name: package.name.clone(),
                version: package.version.clone(),
                kind: ActionKind::AlreadyInstalled,
                direct_requirement,
                exists_in_lock,
                exact_in_lock,
                exact_use_flags,
            };
            (action, mark)
        })
        .collect();

    // Nothing requested means nothing to do, regardless of what the solver
    // would like to refresh.
    if !entries.iter().any(|(_, mark)| *mark == Mark::Direct) {
        return Plan::default();
    }

    // Propagate to a fixed point: reverse dependencies of rebuilt packages
    // rebuild, their dependencies install, and exact dependency entries
    // drop out again.
    loop {
        let mut changed = false;
        let mut dependencies: BTreeSet<String> = BTreeSet::new();
        let mut reverse_dependencies: BTreeSet<String> = BTreeSet::new();

        for (action, mark) in &mut entries {
            match *mark {
                Mark::Direct => {
                    extend_from(&reverse_dependencies_map, &action.name, &mut reverse_dependencies);
                    extend_from(&dependencies_map, &action.name, &mut dependencies);
                }
                Mark::ReverseDependency => *mark = Mark::Unknown,
                _ => {}
            }
        }

        let mut progressed = true;
        while progressed {
            progressed = false;
            for (action, mark) in &mut entries {
                if *mark != Mark::Unknown {
                    continue;
                }
                if reverse_dependencies.contains(&action.name) {
                    *mark = Mark::ReverseDependency;
                } else if dependencies.contains(&action.name) {
                    *mark = Mark::Dependency;
                } else {
                    continue;
                }
                extend_from(&reverse_dependencies_map, &action.name, &mut reverse_dependencies);
                extend_from(&dependencies_map, &action.name, &mut dependencies);
                progressed = true;
            }
        }

        // Whatever the frontier never reached is either satisfied by the
        // lock or a stray transitive that still needs to be built.
        for (action, mark) in &mut entries {
            if *mark == Mark::Unknown {
                *mark = if action.exact_in_lock && action.exact_use_flags {
                    Mark::AlreadyInstalled
                } else {
                    Mark::Dependency
                };
            }
        }

        // A dependency that is already present exactly as required needs no
        // rebuild, and nothing propagates through it.
        for (action, mark) in &mut entries {
            if *mark == Mark::Dependency && action.exact_in_lock && action.exact_use_flags {
                *mark = Mark::AlreadyInstalled;
                reverse_dependencies_map.remove(&action.name);
                dependencies_map.remove(&action.name);
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    for (action, mark) in &mut entries {
        action.kind = match mark {
            Mark::Direct => ActionKind::Direct,
            Mark::ReverseDependency => ActionKind::ReverseDependency,
            Mark::Dependency => ActionKind::Dependency,
            Mark::Unknown | Mark::AlreadyInstalled => ActionKind::AlreadyInstalled,
        };
    }

    let mut actions: Vec<PlannedAction> = entries.into_iter().map(|(action, _)| action).collect();
    sort_topologically(&mut actions, &dependencies_map);

    for action in &actions {
        tracing::debug!("planned {} {} as {:?}", action.name, action.version, action.kind);
    }

    Plan { actions }
}

/// Whether the lock entry was built with USE flags matching the current
/// global selection.
///
/// Two checks, both polarity-exact: every global flag the package declares
/// in its iuse must appear in the flags it was built with, and every flag it
/// was built with must still be selected globally.
fn use_flags_match(global_use: &IndexMap<String, bool>, locked: &LockedPackage) -> bool {
    for (name, &enabled) in global_use {
        let flag = UseFlag {
            name: name.clone(),
            enabled,
        };
        if locked.iuse.contains(&flag) && !locked.use_flags.contains(&flag) {
            return false;
        }
    }

    for flag in &locked.use_flags {
        if global_use.get(&flag.name).copied() != Some(flag.enabled) {
            return false;
        }
    }

    true
}

fn extend_from(
    map: &BTreeMap<String, BTreeSet<String>>,
    name: &str,
    into: &mut BTreeSet<String>,
) {
    if let Some(entries) = map.get(name) {
        into.extend(entries.iter().cloned());
    }
}

/// Orders actions so a package is scheduled after everything it requires;
/// ties fall to ascending names.
fn sort_topologically(
    actions: &mut Vec<PlannedAction>,
    dependencies_map: &BTreeMap<String, BTreeSet<String>>,
) {
    let members: BTreeSet<&str> = actions.iter().map(|action| action.name.as_str()).collect();
    let mut remaining: BTreeMap<String, BTreeSet<String>> = actions
        .iter()
        .map(|action| {
            let deps = dependencies_map
                .get(&action.name)
                .map(|deps| {
                    deps.iter()
                        .filter(|dep| members.contains(dep.as_str()))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            (action.name.clone(), deps)
        })
        .collect();

    let mut order: Vec<String> = Vec::with_capacity(actions.len());
    while !remaining.is_empty() {
        let next = remaining
            .iter()
            .find(|(_, deps)| deps.is_empty())
            .map(|(name, _)| name.clone())
            // A dependency cycle would leave nothing schedulable; break it
            // at the alphabetically first member.
            .unwrap_or_else(|| remaining.keys().next().unwrap().clone());
        remaining.remove(&next);
        for deps in remaining.values_mut() {
            deps.remove(&next);
        }
        order.push(next);
    }

    actions.sort_by_key(|action| {
        order
            .iter()
            .position(|name| name == &action.name)
            .unwrap_or(usize::MAX)
    });
}

#[cfg(test)]
mod tests {
    use quarry_resolver::ResolvedPackage;

    use super::*;

    fn resolution(packages: &[(&str, &str)], deps: &[(&str, &[&str])]) -> Resolution {
        Resolution {
            packages: packages
                .iter()
                .map(|(name, version)| ResolvedPackage {
                    name: (*name).to_string(),
                    version: version.parse().unwrap(),
                })
                .collect(),
            dependencies: deps
                .iter()
                .map(|(name, targets)| {
                    (
                        (*name).to_string(),
                        targets.iter().map(|t| (*t).to_string()).collect(),
                    )
                })
                .collect(),
        }
    }

    fn locked(version: &str, requires: &[(&str, &str)], iuse: &[&str], used: &[&str]) -> LockedPackage {
        LockedPackage {
            version: version.to_string(),
            requires: requires
                .iter()
                .map(|(name, range)| ((*name).to_string(), (*range).to_string()))
                .collect(),
            iuse: iuse.iter().map(|flag| flag.parse().unwrap()).collect(),
            use_flags: used.iter().map(|flag| flag.parse().unwrap()).collect(),
            files: Vec::new(),
        }
    }

    fn manifest_with(deps: &[(&str, &str)]) -> Manifest {
        let mut manifest = Manifest::new("demo");
        for (name, range) in deps {
            manifest.set_dependency(name, range);
        }
        manifest
    }

    #[test]
    fn satisfied_lock_yields_an_empty_plan() {
        let mut lock = Lock::default();
        lock.upsert_package("a", locked("1.0.0", &[("b", ">=1.0.0")], &[], &[]), Some("^1.0.0"));
        lock.upsert_package("b", locked("1.5.0", &[], &[], &[]), None);

        let plan = plan(
            &resolution(&[("a", "1.0.0"), ("b", "1.5.0")], &[("a", &["b"])]),
            &lock,
            &manifest_with(&[("a", "^1.0.0")]),
            &IndexMap::new(),
            &IndexMap::new(),
            false,
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn force_marks_exact_packages_direct() {
        let mut lock = Lock::default();
        lock.upsert_package("a", locked("1.0.0", &[], &[], &[]), Some("^1.0.0"));

        let plan = plan(
            &resolution(&[("a", "1.0.0")], &[]),
            &lock,
            &manifest_with(&[("a", "^1.0.0")]),
            &IndexMap::new(),
            &IndexMap::new(),
            true,
        );
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].kind, ActionKind::Direct);
    }

    #[test]
    fn version_drift_installs_direct_and_keeps_exact_dependency() {
        let mut lock = Lock::default();
        lock.upsert_package("a", locked("1.0.0", &[("b", ">=1.0.0,<4.0.0")], &[], &[]), Some("^1.0.0"));
        lock.upsert_package("b", locked("1.5.0", &[], &[], &[]), None);

        let plan = plan(
            &resolution(&[("a", "2.0.0"), ("b", "1.5.0")], &[("a", &["b"])]),
            &lock,
            &manifest_with(&[("a", "^2.0.0")]),
            &IndexMap::new(),
            &IndexMap::new(),
            false,
        );
        let a = plan.actions.iter().find(|action| action.name == "a").unwrap();
        let b = plan.actions.iter().find(|action| action.name == "b").unwrap();
        assert_eq!(a.kind, ActionKind::Direct);
        assert_eq!(b.kind, ActionKind::AlreadyInstalled);
        assert_eq!(plan.installs().count(), 1);
    }

    #[test]
    fn use_flag_flip_rebuilds_package_and_reverse_dependencies() {
        let mut global_use = IndexMap::new();
        global_use.insert("ssl".to_string(), true);

        let mut lock = Lock::default();
        // c was built with -ssl; d depends on c.
        lock.upsert_package("c", locked("1.0.0", &[], &["+ssl"], &["-ssl"]), Some("^1.0.0"));
        lock.upsert_package("d", locked("1.0.0", &[("c", "^1.0.0")], &[], &[]), Some("^1.0.0"));

        let plan = plan(
            &resolution(
                &[("c", "1.0.0"), ("d", "1.0.0")],
                &[("d", &["c"])],
            ),
            &lock,
            &manifest_with(&[("c", "^1.0.0"), ("d", "^1.0.0")]),
            &IndexMap::new(),
            &global_use,
            false,
        );
        let c = plan.actions.iter().find(|action| action.name == "c").unwrap();
        let d = plan.actions.iter().find(|action| action.name == "d").unwrap();
        assert_eq!(c.kind, ActionKind::Direct);
        assert!(!c.exact_use_flags);
        assert_eq!(d.kind, ActionKind::ReverseDependency);
    }

    #[test]
    fn fresh_install_orders_dependencies_first() {
        let plan = plan(
            &resolution(
                &[("a", "1.0.0"), ("b", "1.5.0")],
                &[("a", &["b"])],
            ),
            &Lock::default(),
            &manifest_with(&[("a", "^1.0.0")]),
            &IndexMap::new(),
            &IndexMap::new(),
            false,
        );
        let names: Vec<&str> = plan.actions.iter().map(|action| action.name.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
        let b = &plan.actions[0];
        assert_eq!(b.kind, ActionKind::Dependency);
        assert!(!b.exists_in_lock);
    }

    #[test]
    fn ties_break_by_ascending_name() {
        let plan = plan(
            &resolution(
                &[("zeta", "1.0.0"), ("alpha", "1.0.0"), ("mid", "1.0.0")],
                &[],
            ),
            &Lock::default(),
            &manifest_with(&[("zeta", ""), ("alpha", ""), ("mid", "")]),
            &IndexMap::new(),
            &IndexMap::new(),
            false,
        );
        let names: Vec<&str> = plan.actions.iter().map(|action| action.name.as_str()).collect();
        assert_eq!(names, ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn new_transitive_of_a_kept_package_is_installed() {
        let mut lock = Lock::default();
        lock.upsert_package("a", locked("1.0.0", &[("b", "")], &[], &[]), Some("^1.0.0"));

        // The solver picked a new version of a and a brand-new dependency c.
        let plan = plan(
            &resolution(
                &[("a", "2.0.0"), ("c", "1.0.0")],
                &[("a", &["c"])],
            ),
            &lock,
            &manifest_with(&[("a", "^2.0.0")]),
            &IndexMap::new(),
            &IndexMap::new(),
            false,
        );
        let c = plan.actions.iter().find(|action| action.name == "c").unwrap();
        assert_eq!(c.kind, ActionKind::Dependency);
        let names: Vec<&str> = plan.installs().map(|action| action.name.as_str()).collect();
        assert_eq!(names, ["c", "a"]);
    }
}
