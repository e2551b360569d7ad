//! Resolution: turns the manifest, the lock, and the user's arguments into a
//! consistent set of package versions via the CDCL solver.
//!
//! USE flags participate in resolution as pseudo-packages: flag `X` becomes
//! the package `use:X` with version `1.2.3` standing for `+X` and `0.0.0`
//! for `-X`. The manifest's selection pins one side at the root; packages
//! that care about a flag depend on the matching pseudo-version, so an
//! incompatible selection surfaces as an ordinary solver conflict.

pub use crate::database::{PackageDatabase, Strategy};
pub use crate::error::ResolveError;
pub use crate::use_flags::{
    is_use_flag_package, pseudo_version, rewrite_unsat_message, use_flag_package_name,
};

mod database;
mod error;
mod use_flags;

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;

use quarry_project::{Lock, Manifest};
use quarry_registry::Registry;
use quarry_solver::{Solver, UnsolvableOrCancelled};
use quarry_version::Version;

/// One package chosen by the solver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: Version,
}

/// The solver's output, ordered dependencies-first.
#[derive(Clone, Debug, Default)]
pub struct Resolution {
    pub packages: Vec<ResolvedPackage>,
    /// Dependency names per package, as discovered during resolution. The
    /// planner unions these with the lock's recorded edges.
    pub dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Resolves the project's requirements into a consistent package set.
///
/// Requirements are gathered from the lock (as nameless pins, so installed
/// packages stay part of the solution), the manifest, and finally the
/// caller's explicit requirements, later sources overriding earlier ones.
pub fn resolve<R: Registry>(
    registry: R,
    manifest: &Manifest,
    lock: &Lock,
    explicit: &IndexMap<String, String>,
    strategy: Strategy,
) -> Result<Resolution, ResolveError> {
    let mut requirements: IndexMap<String, String> = IndexMap::new();
    for name in lock.packages.keys() {
        requirements.insert(name.clone(), String::new());
    }
    for (name, range_expr) in &manifest.dependencies {
        requirements.insert(name.clone(), range_expr.clone());
    }
    for (name, range_expr) in explicit {
        requirements.insert(name.clone(), range_expr.clone());
    }

    let mut database = PackageDatabase::new(registry, strategy, lock);

    let mut requirement_ids = Vec::with_capacity(requirements.len());
    for (name, range_expr) in &requirements {
        requirement_ids.push(database.alloc_requirement_from_str(name, range_expr)?);
    }
    for (name, enabled) in manifest.use_flag_map() {
        requirement_ids.push(database.alloc_requirement_from_use_flag(&name, enabled));
    }

    let mut solver = Solver::new(database);
    match solver.solve(requirement_ids, Vec::new()) {
        Ok(solvables) => {
            let database = solver.provider();
            let mut packages = Vec::new();
            let mut dependencies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            for &solvable in &solvables {
                let Some((name, version)) = database.solvable_package(solvable) else {
                    continue;
                };
                if is_use_flag_package(&name) {
                    continue;
                }
                let deps = database.requirement_names(solvable);
                if !deps.is_empty() {
                    dependencies.insert(name.clone(), deps);
                }
                packages.push(ResolvedPackage { name, version });
            }
            sort_dependencies_first(&mut packages, &dependencies);
            tracing::debug!("resolved {} packages", packages.len());
            Ok(Resolution {
                packages,
                dependencies,
            })
        }
        Err(UnsolvableOrCancelled::Unsolvable(conflict)) => {
            let message = rewrite_unsat_message(&solver.display_unsat(&conflict));
            Err(ResolveError::Unsat { message })
        }
        Err(UnsolvableOrCancelled::Cancelled(reason)) => {
            match solver.provider_mut().take_error() {
                Some(error) => Err(error.into()),
                None => Err(ResolveError::Cancelled(reason)),
            }
        }
    }
}

/// Orders packages so every package follows the packages it requires; ties
/// fall to ascending names.
fn sort_dependencies_first(
    packages: &mut Vec<ResolvedPackage>,
    dependencies: &BTreeMap<String, BTreeSet<String>>,
) {
    let members: BTreeSet<&str> = packages.iter().map(|p| p.name.as_str()).collect();
    let mut remaining: BTreeMap<&str, BTreeSet<&str>> = packages
        .iter()
        .map(|package| {
            let deps: BTreeSet<&str> = dependencies
                .get(&package.name)
                .map(|deps| {
                    deps.iter()
                        .map(String::as_str)
                        .filter(|dep| members.contains(dep))
                        .collect()
                })
                .unwrap_or_default();
            (package.name.as_str(), deps)
        })
        .collect();

    let mut order: Vec<String> = Vec::with_capacity(packages.len());
    while !remaining.is_empty() {
        let next = remaining
            .iter()
            .find(|(_, deps)| deps.is_empty())
            .map(|(&name, _)| name);
        // A cycle would leave no free package; fall back to name order so
        // the sort always terminates.
        let next = next.unwrap_or_else(|| *remaining.keys().next().unwrap());
        remaining.remove(next);
        for deps in remaining.values_mut() {
            deps.remove(next);
        }
        order.push(next.to_string());
    }

    packages.sort_by_key(|package| {
        order
            .iter()
            .position(|name| name == &package.name)
            .unwrap_or(usize::MAX)
    });
}

#[cfg(test)]
mod tests {
    use quarry_registry::MemoryRegistry;

    use super::*;

    fn resolve_simple(
        registry: MemoryRegistry,
        manifest: &Manifest,
    ) -> Result<Resolution, ResolveError> {
        resolve(
            registry,
            manifest,
            &Lock::default(),
            &IndexMap::new(),
            Strategy::Latest,
        )
    }

    fn manifest_with(deps: &[(&str, &str)], flags: &[&str]) -> Manifest {
        let mut manifest = Manifest::new("demo");
        for (name, range) in deps {
            manifest.set_dependency(name, range);
        }
        for flag in flags {
            manifest.use_flags.push(flag.parse().unwrap());
        }
        manifest
    }

    #[test]
    fn resolves_transitively_in_dependency_order() {
        let mut registry = MemoryRegistry::new();
        registry.add_package("a", "1.0.0", &[("b", ">=1.0.0,<4.0.0")]);
        registry.add_package("b", "1.5.0", &[]);

        let resolution =
            resolve_simple(registry, &manifest_with(&[("a", "^1.0.0")], &[])).unwrap();
        let names: Vec<&str> = resolution
            .packages
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        // Dependencies come first.
        assert_eq!(names, ["b", "a"]);
        assert!(resolution.dependencies["a"].contains("b"));
    }

    #[test]
    fn picks_the_highest_admissible_versions() {
        let mut registry = MemoryRegistry::new();
        registry.add_package("a", "1.0.0", &[]);
        registry.add_package("a", "2.0.0", &[]);
        registry.add_package("a", "3.0.0", &[]);

        let resolution =
            resolve_simple(registry, &manifest_with(&[("a", "<3.0.0")], &[])).unwrap();
        assert_eq!(resolution.packages[0].version, Version::new(2, 0, 0));
    }

    #[test]
    fn use_flags_participate_in_resolution() {
        let mut registry = MemoryRegistry::new();
        // c insists on +ssl via its dependency on the pseudo-package.
        registry.add_package("c", "1.0.0", &[("use:ssl", "==1.2.3")]);

        let enabled = resolve_simple(registry, &manifest_with(&[("c", "")], &["+ssl"]));
        assert!(enabled.is_ok());

        let mut registry = MemoryRegistry::new();
        registry.add_package("c", "1.0.0", &[("use:ssl", "==1.2.3")]);
        let disabled = resolve_simple(registry, &manifest_with(&[("c", "")], &["-ssl"]));
        let Err(ResolveError::Unsat { message }) = disabled else {
            panic!("expected an unsat error");
        };
        assert!(message.contains("USE flag"), "message was: {message}");
        assert!(!message.contains("use:"), "message was: {message}");
    }

    #[test]
    fn pseudo_packages_are_hidden_from_the_solution() {
        let mut registry = MemoryRegistry::new();
        registry.add_package("c", "1.0.0", &[("use:ssl", "==1.2.3")]);

        let resolution =
            resolve_simple(registry, &manifest_with(&[("c", "")], &["+ssl"])).unwrap();
        assert_eq!(resolution.packages.len(), 1);
        assert_eq!(resolution.packages[0].name, "c");
    }

    #[test]
    fn unsat_conflicting_requirements_name_both_sides() {
        let mut registry = MemoryRegistry::new();
        registry.add_package("a", "1.0.0", &[("b", ">=1.0.0,<4.0.0")]);
        registry.add_package("b", "1.5.0", &[]);
        registry.add_package("b", "5.0.0", &[]);

        let manifest = manifest_with(&[("a", "^1.0.0"), ("b", "^5.0.0")], &[]);
        let Err(ResolveError::Unsat { message }) = resolve_simple(registry, &manifest) else {
            panic!("expected an unsat error");
        };
        assert!(message.contains("a"), "message was: {message}");
        assert!(message.contains("b"), "message was: {message}");
        assert!(
            message.contains("cannot be installed because there are no viable options"),
            "message was: {message}"
        );
    }

    #[test]
    fn locked_strategy_keeps_the_pinned_version() {
        let mut registry = MemoryRegistry::new();
        registry.add_package("b", "1.5.0", &[]);
        registry.add_package("b", "2.0.0", &[]);

        let mut lock = Lock::default();
        lock.upsert_package(
            "b",
            quarry_project::LockedPackage {
                version: "1.5.0".to_string(),
                ..Default::default()
            },
            None,
        );

        let resolution = resolve(
            registry,
            &manifest_with(&[("b", ">=1.0.0")], &[]),
            &lock,
            &IndexMap::new(),
            Strategy::Locked,
        )
        .unwrap();
        assert_eq!(resolution.packages[0].version, Version::new(1, 5, 0));
    }

    #[test]
    fn favored_strategy_prefers_the_locked_version() {
        let mut registry = MemoryRegistry::new();
        registry.add_package("b", "1.5.0", &[]);
        registry.add_package("b", "2.0.0", &[]);

        let mut lock = Lock::default();
        lock.upsert_package(
            "b",
            quarry_project::LockedPackage {
                version: "1.5.0".to_string(),
                ..Default::default()
            },
            None,
        );

        let resolution = resolve(
            registry,
            &manifest_with(&[("b", ">=1.0.0")], &[]),
            &lock,
            &IndexMap::new(),
            Strategy::Favored,
        )
        .unwrap();
        assert_eq!(resolution.packages[0].version, Version::new(1, 5, 0));
    }

    #[test]
    fn explicit_requirements_override_the_manifest() {
        let mut registry = MemoryRegistry::new();
        registry.add_package("a", "1.0.0", &[]);
        registry.add_package("a", "2.0.0", &[]);

        let mut explicit = IndexMap::new();
        explicit.insert("a".to_string(), "^2.0.0".to_string());
        let resolution = resolve(
            registry,
            &manifest_with(&[("a", "^1.0.0")], &[]),
            &Lock::default(),
            &explicit,
            Strategy::Latest,
        )
        .unwrap();
        assert_eq!(resolution.packages[0].version, Version::new(2, 0, 0));
    }
}
