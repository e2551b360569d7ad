use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};

use quarry_project::Lock;
use quarry_registry::{Registry, RegistryError};
use quarry_solver::{
    Candidates, Dependencies, DependencyProvider, NameId, Pool, SolvableId, VersionSetId,
};
use quarry_version::{Range, Version};

use crate::use_flags::{is_use_flag_package, pseudo_version, use_flag_package_name};
use crate::ResolveError;

/// How candidates are ordered and restricted relative to the lock.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Newest versions first.
    Latest,
    /// Newest first, but a version pinned in the lock floats to the front.
    #[default]
    Favored,
    /// Only versions pinned in the lock are permitted.
    Locked,
}

/// The package database: caches registry answers, interns candidates and
/// requirements into the pool, and implements the provider interface the
/// solver queries.
///
/// Registry failures cannot surface through the provider interface, so the
/// first failure is stored and resolution is cancelled; the caller retrieves
/// it via [`PackageDatabase::take_error`].
pub struct PackageDatabase<R: Registry> {
    registry: R,
    pool: Pool,
    strategy: Strategy,
    pinned: FxHashMap<String, Version>,
    queried: FxHashSet<NameId>,
    candidates_by_name: FxHashMap<NameId, Vec<SolvableId>>,
    dependencies: FxHashMap<SolvableId, Dependencies>,
    error: Option<RegistryError>,
}

impl<R: Registry> PackageDatabase<R> {
    pub fn new(registry: R, strategy: Strategy, lock: &Lock) -> Self {
        let pinned = lock
            .packages
            .iter()
            .filter_map(|(name, package)| {
                package
                    .version
                    .parse::<Version>()
                    .ok()
                    .map(|version| (name.clone(), version))
            })
            .collect();
        Self {
            registry,
            pool: Pool::new(),
            strategy,
            pinned,
            queried: FxHashSet::default(),
            candidates_by_name: FxHashMap::default(),
            dependencies: FxHashMap::default(),
            error: None,
        }
    }

    /// Interns a `(name, range-expression)` requirement.
    pub fn alloc_requirement_from_str(
        &mut self,
        name: &str,
        range_expr: &str,
    ) -> Result<VersionSetId, ResolveError> {
        let range: Range = range_expr
            .parse()
            .map_err(|source| ResolveError::Requirement {
                name: name.to_string(),
                source,
            })?;
        let name_id = self.pool.intern_name(name);
        Ok(self.pool.intern_version_set(name_id, range))
    }

    /// Interns the root-level requirement pinning a USE flag's polarity.
    pub fn alloc_requirement_from_use_flag(&mut self, flag: &str, enabled: bool) -> VersionSetId {
        let name_id = self.pool.intern_name(&use_flag_package_name(flag));
        self.pool
            .intern_version_set(name_id, Range::singleton(pseudo_version(enabled)))
    }

    /// The `(name, version)` of a candidate; `None` for the root.
    pub fn solvable_package(&self, solvable: SolvableId) -> Option<(String, Version)> {
        let package = self.pool.resolve_solvable(solvable).package()?;
        Some((
            self.pool.resolve_name(package.name).to_string(),
            package.version.clone(),
        ))
    }

    /// The names this candidate requires, with USE-flag pseudo-packages
    /// filtered out.
    pub fn requirement_names(&self, solvable: SolvableId) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        if let Some(dependencies) = self.dependencies.get(&solvable) {
            for &version_set_id in &dependencies.requirements {
                let name_id = self.pool.version_set_name(version_set_id);
                let name = self.pool.resolve_name(name_id);
                if !is_use_flag_package(name) {
                    names.insert(name.to_string());
                }
            }
        }
        names
    }

    /// The first registry or parse failure observed during resolution.
    pub fn take_error(&mut self) -> Option<RegistryError> {
        self.error.take()
    }

    fn record_error(&mut self, error: RegistryError) {
        tracing::debug!("registry failure, cancelling resolution: {error}");
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Synthesizes the two pseudo-candidates of a USE flag.
    fn use_flag_candidates(&mut self, name: NameId) -> Vec<SolvableId> {
        let disabled = self.pool.intern_solvable(name, pseudo_version(false));
        let enabled = self.pool.intern_solvable(name, pseudo_version(true));
        self.dependencies.insert(disabled, Dependencies::default());
        self.dependencies.insert(enabled, Dependencies::default());
        vec![disabled, enabled]
    }

    fn fetch_candidates(&mut self, name: NameId) -> Vec<SolvableId> {
        let name_str = self.pool.resolve_name(name).to_string();
        if is_use_flag_package(&name_str) {
            return self.use_flag_candidates(name);
        }

        let versions = match self.registry.fetch_versions(&name_str) {
            Ok(versions) => versions,
            Err(error) => {
                self.record_error(error);
                return Vec::new();
            }
        };

        let mut candidates = Vec::with_capacity(versions.len());
        for (version_str, deps) in &versions {
            let version: Version = match version_str.parse() {
                Ok(version) => version,
                Err(err) => {
                    self.record_error(RegistryError::BadPayload {
                        name: name_str.clone(),
                        field: format!("version `{version_str}`: {err}"),
                    });
                    return Vec::new();
                }
            };

            let mut dependencies = Dependencies::default();
            for (dep_name, dep_range) in deps {
                match self.alloc_requirement_from_str(dep_name, dep_range) {
                    Ok(requirement) => dependencies.requirements.push(requirement),
                    Err(_) => {
                        self.record_error(RegistryError::BadPayload {
                            name: name_str.clone(),
                            field: format!("requirement `{dep_name}: {dep_range}`"),
                        });
                        return Vec::new();
                    }
                }
            }

            let solvable = self.pool.intern_solvable(name, version);
            self.dependencies.insert(solvable, dependencies);
            candidates.push(solvable);
        }
        candidates
    }

    fn candidate_with_version(&self, candidates: &[SolvableId], version: &Version) -> Option<SolvableId> {
        candidates.iter().copied().find(|&candidate| {
            self.pool
                .resolve_solvable(candidate)
                .package()
                .is_some_and(|package| package.version == *version)
        })
    }
}

impl<R: Registry> DependencyProvider for PackageDatabase<R> {
    fn pool(&self) -> &Pool {
        &self.pool
    }

    fn get_candidates(&mut self, name: NameId) -> Candidates {
        if self.queried.insert(name) {
            let candidates = self.fetch_candidates(name);
            self.candidates_by_name.insert(name, candidates);
        }
        let candidates = self.candidates_by_name[&name].clone();

        let name_str = self.pool.resolve_name(name).to_string();
        let pinned = self
            .pinned
            .get(&name_str)
            .and_then(|version| self.candidate_with_version(&candidates, version));

        let mut result = Candidates {
            hint_dependencies_available: candidates.clone(),
            candidates,
            ..Candidates::default()
        };
        match self.strategy {
            Strategy::Latest => {}
            Strategy::Favored => result.favored = pinned,
            Strategy::Locked => result.locked = pinned,
        }
        result
    }

    fn sort_candidates(&mut self, solvables: &mut [SolvableId]) {
        solvables.sort_by(|&a, &b| {
            let left = &self
                .pool
                .resolve_solvable(a)
                .package()
                .expect("candidates are packages")
                .version;
            let right = &self
                .pool
                .resolve_solvable(b)
                .package()
                .expect("candidates are packages")
                .version;
            right.cmp(left)
        });

        // Under the favored strategy the pinned version goes first.
        if self.strategy == Strategy::Favored {
            if let Some(index) = solvables.iter().position(|&candidate| {
                let package = self
                    .pool
                    .resolve_solvable(candidate)
                    .package()
                    .expect("candidates are packages");
                let name = self.pool.resolve_name(package.name);
                self.pinned.get(name) == Some(&package.version)
            }) {
                solvables[..=index].rotate_right(1);
            }
        }
    }

    fn get_dependencies(&mut self, solvable: SolvableId) -> Dependencies {
        self.dependencies
            .get(&solvable)
            .cloned()
            .unwrap_or_default()
    }

    fn should_cancel(&mut self) -> Option<String> {
        self.error
            .as_ref()
            .map(|error| format!("registry failure: {error}"))
    }
}
