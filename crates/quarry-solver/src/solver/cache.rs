use rustc_hash::FxHashMap;

use crate::ids::{NameId, SolvableId, VersionSetId};
use crate::provider::{Candidates, Dependencies, DependencyProvider};
use crate::solver::clause::SortedCandidates;

/// Memoizes provider answers for the duration of one solve: candidates per
/// name, matching/non-matching candidates per version set, and dependencies
/// per solvable.
#[derive(Default)]
pub(crate) struct SolverCache {
    candidates: FxHashMap<NameId, Candidates>,
    pub(crate) sorted_candidates: SortedCandidates,
    non_matching_candidates: FxHashMap<VersionSetId, Vec<SolvableId>>,
    dependencies: FxHashMap<SolvableId, Dependencies>,
}

impl SolverCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Candidates for a name, fetching on first query. Cancellation is
    /// checked before each fetch so a blocked registry call can be avoided.
    pub(crate) fn get_or_fetch_candidates<'a>(
        &'a mut self,
        provider: &mut impl DependencyProvider,
        name: NameId,
    ) -> Result<&'a Candidates, String> {
        if !self.candidates.contains_key(&name) {
            if let Some(reason) = provider.should_cancel() {
                return Err(reason);
            }
            tracing::trace!(
                "fetching candidates for {}",
                provider.pool().resolve_name(name)
            );
            let candidates = provider.get_candidates(name);
            self.candidates.insert(name, candidates);
        }
        Ok(&self.candidates[&name])
    }

    /// The candidates matching a version set, in the provider's preference
    /// order.
    pub(crate) fn get_or_fetch_sorted_candidates<'a>(
        &'a mut self,
        provider: &mut impl DependencyProvider,
        version_set_id: VersionSetId,
    ) -> Result<&'a [SolvableId], String> {
        if !self.sorted_candidates.contains_key(&version_set_id) {
            let name = provider.pool().version_set_name(version_set_id);
            let candidates = self
                .get_or_fetch_candidates(provider, name)?
                .candidates
                .clone();
            let mut matching = provider.filter_candidates(&candidates, version_set_id, false);
            provider.sort_candidates(&mut matching);
            self.sorted_candidates.insert(version_set_id, matching);
        }
        Ok(&self.sorted_candidates[&version_set_id])
    }

    /// The candidates of a version set's name that fall outside the set;
    /// these become the forbidden targets of constrains clauses.
    pub(crate) fn get_or_fetch_non_matching_candidates<'a>(
        &'a mut self,
        provider: &mut impl DependencyProvider,
        version_set_id: VersionSetId,
    ) -> Result<&'a [SolvableId], String> {
        if !self.non_matching_candidates.contains_key(&version_set_id) {
            let name = provider.pool().version_set_name(version_set_id);
            let candidates = self
                .get_or_fetch_candidates(provider, name)?
                .candidates
                .clone();
            let non_matching = provider.filter_candidates(&candidates, version_set_id, true);
            self.non_matching_candidates
                .insert(version_set_id, non_matching);
        }
        Ok(&self.non_matching_candidates[&version_set_id])
    }

    pub(crate) fn get_or_fetch_dependencies<'a>(
        &'a mut self,
        provider: &mut impl DependencyProvider,
        solvable_id: SolvableId,
    ) -> Result<&'a Dependencies, String> {
        if !self.dependencies.contains_key(&solvable_id) {
            if let Some(reason) = provider.should_cancel() {
                return Err(reason);
            }
            let dependencies = provider.get_dependencies(solvable_id);
            self.dependencies.insert(solvable_id, dependencies);
        }
        Ok(&self.dependencies[&solvable_id])
    }
}
