use crate::ids::{NameId, SolvableId, StringId, VersionSetId};
use crate::pool::Pool;

/// The candidates known for a package name.
#[derive(Clone, Debug, Default)]
pub struct Candidates {
    /// All candidates for the name, in allocation order.
    pub candidates: Vec<SolvableId>,
    /// A candidate to prefer when sorting (e.g. the locked version under the
    /// `favored` strategy).
    pub favored: Option<SolvableId>,
    /// When set, every other candidate of this name is forbidden.
    pub locked: Option<SolvableId>,
    /// Candidates whose dependencies are already known, so the solver need
    /// not expect a fetch when they are decided.
    pub hint_dependencies_available: Vec<SolvableId>,
    /// Candidates that may never be selected, with an explanation.
    pub excluded: Vec<(SolvableId, StringId)>,
}

/// The dependencies of a candidate.
///
/// `requirements` must be co-installed; `constrains` must hold for the named
/// package if it ends up in the solution, without pulling it in.
#[derive(Clone, Debug, Default)]
pub struct Dependencies {
    pub requirements: Vec<VersionSetId>,
    pub constrains: Vec<VersionSetId>,
}

/// The narrow interface through which the solver queries the package
/// database.
///
/// All calls are synchronous; `get_candidates` and `get_dependencies` may
/// block on a registry fetch. Cancellation is polled via `should_cancel` at
/// the documented suspension points and unwinds the solve without side
/// effects.
pub trait DependencyProvider {
    fn pool(&self) -> &Pool;

    /// Returns all candidates for the given name, fetching and interning
    /// them on first query.
    fn get_candidates(&mut self, name: NameId) -> Candidates;

    /// Sorts candidates in decision preference order (best first).
    fn sort_candidates(&mut self, solvables: &mut [SolvableId]);

    /// Returns the dependencies of a candidate.
    fn get_dependencies(&mut self, solvable: SolvableId) -> Dependencies;

    /// Polled by the solver; returning `Some` aborts the solve with the
    /// given reason.
    fn should_cancel(&mut self) -> Option<String> {
        None
    }

    /// Keeps the candidates whose version lies inside the version set (or
    /// outside it, when `inverse` is set).
    fn filter_candidates(
        &self,
        candidates: &[SolvableId],
        version_set: VersionSetId,
        inverse: bool,
    ) -> Vec<SolvableId> {
        let pool = self.pool();
        let range = pool.version_set_range(version_set);
        candidates
            .iter()
            .copied()
            .filter(|&candidate| {
                let package = pool
                    .resolve_solvable(candidate)
                    .package()
                    .expect("root solvable is never a candidate");
                range.contains(&package.version) != inverse
            })
            .collect()
    }
}
