use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::arena::Arena;
use crate::conflict::Conflict;
use crate::ids::{ClauseId, LearntClauseId, NameId, SolvableId, VersionSetId};
use crate::provider::{Dependencies, DependencyProvider};
use crate::solver::cache::SolverCache;
use crate::solver::clause::{Clause, ClauseState, Literal};
use crate::solver::decision::Decision;
use crate::solver::decision_tracker::DecisionTracker;
use crate::solver::watch_map::WatchMap;

pub(crate) mod cache;
pub(crate) mod clause;
mod decision;
mod decision_map;
mod decision_tracker;
mod watch_map;

/// Why a solve ended without a solution.
#[derive(Debug)]
pub enum UnsolvableOrCancelled {
    /// The constraints admit no assignment; the conflict explains why.
    Unsolvable(Conflict),
    /// The provider requested cancellation; no state was modified.
    Cancelled(String),
}

enum PropagationError {
    Conflict(SolvableId, bool, ClauseId),
    Cancelled(String),
}

#[derive(Default)]
struct AddClauseOutput {
    new_requires_clauses: Vec<(SolvableId, VersionSetId, ClauseId)>,
    conflicting_clauses: Vec<ClauseId>,
    negative_assertions: Vec<(SolvableId, ClauseId)>,
    clauses_to_watch: Vec<ClauseId>,
}

/// Drives the CDCL solving process.
///
/// Each solvable is a boolean variable (`true` = install). The solver
/// repeatedly assigns a variable, unit-propagates through watched literals,
/// and on conflict learns a 1-UIP clause and backtracks. Clauses for a
/// solvable's own dependencies are materialized lazily, the first time the
/// solvable is decided to be installed.
///
/// Propagation is deterministic: watch chains are visited in insertion
/// order, candidates in sorted order, and the decision stack is
/// chronological, so identical inputs produce identical decision sequences.
pub struct Solver<D: DependencyProvider> {
    provider: D,
    pub(crate) cache: SolverCache,

    pub(crate) clauses: Arena<ClauseId, ClauseState>,
    requires_clauses: Vec<(SolvableId, VersionSetId, ClauseId)>,
    watches: WatchMap,
    negative_assertions: Vec<(SolvableId, ClauseId)>,

    pub(crate) learnt_clauses: Arena<LearntClauseId, Vec<Literal>>,
    pub(crate) learnt_why: FxHashMap<LearntClauseId, Vec<ClauseId>>,
    learnt_clause_ids: Vec<ClauseId>,

    clauses_added_for_package: FxHashSet<NameId>,
    clauses_added_for_solvable: FxHashSet<SolvableId>,

    decision_tracker: DecisionTracker,

    /// The version sets that must be satisfied as part of the solution.
    root_requirements: Vec<VersionSetId>,
    /// The version sets that must be respected if their package is present.
    root_constraints: Vec<VersionSetId>,
}

impl<D: DependencyProvider> Solver<D> {
    pub fn new(provider: D) -> Self {
        Self {
            provider,
            cache: SolverCache::new(),
            clauses: Arena::new(),
            requires_clauses: Vec::new(),
            watches: WatchMap::new(),
            negative_assertions: Vec::new(),
            learnt_clauses: Arena::new(),
            learnt_why: FxHashMap::default(),
            learnt_clause_ids: Vec::new(),
            clauses_added_for_package: FxHashSet::default(),
            clauses_added_for_solvable: FxHashSet::default(),
            decision_tracker: DecisionTracker::new(),
            root_requirements: Vec::new(),
            root_constraints: Vec::new(),
        }
    }

    pub fn provider(&self) -> &D {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut D {
        &mut self.provider
    }

    /// Solves for the given root requirements and constraints.
    ///
    /// Returns the solvables assigned `true` (excluding the root) in
    /// chronological decision order.
    pub fn solve(
        &mut self,
        root_requirements: Vec<VersionSetId>,
        root_constraints: Vec<VersionSetId>,
    ) -> Result<Vec<SolvableId>, UnsolvableOrCancelled> {
        assert!(
            self.clauses.is_empty(),
            "each solve requires a fresh solver"
        );
        self.decision_tracker.clear();
        self.root_requirements = root_requirements;
        self.root_constraints = root_constraints;

        // Clause 0 is always the install-root clause.
        let root_clause = self.clauses.alloc(ClauseState::root());
        assert_eq!(root_clause, ClauseId::install_root());

        self.run_sat()?;

        let steps = self
            .decision_tracker
            .stack()
            .iter()
            .filter(|decision| decision.value && !decision.solvable_id.is_root())
            .map(|decision| decision.solvable_id)
            .collect();
        Ok(steps)
    }

    /// Renders the explanation for an unsolvable problem.
    pub fn display_unsat(&self, conflict: &Conflict) -> String {
        conflict.graph(self).display(self.provider.pool()).to_string()
    }

    /// The CDCL loop: set, propagate, learn.
    ///
    /// A level of 0 means the decision loop has been completely reset
    /// because a partial solution was invalidated by newly added clauses.
    fn run_sat(&mut self) -> Result<(), UnsolvableOrCancelled> {
        debug_assert!(self.decision_tracker.is_empty());
        let mut level = 0;

        loop {
            if level == 0 {
                // Level 1 is the initial decision level: install the root
                // solvable, which carries the top-level requirements.
                level = 1;
                tracing::debug!("installing <root> at level {level}");
                self.decision_tracker
                    .try_add_decision(
                        Decision::new(SolvableId::root(), true, ClauseId::install_root()),
                        level,
                    )
                    .expect("the root solvable is undecided after a reset");
                let output = self
                    .add_clauses_for_solvables([SolvableId::root()])
                    .map_err(UnsolvableOrCancelled::Cancelled)?;
                if let Err(clause_id) = self.process_add_clause_output(output) {
                    return Err(UnsolvableOrCancelled::Unsolvable(
                        self.analyze_unsolvable(clause_id),
                    ));
                }
            }

            // Propagate decisions from the assignments above.
            match self.propagate(level) {
                Ok(()) => {}
                Err(PropagationError::Cancelled(reason)) => {
                    return Err(UnsolvableOrCancelled::Cancelled(reason));
                }
                Err(PropagationError::Conflict(_, _, clause_id)) => {
                    if level == 1 {
                        return Err(UnsolvableOrCancelled::Unsolvable(
                            self.analyze_unsolvable(clause_id),
                        ));
                    }
                    // The conflict was introduced by clauses added for the
                    // previous partial solution; start over.
                    tracing::debug!("propagation conflict invalidates the partial solution");
                    self.decision_tracker.clear();
                    level = 0;
                    continue;
                }
            }

            // Enter the decision loop; returns once no assignment remains.
            level = self.resolve_dependencies(level)?;
            if level == 0 {
                // A learnt assertion undid everything including the root.
                continue;
            }

            // The solution is complete once every installed solvable has had
            // its dependency clauses materialized.
            let new_solvables: Vec<SolvableId> = self
                .decision_tracker
                .stack()
                .iter()
                .filter(|decision| decision.value)
                .map(|decision| decision.solvable_id)
                .filter(|id| !self.clauses_added_for_solvable.contains(id))
                .collect();
            if new_solvables.is_empty() {
                return Ok(());
            }

            tracing::debug!(
                "materializing clauses for {} newly selected solvables",
                new_solvables.len()
            );
            let output = self
                .add_clauses_for_solvables(new_solvables)
                .map_err(UnsolvableOrCancelled::Cancelled)?;
            if let Err(clause_id) = self.process_add_clause_output(output) {
                tracing::debug!(
                    "added clause {clause_id:?} introduces a conflict which invalidates the partial solution"
                );
                self.decision_tracker.clear();
                level = 0;
            }
        }
    }

    /// Materializes the dependency clauses of the given solvables.
    ///
    /// For each requirement this fetches and sorts the candidate list,
    /// registers the per-name clauses (forbid-multiple pairs, locks,
    /// exclusions) the first time a name is seen, and creates the requires
    /// clause. Constraints create one clause per violating candidate.
    fn add_clauses_for_solvables(
        &mut self,
        solvable_ids: impl IntoIterator<Item = SolvableId>,
    ) -> Result<AddClauseOutput, String> {
        let mut output = AddClauseOutput::default();
        let mut pending: VecDeque<SolvableId> = solvable_ids.into_iter().collect();

        while let Some(solvable_id) = pending.pop_front() {
            if !self.clauses_added_for_solvable.insert(solvable_id) {
                continue;
            }

            let dependencies = if solvable_id.is_root() {
                Dependencies {
                    requirements: self.root_requirements.clone(),
                    constrains: self.root_constraints.clone(),
                }
            } else {
                self.cache
                    .get_or_fetch_dependencies(&mut self.provider, solvable_id)?
                    .clone()
            };

            for &version_set_id in &dependencies.requirements {
                let name = self.provider.pool().version_set_name(version_set_id);
                self.add_clauses_for_package(name, &mut output)?;

                let candidates: Vec<SolvableId> = self
                    .cache
                    .get_or_fetch_sorted_candidates(&mut self.provider, version_set_id)?
                    .to_vec();

                let no_candidates = candidates.is_empty();
                let (clause, conflict) = ClauseState::requires(
                    solvable_id,
                    version_set_id,
                    &candidates,
                    &self.decision_tracker,
                );
                let has_watches = clause.has_watches();
                let clause_id = self.clauses.alloc(clause);
                if has_watches {
                    output.clauses_to_watch.push(clause_id);
                }
                output
                    .new_requires_clauses
                    .push((solvable_id, version_set_id, clause_id));
                if conflict {
                    output.conflicting_clauses.push(clause_id);
                } else if no_candidates {
                    // Requires with an empty candidate set asserts ¬parent.
                    output.negative_assertions.push((solvable_id, clause_id));
                }
            }

            for &version_set_id in &dependencies.constrains {
                let name = self.provider.pool().version_set_name(version_set_id);
                self.add_clauses_for_package(name, &mut output)?;

                let non_matching: Vec<SolvableId> = self
                    .cache
                    .get_or_fetch_non_matching_candidates(&mut self.provider, version_set_id)?
                    .to_vec();
                for &forbidden in &non_matching {
                    let (clause, conflict) = ClauseState::constrains(
                        solvable_id,
                        forbidden,
                        version_set_id,
                        &self.decision_tracker,
                    );
                    let clause_id = self.clauses.alloc(clause);
                    output.clauses_to_watch.push(clause_id);
                    if conflict {
                        output.conflicting_clauses.push(clause_id);
                    }
                }
            }
        }

        Ok(output)
    }

    /// Adds the clauses that exist once per package name: a forbid-multiple
    /// clause per candidate pair, lock clauses when a candidate is pinned,
    /// and exclusion assertions.
    fn add_clauses_for_package(
        &mut self,
        name: NameId,
        output: &mut AddClauseOutput,
    ) -> Result<(), String> {
        if !self.clauses_added_for_package.insert(name) {
            return Ok(());
        }

        let candidates = self
            .cache
            .get_or_fetch_candidates(&mut self.provider, name)?
            .clone();

        for (i, &candidate) in candidates.candidates.iter().enumerate() {
            for &other in &candidates.candidates[i + 1..] {
                let clause_id = self
                    .clauses
                    .alloc(ClauseState::forbid_multiple(candidate, other));
                output.clauses_to_watch.push(clause_id);
            }
        }

        if let Some(locked) = candidates.locked {
            for &other in candidates
                .candidates
                .iter()
                .filter(|&&candidate| candidate != locked)
            {
                let clause_id = self.clauses.alloc(ClauseState::lock(locked, other));
                output.clauses_to_watch.push(clause_id);
            }
        }

        for &(candidate, reason) in &candidates.excluded {
            let clause_id = self.clauses.alloc(ClauseState::exclude(candidate, reason));
            output.negative_assertions.push((candidate, clause_id));
        }

        Ok(())
    }

    /// Registers freshly created clauses with the solver state; returns the
    /// first conflicting clause, if any.
    fn process_add_clause_output(&mut self, output: AddClauseOutput) -> Result<(), ClauseId> {
        self.requires_clauses
            .extend(output.new_requires_clauses);
        self.negative_assertions
            .extend(output.negative_assertions);

        for clause_id in output.clauses_to_watch {
            debug_assert!(self.clauses[clause_id].has_watches());
            let clause = &mut self.clauses[clause_id];
            self.watches.start_watching(clause, clause_id);
        }

        match output.conflicting_clauses.first() {
            Some(&clause_id) => Err(clause_id),
            None => Ok(()),
        }
    }

    /// Repeatedly chooses the next variable to assign and runs one
    /// set-propagate-learn round, until no open requirement remains.
    fn resolve_dependencies(&mut self, mut level: u32) -> Result<u32, UnsolvableOrCancelled> {
        loop {
            if let Some(reason) = self.provider.should_cancel() {
                return Err(UnsolvableOrCancelled::Cancelled(reason));
            }

            let Some((candidate, required_by, clause_id)) = self.decide() else {
                break;
            };

            level = self.set_propagate_learn(level, candidate, required_by, clause_id)?;
            if level == 0 {
                break;
            }
        }
        Ok(level)
    }

    /// The decision heuristic: among live requires clauses whose parent is
    /// installed and which are not yet satisfied, pick the one with the
    /// fewest selectable candidates and decide its first selectable
    /// candidate. Ties fall to the earliest clause, which keeps runs
    /// deterministic and surfaces conflicts early.
    fn decide(&self) -> Option<(SolvableId, SolvableId, ClauseId)> {
        let mut best: Option<(u32, (SolvableId, SolvableId, ClauseId))> = None;

        for &(solvable_id, version_set_id, clause_id) in &self.requires_clauses {
            if self.decision_tracker.assigned_value(solvable_id) != Some(true) {
                continue;
            }

            let Some(candidates) = self.cache.sorted_candidates.get(&version_set_id) else {
                continue;
            };

            let mut first_selectable = None;
            let mut selectable_count = 0u32;
            let mut satisfied = false;
            for &candidate in candidates {
                match self.decision_tracker.assigned_value(candidate) {
                    Some(true) => {
                        satisfied = true;
                        break;
                    }
                    Some(false) => {}
                    None => {
                        if first_selectable.is_none() {
                            first_selectable = Some(candidate);
                        }
                        selectable_count += 1;
                    }
                }
            }
            if satisfied {
                continue;
            }

            if let Some(candidate) = first_selectable {
                if best.is_none_or(|(count, _)| selectable_count < count) {
                    best = Some((selectable_count, (candidate, solvable_id, clause_id)));
                }
            }
        }

        if let Some((count, (candidate, _, _))) = best {
            tracing::debug!(
                "deciding to assign {} ({count} candidates)",
                self.provider.pool().display_solvable(candidate)
            );
        }
        best.map(|(_, decision)| decision)
    }

    /// One iteration of the CDCL loop, initiated by a requires clause:
    /// assign the candidate at a new level, then propagate and learn from
    /// any conflicts.
    fn set_propagate_learn(
        &mut self,
        mut level: u32,
        solvable: SolvableId,
        required_by: SolvableId,
        clause_id: ClauseId,
    ) -> Result<u32, UnsolvableOrCancelled> {
        level += 1;

        tracing::debug!(
            "installing {} at level {level} (required by {})",
            self.provider.pool().display_solvable(solvable),
            self.provider.pool().display_solvable(required_by),
        );

        self.decision_tracker
            .try_add_decision(Decision::new(solvable, true, clause_id), level)
            .expect("the heuristic selects only undecided solvables");

        self.propagate_and_learn(level)
    }

    fn propagate_and_learn(&mut self, mut level: u32) -> Result<u32, UnsolvableOrCancelled> {
        loop {
            match self.propagate(level) {
                Ok(()) => return Ok(level),
                Err(PropagationError::Cancelled(reason)) => {
                    return Err(UnsolvableOrCancelled::Cancelled(reason));
                }
                Err(PropagationError::Conflict(solvable, attempted_value, clause_id)) => {
                    level =
                        self.learn_from_conflict(level, solvable, attempted_value, clause_id)?;
                }
            }
        }
    }

    /// Analyzes a propagation conflict, learns a clause, backtracks, and
    /// asserts the learnt literal. A conflict at the lowest decision level
    /// means the problem is unsolvable.
    fn learn_from_conflict(
        &mut self,
        level: u32,
        conflicting_solvable: SolvableId,
        attempted_value: bool,
        conflicting_clause: ClauseId,
    ) -> Result<u32, UnsolvableOrCancelled> {
        tracing::debug!(
            "propagation conflicted: could not set {} to {attempted_value}",
            self.provider.pool().display_solvable(conflicting_solvable)
        );

        if level == 1 {
            return Err(UnsolvableOrCancelled::Unsolvable(
                self.analyze_unsolvable(conflicting_clause),
            ));
        }

        let (new_level, learnt_clause_id, literal) =
            self.analyze(level, conflicting_solvable, conflicting_clause);

        tracing::debug!("backtracked to level {new_level}");

        // The learnt clause is unit under the backtracked assignment, so its
        // asserting literal can be propagated immediately.
        let decision = literal.satisfying_value();
        self.decision_tracker
            .try_add_decision(
                Decision::new(literal.solvable_id, decision, learnt_clause_id),
                new_level,
            )
            .expect("bug: the asserting literal was already decided");
        Ok(new_level)
    }

    /// Unit propagation through watched literals.
    ///
    /// Assertions (single-literal clauses) are applied first; then, for each
    /// newly assigned solvable, the chain of clauses watching it is walked.
    /// A clause whose watch was falsified either finds a new literal to
    /// watch or unit-propagates its remaining watch; an opposite existing
    /// assignment raises a conflict.
    fn propagate(&mut self, level: u32) -> Result<(), PropagationError> {
        if let Some(reason) = self.provider.should_cancel() {
            return Err(PropagationError::Cancelled(reason));
        }

        // Negative assertions derived from non-learnt rules.
        for &(solvable_id, clause_id) in &self.negative_assertions {
            let value = false;
            let decided = self
                .decision_tracker
                .try_add_decision(Decision::new(solvable_id, value, clause_id), level)
                .map_err(|()| PropagationError::Conflict(solvable_id, value, clause_id))?;
            if decided {
                tracing::trace!(
                    "propagate assertion {} = {value}",
                    self.provider.pool().display_solvable(solvable_id)
                );
            }
        }

        // Assertions derived from learnt clauses.
        for &clause_id in &self.learnt_clause_ids {
            let Clause::Learnt(learnt_id) = self.clauses[clause_id].kind else {
                unreachable!("only learnt clause ids are tracked here");
            };
            let literals = &self.learnt_clauses[learnt_id];
            if literals.len() > 1 {
                continue;
            }

            let literal = literals[0];
            let value = literal.satisfying_value();
            let decided = self
                .decision_tracker
                .try_add_decision(Decision::new(literal.solvable_id, value, clause_id), level)
                .map_err(|()| {
                    PropagationError::Conflict(literal.solvable_id, value, clause_id)
                })?;
            if decided {
                tracing::trace!(
                    "propagate learnt assertion {} = {value}",
                    self.provider.pool().display_solvable(literal.solvable_id)
                );
            }
        }

        // Watched solvables.
        while let Some(decision) = self.decision_tracker.next_unpropagated() {
            let watched_solvable = decision.solvable_id;

            // Walk the linked list of clauses watching this solvable.
            let mut old_predecessor_clause_id: Option<ClauseId>;
            let mut predecessor_clause_id: Option<ClauseId> = None;
            let mut clause_id = self.watches.first_clause_watching_solvable(watched_solvable);
            while !clause_id.is_null() {
                debug_assert!(
                    predecessor_clause_id != Some(clause_id),
                    "watch chain is circular"
                );

                old_predecessor_clause_id = predecessor_clause_id;
                predecessor_clause_id = Some(clause_id);
                let this_clause_id = clause_id;

                let (next_clause_id, payload) = {
                    let clause = &self.clauses[this_clause_id];
                    (
                        clause.next_watched_clause(watched_solvable),
                        clause.watch_turned_false(
                            watched_solvable,
                            self.decision_tracker.map(),
                            &self.learnt_clauses,
                        ),
                    )
                };
                clause_id = next_clause_id;

                let Some((watched_literals, watch_index)) = payload else {
                    continue;
                };

                let next_unwatched = self.clauses[this_clause_id].next_unwatched_variable(
                    &self.learnt_clauses,
                    &self.cache.sorted_candidates,
                    self.decision_tracker.map(),
                );

                if let Some(variable) = next_unwatched {
                    debug_assert!(
                        !self.clauses[this_clause_id]
                            .watched_literals
                            .contains(&variable)
                    );

                    if let Some(predecessor_id) = old_predecessor_clause_id {
                        let (predecessor, clause) =
                            self.clauses.get_two_mut(predecessor_id, this_clause_id);
                        self.watches.update_watched(
                            Some(predecessor),
                            clause,
                            this_clause_id,
                            watch_index,
                            watched_solvable,
                            variable,
                        );
                    } else {
                        let clause = &mut self.clauses[this_clause_id];
                        self.watches.update_watched(
                            None,
                            clause,
                            this_clause_id,
                            watch_index,
                            watched_solvable,
                            variable,
                        );
                    }

                    // The clause left this chain, so its predecessor is still
                    // the predecessor of the next clause.
                    predecessor_clause_id = old_predecessor_clause_id;
                } else {
                    // No replacement watch exists: the remaining watched
                    // literal must be made true.
                    let remaining_watch = watched_literals[1 - watch_index];
                    let value = remaining_watch.satisfying_value();
                    let decided = self
                        .decision_tracker
                        .try_add_decision(
                            Decision::new(remaining_watch.solvable_id, value, this_clause_id),
                            level,
                        )
                        .map_err(|()| {
                            PropagationError::Conflict(
                                remaining_watch.solvable_id,
                                value,
                                this_clause_id,
                            )
                        })?;

                    if decided
                        && !matches!(
                            self.clauses[this_clause_id].kind,
                            Clause::ForbidMultipleInstances(..)
                        )
                    {
                        tracing::trace!(
                            "propagate {} = {value}",
                            self.provider
                                .pool()
                                .display_solvable(remaining_watch.solvable_id)
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// First-UIP conflict analysis.
    ///
    /// Walks the implication graph backwards from the conflicting clause
    /// until exactly one literal assigned at the conflict level remains,
    /// collecting the literals of earlier levels into the learnt clause.
    /// Returns the backtrack level (the second-highest level in the learnt
    /// clause), the id of the learnt clause, and its asserting literal.
    fn analyze(
        &mut self,
        mut current_level: u32,
        mut conflicting_solvable: SolvableId,
        mut clause_id: ClauseId,
    ) -> (u32, ClauseId, Literal) {
        let mut seen: FxHashSet<SolvableId> = FxHashSet::default();
        let mut causes_at_current_level = 0u32;
        let mut learnt: Vec<Literal> = Vec::new();
        let mut back_track_to = 0u32;
        let mut s_value;

        let mut learnt_why = Vec::new();
        let mut first_iteration = true;
        loop {
            learnt_why.push(clause_id);

            self.clauses[clause_id].kind.visit_literals(
                &self.learnt_clauses,
                &self.cache.sorted_candidates,
                |literal| {
                    if !first_iteration && literal.solvable_id == conflicting_solvable {
                        // The conflicting solvable is only a cause in the
                        // conflicting clause itself.
                        return;
                    }

                    if !seen.insert(literal.solvable_id) {
                        return;
                    }

                    let decision_level = self.decision_tracker.level(literal.solvable_id);
                    if decision_level == current_level {
                        causes_at_current_level += 1;
                    } else if current_level > 1 {
                        let learnt_literal = Literal {
                            solvable_id: literal.solvable_id,
                            negate: self.decision_tracker.assigned_value(literal.solvable_id)
                                == Some(true),
                        };
                        learnt.push(learnt_literal);
                        back_track_to = back_track_to.max(decision_level);
                    } else {
                        unreachable!("level-1 conflicts are handled by analyze_unsolvable");
                    }
                },
            );

            first_iteration = false;

            // Select the next assignment to look at: the latest decision
            // involved in the conflict.
            loop {
                let (last_decision, last_decision_level) = self.decision_tracker.undo_last();

                conflicting_solvable = last_decision.solvable_id;
                s_value = last_decision.value;
                clause_id = last_decision.derived_from;
                current_level = last_decision_level;

                if seen.contains(&last_decision.solvable_id) {
                    break;
                }
            }

            causes_at_current_level = causes_at_current_level.saturating_sub(1);
            if causes_at_current_level == 0 {
                break;
            }
        }

        // The first unique implication point closes the learnt clause.
        let last_literal = Literal {
            solvable_id: conflicting_solvable,
            negate: s_value,
        };
        learnt.push(last_literal);

        let learnt_id = self.learnt_clauses.alloc(learnt.clone());
        self.learnt_why.insert(learnt_id, learnt_why);

        let clause_id = self.clauses.alloc(ClauseState::learnt(learnt_id, &learnt));
        self.learnt_clause_ids.push(clause_id);
        if self.clauses[clause_id].has_watches() {
            let clause = &mut self.clauses[clause_id];
            self.watches.start_watching(clause, clause_id);
        }

        tracing::debug!("learnt a clause with {} literals", learnt.len());

        self.decision_tracker.undo_until(back_track_to);

        (back_track_to, clause_id, last_literal)
    }

    /// Collects the clauses involved in a level-1 conflict into a
    /// [`Conflict`] for explanation.
    fn analyze_unsolvable(&mut self, clause_id: ClauseId) -> Conflict {
        let mut conflict = Conflict::default();
        let mut seen_learnt = FxHashSet::default();

        Self::record_conflict_clause(
            &self.clauses,
            &self.learnt_why,
            clause_id,
            &mut conflict,
            &mut seen_learnt,
        );

        let mut involved: FxHashSet<SolvableId> = FxHashSet::default();
        self.clauses[clause_id].kind.visit_literals(
            &self.learnt_clauses,
            &self.cache.sorted_candidates,
            |literal| {
                involved.insert(literal.solvable_id);
            },
        );

        for decision in self.decision_tracker.stack().iter().rev() {
            if decision.solvable_id.is_root() {
                continue;
            }
            let why = decision.derived_from;
            if why == ClauseId::install_root() {
                continue;
            }
            if !involved.contains(&decision.solvable_id) {
                continue;
            }

            Self::record_conflict_clause(
                &self.clauses,
                &self.learnt_why,
                why,
                &mut conflict,
                &mut seen_learnt,
            );

            self.clauses[why].kind.visit_literals(
                &self.learnt_clauses,
                &self.cache.sorted_candidates,
                |literal| {
                    if literal.eval(self.decision_tracker.map()) == Some(true) {
                        debug_assert_eq!(literal.solvable_id, decision.solvable_id);
                    } else {
                        involved.insert(literal.solvable_id);
                    }
                },
            );
        }

        conflict
    }

    /// Adds a clause to the conflict; learnt clauses are expanded into the
    /// clauses they were derived from, which are meaningful to users.
    fn record_conflict_clause(
        clauses: &Arena<ClauseId, ClauseState>,
        learnt_why: &FxHashMap<LearntClauseId, Vec<ClauseId>>,
        clause_id: ClauseId,
        conflict: &mut Conflict,
        seen_learnt: &mut FxHashSet<ClauseId>,
    ) {
        match clauses[clause_id].kind {
            Clause::Learnt(learnt_id) => {
                if !seen_learnt.insert(clause_id) {
                    return;
                }
                for &why in learnt_why
                    .get(&learnt_id)
                    .expect("every learnt clause has a why list")
                {
                    Self::record_conflict_clause(clauses, learnt_why, why, conflict, seen_learnt);
                }
            }
            _ => conflict.add_clause(clause_id),
        }
    }
}
