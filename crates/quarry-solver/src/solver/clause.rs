use rustc_hash::FxHashMap;

use crate::arena::Arena;
use crate::ids::{ClauseId, LearntClauseId, SolvableId, StringId, VersionSetId};
use crate::solver::decision_map::DecisionMap;
use crate::solver::decision_tracker::DecisionTracker;

/// A literal: a solvable, possibly negated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Literal {
    pub(crate) solvable_id: SolvableId,
    pub(crate) negate: bool,
}

impl Literal {
    /// The value that makes this literal true when assigned to its solvable.
    pub(crate) fn satisfying_value(self) -> bool {
        !self.negate
    }

    /// Evaluates the literal under the current assignment; `None` when the
    /// solvable is undecided.
    pub(crate) fn eval(self, map: &DecisionMap) -> Option<bool> {
        map.value(self.solvable_id)
            .map(|value| value != self.negate)
    }
}

/// The clause taxonomy of the SAT instance.
///
/// Every variant is a disjunction of literals over solvables; `visit_literals`
/// is the single operation that drives both propagation and conflict
/// explanation.
#[derive(Copy, Clone, Debug)]
pub(crate) enum Clause {
    /// The root solvable must be installed. Satisfied by definition at
    /// level 1.
    InstallRoot,
    /// `¬parent ∨ candidate₁ ∨ candidate₂ ∨ …`: if the parent is installed,
    /// at least one candidate of the version set must be.
    Requires(SolvableId, VersionSetId),
    /// `¬a ∨ ¬b`: two candidates of one name cannot both be installed.
    ForbidMultipleInstances(SolvableId, SolvableId),
    /// `¬parent ∨ ¬forbidden`: if the parent is installed, the candidate
    /// violating the constraint must not be.
    Constrains(SolvableId, SolvableId, VersionSetId),
    /// `¬root ∨ ¬other`: `other` is forbidden because another candidate of
    /// its name is pinned.
    Lock(SolvableId, SolvableId),
    /// A clause derived by conflict analysis; its literals live in the learnt
    /// clause arena.
    Learnt(LearntClauseId),
    /// `¬candidate`: the candidate may never be selected, with a reason.
    Excluded(SolvableId, StringId),
}

pub(crate) type SortedCandidates = FxHashMap<VersionSetId, Vec<SolvableId>>;

impl Clause {
    /// Visits every literal of the clause in a deterministic order.
    pub(crate) fn visit_literals(
        &self,
        learnt_clauses: &Arena<LearntClauseId, Vec<Literal>>,
        sorted_candidates: &SortedCandidates,
        mut visit: impl FnMut(Literal),
    ) {
        match *self {
            Clause::InstallRoot => {}
            Clause::Excluded(candidate, _) => {
                visit(Literal {
                    solvable_id: candidate,
                    negate: true,
                });
            }
            Clause::Learnt(learnt_id) => {
                for &literal in &learnt_clauses[learnt_id] {
                    visit(literal);
                }
            }
            Clause::Requires(parent, version_set_id) => {
                visit(Literal {
                    solvable_id: parent,
                    negate: true,
                });
                for &candidate in &sorted_candidates[&version_set_id] {
                    visit(Literal {
                        solvable_id: candidate,
                        negate: false,
                    });
                }
            }
            Clause::Constrains(parent, forbidden, _) => {
                visit(Literal {
                    solvable_id: parent,
                    negate: true,
                });
                visit(Literal {
                    solvable_id: forbidden,
                    negate: true,
                });
            }
            Clause::ForbidMultipleInstances(a, b) => {
                visit(Literal {
                    solvable_id: a,
                    negate: true,
                });
                visit(Literal {
                    solvable_id: b,
                    negate: true,
                });
            }
            Clause::Lock(_, other) => {
                visit(Literal {
                    solvable_id: SolvableId::root(),
                    negate: true,
                });
                visit(Literal {
                    solvable_id: other,
                    negate: true,
                });
            }
        }
    }
}

/// A clause in the arena: its kind plus the two watched solvables and the
/// links continuing each solvable's watch chain.
#[derive(Clone, Debug)]
pub(crate) struct ClauseState {
    pub(crate) kind: Clause,
    pub(crate) watched_literals: [SolvableId; 2],
    next_watches: [ClauseId; 2],
}

impl ClauseState {
    fn new(kind: Clause, watches: Option<[SolvableId; 2]>) -> Self {
        let watched_literals = watches.unwrap_or([SolvableId::null(), SolvableId::null()]);
        let state = Self {
            kind,
            watched_literals,
            next_watches: [ClauseId::null(), ClauseId::null()],
        };
        debug_assert!(!state.has_watches() || watched_literals[0] != watched_literals[1]);
        state
    }

    pub(crate) fn root() -> Self {
        Self::new(Clause::InstallRoot, None)
    }

    /// Builds a requires clause. The initial watches are the parent and the
    /// first candidate that is not yet decided false; when every candidate is
    /// false (and the parent is not) the clause is born conflicting.
    pub(crate) fn requires(
        parent: SolvableId,
        requirement: VersionSetId,
        candidates: &[SolvableId],
        decision_tracker: &DecisionTracker,
    ) -> (Self, bool) {
        // A requires clause is only introduced while the parent is undecided
        // or decided to be installed.
        debug_assert!(decision_tracker.assigned_value(parent) != Some(false));

        let kind = Clause::Requires(parent, requirement);
        if candidates.is_empty() {
            return (Self::new(kind, None), false);
        }

        match candidates
            .iter()
            .copied()
            .find(|&c| decision_tracker.assigned_value(c) != Some(false))
        {
            Some(watched) => (Self::new(kind, Some([parent, watched])), false),
            None => (Self::new(kind, Some([parent, candidates[0]])), true),
        }
    }

    /// Builds a constrains clause; born conflicting when the forbidden
    /// candidate is already installed.
    pub(crate) fn constrains(
        parent: SolvableId,
        forbidden: SolvableId,
        via: VersionSetId,
        decision_tracker: &DecisionTracker,
    ) -> (Self, bool) {
        debug_assert!(decision_tracker.assigned_value(parent) != Some(false));

        let conflict = decision_tracker.assigned_value(forbidden) == Some(true);
        (
            Self::new(
                Clause::Constrains(parent, forbidden, via),
                Some([parent, forbidden]),
            ),
            conflict,
        )
    }

    pub(crate) fn forbid_multiple(candidate: SolvableId, other: SolvableId) -> Self {
        Self::new(
            Clause::ForbidMultipleInstances(candidate, other),
            Some([candidate, other]),
        )
    }

    pub(crate) fn lock(locked: SolvableId, other: SolvableId) -> Self {
        Self::new(Clause::Lock(locked, other), Some([SolvableId::root(), other]))
    }

    pub(crate) fn exclude(candidate: SolvableId, reason: StringId) -> Self {
        Self::new(Clause::Excluded(candidate, reason), None)
    }

    pub(crate) fn learnt(learnt_id: LearntClauseId, literals: &[Literal]) -> Self {
        debug_assert!(!literals.is_empty());
        let watches = if literals.len() == 1 {
            // Unit clauses are asserted directly and carry no watches.
            None
        } else {
            Some([
                literals.first().unwrap().solvable_id,
                literals.last().unwrap().solvable_id,
            ])
        };
        Self::new(Clause::Learnt(learnt_id), watches)
    }

    pub(crate) fn has_watches(&self) -> bool {
        !self.watched_literals[0].is_null()
    }

    pub(crate) fn link_to_clause(&mut self, watch_index: usize, linked: ClauseId) {
        self.next_watches[watch_index] = linked;
    }

    pub(crate) fn next_watched_clause(&self, solvable_id: SolvableId) -> ClauseId {
        if solvable_id == self.watched_literals[0] {
            self.next_watches[0]
        } else {
            debug_assert_eq!(self.watched_literals[1], solvable_id);
            self.next_watches[1]
        }
    }

    /// Removes `self` from the watch chain of `watched`, given the clause
    /// that precedes it in that chain.
    pub(crate) fn unlink_clause(
        &mut self,
        linked_clause: &ClauseState,
        watched: SolvableId,
        linked_watch_index: usize,
    ) {
        if self.watched_literals[0] == watched {
            self.next_watches[0] = linked_clause.next_watches[linked_watch_index];
        } else {
            debug_assert_eq!(self.watched_literals[1], watched);
            self.next_watches[1] = linked_clause.next_watches[linked_watch_index];
        }
    }

    /// The two watched solvables as literals with the polarity they have in
    /// this clause.
    pub(crate) fn watched_literals(
        &self,
        learnt_clauses: &Arena<LearntClauseId, Vec<Literal>>,
    ) -> [Literal; 2] {
        let negated = |index: usize, negate: bool| Literal {
            solvable_id: self.watched_literals[index],
            negate,
        };

        match self.kind {
            Clause::InstallRoot | Clause::Excluded(..) => {
                unreachable!("clauses without watches have no watched literals")
            }
            Clause::Learnt(learnt_id) => {
                let literals = &learnt_clauses[learnt_id];
                let watched = |watch: SolvableId| {
                    *literals
                        .iter()
                        .find(|literal| literal.solvable_id == watch)
                        .expect("watched solvable is not part of the learnt clause")
                };
                [
                    watched(self.watched_literals[0]),
                    watched(self.watched_literals[1]),
                ]
            }
            Clause::Constrains(..) | Clause::ForbidMultipleInstances(..) | Clause::Lock(..) => {
                [negated(0, true), negated(1, true)]
            }
            Clause::Requires(parent, _) => [
                negated(0, self.watched_literals[0] == parent),
                negated(1, self.watched_literals[1] == parent),
            ],
        }
    }

    /// Whether assigning `solvable_id` falsified one of the watched literals;
    /// returns the watched literals and the index of the falsified one.
    pub(crate) fn watch_turned_false(
        &self,
        solvable_id: SolvableId,
        map: &DecisionMap,
        learnt_clauses: &Arena<LearntClauseId, Vec<Literal>>,
    ) -> Option<([Literal; 2], usize)> {
        debug_assert!(self.watched_literals.contains(&solvable_id));

        let literals = self.watched_literals(learnt_clauses);
        let [w0, w1] = literals;

        if solvable_id == w0.solvable_id && w0.eval(map) == Some(false) {
            Some((literals, 0))
        } else if solvable_id == w1.solvable_id && w1.eval(map) == Some(false) {
            Some((literals, 1))
        } else {
            None
        }
    }

    /// Finds a literal that can take over a falsified watch: one that is not
    /// already watched and is true or undecided.
    pub(crate) fn next_unwatched_variable(
        &self,
        learnt_clauses: &Arena<LearntClauseId, Vec<Literal>>,
        sorted_candidates: &SortedCandidates,
        map: &DecisionMap,
    ) -> Option<SolvableId> {
        let can_watch = |literal: Literal| {
            !self.watched_literals.contains(&literal.solvable_id)
                && literal.eval(map).unwrap_or(true)
        };

        match self.kind {
            Clause::InstallRoot | Clause::Excluded(..) => None,
            Clause::Learnt(learnt_id) => learnt_clauses[learnt_id]
                .iter()
                .copied()
                .find(|&literal| can_watch(literal))
                .map(|literal| literal.solvable_id),
            Clause::Constrains(..) | Clause::ForbidMultipleInstances(..) | Clause::Lock(..) => None,
            Clause::Requires(parent, version_set_id) => {
                let parent_literal = Literal {
                    solvable_id: parent,
                    negate: true,
                };
                if can_watch(parent_literal) {
                    return Some(parent);
                }
                sorted_candidates[&version_set_id]
                    .iter()
                    .copied()
                    .find(|&candidate| {
                        can_watch(Literal {
                            solvable_id: candidate,
                            negate: false,
                        })
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ArenaId;
    use crate::solver::decision::Decision;

    fn solvable(index: usize) -> SolvableId {
        SolvableId::from_usize(index)
    }

    #[test]
    fn literal_satisfying_value() {
        let positive = Literal {
            solvable_id: SolvableId::root(),
            negate: false,
        };
        let negative = Literal {
            solvable_id: SolvableId::root(),
            negate: true,
        };
        assert!(positive.satisfying_value());
        assert!(!negative.satisfying_value());
    }

    #[test]
    fn literal_eval() {
        let mut map = DecisionMap::new();
        let literal = Literal {
            solvable_id: SolvableId::root(),
            negate: false,
        };
        let negated = Literal {
            solvable_id: SolvableId::root(),
            negate: true,
        };

        assert_eq!(literal.eval(&map), None);
        assert_eq!(negated.eval(&map), None);

        map.set(SolvableId::root(), true, 1);
        assert_eq!(literal.eval(&map), Some(true));
        assert_eq!(negated.eval(&map), Some(false));

        map.set(SolvableId::root(), false, 1);
        assert_eq!(literal.eval(&map), Some(false));
        assert_eq!(negated.eval(&map), Some(true));
    }

    #[test]
    fn requires_with_and_without_conflict() {
        let mut decisions = DecisionTracker::new();
        let parent = solvable(1);
        let candidate1 = solvable(2);
        let candidate2 = solvable(3);
        let version_set = VersionSetId::from_usize(0);

        // All candidates available.
        let (clause, conflict) = ClauseState::requires(
            parent,
            version_set,
            &[candidate1, candidate2],
            &decisions,
        );
        assert!(!conflict);
        assert_eq!(clause.watched_literals, [parent, candidate1]);

        // One candidate still available.
        decisions
            .try_add_decision(Decision::new(candidate1, false, ClauseId::install_root()), 1)
            .unwrap();
        let (clause, conflict) = ClauseState::requires(
            parent,
            version_set,
            &[candidate1, candidate2],
            &decisions,
        );
        assert!(!conflict);
        assert_eq!(clause.watched_literals, [parent, candidate2]);

        // No candidates available: born conflicting.
        decisions
            .try_add_decision(Decision::new(candidate2, false, ClauseId::install_root()), 1)
            .unwrap();
        let (clause, conflict) = ClauseState::requires(
            parent,
            version_set,
            &[candidate1, candidate2],
            &decisions,
        );
        assert!(conflict);
        assert_eq!(clause.watched_literals, [parent, candidate1]);
    }

    #[test]
    fn constrains_with_and_without_conflict() {
        let mut decisions = DecisionTracker::new();
        let parent = solvable(1);
        let forbidden = solvable(2);
        let version_set = VersionSetId::from_usize(0);

        let (clause, conflict) =
            ClauseState::constrains(parent, forbidden, version_set, &decisions);
        assert!(!conflict);
        assert_eq!(clause.watched_literals, [parent, forbidden]);

        decisions
            .try_add_decision(Decision::new(forbidden, true, ClauseId::install_root()), 1)
            .unwrap();
        let (clause, conflict) =
            ClauseState::constrains(parent, forbidden, version_set, &decisions);
        assert!(conflict);
        assert_eq!(clause.watched_literals, [parent, forbidden]);
    }

    fn chain(
        next_watches: [ClauseId; 2],
        watched_literals: [SolvableId; 2],
    ) -> ClauseState {
        let mut state = ClauseState::new(Clause::InstallRoot, Some(watched_literals));
        state.next_watches = next_watches;
        state
    }

    #[test]
    fn unlink_clause_different_slots() {
        let clause1 = chain(
            [ClauseId::from_usize(2), ClauseId::from_usize(3)],
            [solvable(1596), solvable(1211)],
        );
        let clause2 = chain(
            [ClauseId::null(), ClauseId::from_usize(3)],
            [solvable(1596), solvable(1208)],
        );
        let clause3 = chain(
            [ClauseId::null(), ClauseId::null()],
            [solvable(1211), solvable(42)],
        );

        let mut copy = clause1.clone();
        copy.unlink_clause(&clause2, solvable(1596), 0);
        assert_eq!(copy.watched_literals, [solvable(1596), solvable(1211)]);
        assert_eq!(copy.next_watches, [ClauseId::null(), ClauseId::from_usize(3)]);

        let mut copy = clause1.clone();
        copy.unlink_clause(&clause3, solvable(1211), 0);
        assert_eq!(copy.watched_literals, [solvable(1596), solvable(1211)]);
        assert_eq!(copy.next_watches, [ClauseId::from_usize(2), ClauseId::null()]);
    }

    #[test]
    fn unlink_clause_same_clause() {
        let clause1 = chain(
            [ClauseId::from_usize(2), ClauseId::from_usize(2)],
            [solvable(1596), solvable(1211)],
        );
        let clause2 = chain(
            [ClauseId::null(), ClauseId::null()],
            [solvable(1596), solvable(1211)],
        );

        let mut copy = clause1.clone();
        copy.unlink_clause(&clause2, solvable(1596), 0);
        assert_eq!(copy.next_watches, [ClauseId::null(), ClauseId::from_usize(2)]);

        let mut copy = clause1.clone();
        copy.unlink_clause(&clause2, solvable(1211), 1);
        assert_eq!(copy.next_watches, [ClauseId::from_usize(2), ClauseId::null()]);
    }
}
