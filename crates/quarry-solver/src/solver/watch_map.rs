use rustc_hash::FxHashMap;

use crate::ids::{ClauseId, SolvableId};
use crate::solver::clause::ClauseState;

/// For each solvable, the head of the linked list of clauses watching it.
/// The links themselves live inside the clauses (`next_watches`), so walking
/// and relinking a chain touches only the clause arena.
#[derive(Default)]
pub(crate) struct WatchMap {
    map: FxHashMap<SolvableId, ClauseId>,
}

impl WatchMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inserts the clause at the head of the chains of both its watched
    /// solvables.
    pub(crate) fn start_watching(&mut self, clause: &mut ClauseState, clause_id: ClauseId) {
        for (watch_index, &watched) in clause.watched_literals.clone().iter().enumerate() {
            let head = self
                .map
                .insert(watched, clause_id)
                .unwrap_or_else(ClauseId::null);
            clause.link_to_clause(watch_index, head);
        }
    }

    /// Moves one watch of `clause` from `previous_watch` to `new_watch`,
    /// unlinking it from the old chain and pushing it onto the new one.
    pub(crate) fn update_watched(
        &mut self,
        predecessor: Option<&mut ClauseState>,
        clause: &mut ClauseState,
        clause_id: ClauseId,
        watch_index: usize,
        previous_watch: SolvableId,
        new_watch: SolvableId,
    ) {
        // Remove from the old chain.
        if let Some(predecessor) = predecessor {
            predecessor.unlink_clause(clause, previous_watch, watch_index);
        } else {
            debug_assert_eq!(self.map.get(&previous_watch), Some(&clause_id));
            let next = clause.next_watched_clause(previous_watch);
            if next.is_null() {
                self.map.remove(&previous_watch);
            } else {
                self.map.insert(previous_watch, next);
            }
        }

        // Set the new watch and push onto the new chain.
        clause.watched_literals[watch_index] = new_watch;
        let head = self
            .map
            .insert(new_watch, clause_id)
            .unwrap_or_else(ClauseId::null);
        clause.link_to_clause(watch_index, head);
    }

    pub(crate) fn first_clause_watching_solvable(&self, solvable_id: SolvableId) -> ClauseId {
        self.map
            .get(&solvable_id)
            .copied()
            .unwrap_or_else(ClauseId::null)
    }
}
