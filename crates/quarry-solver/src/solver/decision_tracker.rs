use crate::ids::{ClauseId, SolvableId};
use crate::solver::decision::Decision;
use crate::solver::decision_map::DecisionMap;

/// The chronological decision stack plus the per-solvable assignment map.
#[derive(Default)]
pub(crate) struct DecisionTracker {
    map: DecisionMap,
    stack: Vec<Decision>,
    propagate_index: usize,
}

impl DecisionTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn clear(&mut self) {
        self.map = DecisionMap::new();
        self.stack.clear();
        self.propagate_index = 0;
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub(crate) fn assigned_value(&self, solvable_id: SolvableId) -> Option<bool> {
        self.map.value(solvable_id)
    }

    pub(crate) fn map(&self) -> &DecisionMap {
        &self.map
    }

    pub(crate) fn stack(&self) -> &[Decision] {
        &self.stack
    }

    pub(crate) fn level(&self, solvable_id: SolvableId) -> u32 {
        self.map.level(solvable_id)
    }

    pub(crate) fn find_clause_for_assignment(&self, solvable_id: SolvableId) -> Option<ClauseId> {
        self.stack
            .iter()
            .rev()
            .find(|decision| decision.solvable_id == solvable_id)
            .map(|decision| decision.derived_from)
    }

    /// Attempts to add a decision.
    ///
    /// Returns `Ok(true)` if the solvable was undecided, `Ok(false)` if it
    /// was already decided to the same value, and `Err(())` on a conflicting
    /// assignment.
    pub(crate) fn try_add_decision(&mut self, decision: Decision, level: u32) -> Result<bool, ()> {
        match self.map.value(decision.solvable_id) {
            None => {
                self.map.set(decision.solvable_id, decision.value, level);
                self.stack.push(decision);
                Ok(true)
            }
            Some(value) if value == decision.value => Ok(false),
            Some(_) => Err(()),
        }
    }

    /// Pops decisions above `level`.
    pub(crate) fn undo_until(&mut self, level: u32) {
        while let Some(decision) = self.stack.last() {
            if self.map.level(decision.solvable_id) <= level {
                break;
            }
            self.undo_last();
        }
    }

    /// Pops the top decision; returns it along with the level of the new top.
    pub(crate) fn undo_last(&mut self) -> (Decision, u32) {
        let decision = self.stack.pop().expect("undo on an empty stack");
        self.map.reset(decision.solvable_id);
        self.propagate_index = self.stack.len();

        let level = self
            .stack
            .last()
            .map_or(0, |top| self.map.level(top.solvable_id));
        (decision, level)
    }

    /// The next decision that unit propagation has not yet processed.
    pub(crate) fn next_unpropagated(&mut self) -> Option<Decision> {
        let decision = self.stack.get(self.propagate_index).copied();
        if decision.is_some() {
            self.propagate_index += 1;
        }
        decision
    }
}
