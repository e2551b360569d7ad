use crate::ids::{ArenaId, SolvableId};

/// The current assignment of every solvable, with the decision level at
/// which it was made. Indexed densely by solvable id.
#[derive(Default)]
pub(crate) struct DecisionMap {
    values: Vec<Option<(bool, u32)>>,
}

impl DecisionMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn value(&self, solvable_id: SolvableId) -> Option<bool> {
        self.values
            .get(solvable_id.to_usize())
            .copied()
            .flatten()
            .map(|(value, _)| value)
    }

    /// The level of the assignment; 0 when unassigned.
    pub(crate) fn level(&self, solvable_id: SolvableId) -> u32 {
        self.values
            .get(solvable_id.to_usize())
            .copied()
            .flatten()
            .map_or(0, |(_, level)| level)
    }

    pub(crate) fn set(&mut self, solvable_id: SolvableId, value: bool, level: u32) {
        let index = solvable_id.to_usize();
        if index >= self.values.len() {
            self.values.resize(index + 1, None);
        }
        self.values[index] = Some((value, level));
    }

    pub(crate) fn reset(&mut self, solvable_id: SolvableId) {
        if let Some(slot) = self.values.get_mut(solvable_id.to_usize()) {
            *slot = None;
        }
    }
}
