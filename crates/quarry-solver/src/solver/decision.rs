use crate::ids::{ClauseId, SolvableId};

/// One assignment on the decision stack: a solvable set to install (`true`)
/// or reject (`false`), and the clause that forced it. Decisions made by the
/// heuristic derive from the requires clause they satisfy.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Decision {
    pub(crate) solvable_id: SolvableId,
    pub(crate) value: bool,
    pub(crate) derived_from: ClauseId,
}

impl Decision {
    pub(crate) fn new(solvable_id: SolvableId, value: bool, derived_from: ClauseId) -> Self {
        Self {
            solvable_id,
            value,
            derived_from,
        }
    }
}
