#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingState {
    Unchanged,
    PendingSelect,
    PendingDeselect,
}

impl PendingState {
    /// A pending entry reverts to `Unchanged` on the next toggle no matter
    /// which value that toggle carries.
    pub fn toggle(self, selected: bool) -> Self {
        match self {
            PendingState::Unchanged if selected => PendingState::PendingSelect,
            PendingState::Unchanged => PendingState::PendingDeselect,
            PendingState::PendingSelect | PendingState::PendingDeselect => PendingState::Unchanged,
        }
    }

    pub fn desired(self) -> Option<bool> {
        match self {
            PendingState::Unchanged => None,
            PendingState::PendingSelect => Some(true),
            PendingState::PendingDeselect => Some(false),
        }
    }
}

/// Uncommitted selection edits for one kind of catalogue item. Entries keep
/// the order in which they were first toggled, so commits write in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingChanges {
    entries: Vec<(i64, PendingState)>,
}

impl PendingChanges {
    pub fn state(&self, id: i64) -> PendingState {
        self.entries
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map_or(PendingState::Unchanged, |(_, state)| *state)
    }

    pub fn toggle(&mut self, id: i64, selected: bool) -> PendingState {
        let position = self.entries.iter().position(|(entry_id, _)| *entry_id == id);
        match position {
            Some(index) => {
                let next = self.entries[index].1.toggle(selected);
                if next == PendingState::Unchanged {
                    self.entries.remove(index);
                } else {
                    self.entries[index].1 = next;
                }
                next
            }
            None => {
                let next = PendingState::Unchanged.toggle(selected);
                self.entries.push((id, next));
                next
            }
        }
    }

    /// `(id, desired selection)` pairs in toggle order.
    pub fn desired(&self) -> Vec<(i64, bool)> {
        self.entries
            .iter()
            .filter_map(|(id, state)| state.desired().map(|selected| (*id, selected)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_toggles_cancel_out() {
        let mut pending = PendingChanges::default();
        assert_eq!(pending.toggle(4, true), PendingState::PendingSelect);
        assert_eq!(pending.toggle(4, false), PendingState::Unchanged);
        assert!(pending.is_empty());
        assert!(pending.desired().is_empty());
    }

    #[test]
    fn repeated_identical_toggles_also_cancel_out() {
        let mut pending = PendingChanges::default();
        pending.toggle(4, false);
        pending.toggle(4, false);
        assert_eq!(pending.state(4), PendingState::Unchanged);
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn desired_follows_toggle_order() {
        let mut pending = PendingChanges::default();
        pending.toggle(9, false);
        pending.toggle(2, true);
        pending.toggle(5, true);
        assert_eq!(pending.desired(), vec![(9, false), (2, true), (5, true)]);
    }

    #[test]
    fn cancelled_then_retoggled_id_moves_to_the_end() {
        let mut pending = PendingChanges::default();
        pending.toggle(3, true);
        pending.toggle(8, true);
        pending.toggle(3, true);
        pending.toggle(3, false);
        assert_eq!(pending.desired(), vec![(8, true), (3, false)]);
    }
}
