use std::collections::BTreeMap;
use std::sync::Arc;

use crate::canvas::{Layer, LayerId, LayerStack};

/// History capacity meaning "keep every snapshot".  This is the default.
pub const UNLIMITED_HISTORY: usize = 0;
pub const DEFAULT_MAX_HISTORY: usize = UNLIMITED_HISTORY;

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Immutable copy of the stack at one instant: layer records, z-order and the
/// active layer.
///
/// Layer records are `Arc`-shared with the live stack and with neighbouring
/// snapshots; the stack copies a record before mutating it, so a snapshot
/// never observes later edits.
#[derive(Clone, Debug, PartialEq)]
pub struct StackSnapshot {
    layers: BTreeMap<LayerId, Arc<Layer>>,
    order: Vec<LayerId>,
    active: LayerId,
}

impl StackSnapshot {
    pub fn capture(stack: &LayerStack) -> Self {
        Self {
            layers: stack.layers.clone(),
            order: stack.order.clone(),
            active: stack.active,
        }
    }

    /// Overwrite the stack's layers with this snapshot.  Canvas size and id
    /// counters are kept, so ids allocated after the snapshot stay retired.
    pub fn restore_into(&self, stack: &mut LayerStack) {
        stack.replace_contents(self.layers.clone(), self.order.clone(), self.active);
    }
}

#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub label: String,
    pub snapshot: StackSnapshot,
}

// ============================================================================
// HISTORY MANAGER
// ============================================================================

/// Linear snapshot history with a cursor.
///
/// `entries[index]` always matches the live stack between operations, and
/// `entries[0]` is always the state the session opened with.  With a non-zero
/// `max_history_size` the oldest snapshots after that first one are dropped.
pub struct HistoryManager {
    entries: Vec<HistoryEntry>,
    index: usize,
    max_history_size: usize,
}

impl HistoryManager {
    pub fn new(initial: &LayerStack, max_history_size: usize) -> Self {
        Self {
            entries: vec![HistoryEntry {
                label: "Open".to_string(),
                snapshot: StackSnapshot::capture(initial),
            }],
            index: 0,
            max_history_size,
        }
    }

    /// Record the stack after a committed edit.  Anything that was undone is
    /// discarded first.
    pub fn push(&mut self, label: impl Into<String>, stack: &LayerStack) {
        self.entries.truncate(self.index + 1);
        self.entries.push(HistoryEntry {
            label: label.into(),
            snapshot: StackSnapshot::capture(stack),
        });
        self.index = self.entries.len() - 1;
        self.prune();
    }

    /// Step back one snapshot.  `false` at the start of history.
    pub fn undo(&mut self, stack: &mut LayerStack) -> bool {
        if !self.can_undo() {
            return false;
        }
        self.index -= 1;
        self.entries[self.index].snapshot.restore_into(stack);
        true
    }

    /// Step forward one snapshot.  `false` at the end of history.
    pub fn redo(&mut self, stack: &mut LayerStack) -> bool {
        if !self.can_redo() {
            return false;
        }
        self.index += 1;
        self.entries[self.index].snapshot.restore_into(stack);
        true
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    /// Label of the edit `undo` would revert.
    pub fn undo_description(&self) -> Option<&str> {
        self.can_undo().then(|| self.entries[self.index].label.as_str())
    }

    /// All labels, oldest first.
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> &StackSnapshot {
        &self.entries[self.index].snapshot
    }

    /// Prune old snapshots to stay within an opt-in size limit.  The opening
    /// snapshot is never dropped.
    fn prune(&mut self) {
        if self.max_history_size == UNLIMITED_HISTORY {
            return;
        }
        let limit = self.max_history_size.max(2);
        let excess = self.entries.len().saturating_sub(limit);
        if excess > 0 {
            self.entries.drain(1..=excess);
            self.index = self.index.saturating_sub(excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::layers;

    #[test]
    fn pushes_follow_the_history_law() {
        let mut stack = LayerStack::new(10, 10);
        let mut history = HistoryManager::new(&stack, DEFAULT_MAX_HISTORY);
        for n in 1..=4 {
            layers::add_raster_layer(&mut stack, "");
            history.push("Add Layer", &stack);
            assert_eq!(history.len(), n + 1);
            assert_eq!(history.index(), n);
        }
    }

    #[test]
    fn edit_after_undo_truncates_redo_tail() {
        let mut stack = LayerStack::new(10, 10);
        let mut history = HistoryManager::new(&stack, DEFAULT_MAX_HISTORY);
        for _ in 0..3 {
            layers::add_raster_layer(&mut stack, "");
            history.push("Add Layer", &stack);
        }
        assert!(history.undo(&mut stack));
        assert!(history.undo(&mut stack));
        assert_eq!(stack.len(), 2);

        layers::add_raster_layer(&mut stack, "fresh");
        history.push("Add Layer: fresh", &stack);
        assert_eq!(history.len(), history.index() + 1);
        assert_eq!(history.len(), 3);
        assert!(!history.can_redo());
    }

    #[test]
    fn undo_then_redo_restores_equal_stack() {
        let mut stack = LayerStack::new(10, 10);
        let mut history = HistoryManager::new(&stack, DEFAULT_MAX_HISTORY);
        let id = layers::add_raster_layer(&mut stack, "a");
        history.push("Add Layer", &stack);
        layers::set_opacity(&mut stack, id, 0.25).expect("opacity");
        history.push("Layer Opacity", &stack);

        let after = StackSnapshot::capture(&stack);
        assert!(history.undo(&mut stack));
        assert_eq!(stack.layer(id).map(|l| l.opacity), Some(1.0));
        assert!(history.redo(&mut stack));
        assert_eq!(StackSnapshot::capture(&stack), after);
    }

    #[test]
    fn bounds_return_false() {
        let mut stack = LayerStack::new(10, 10);
        let mut history = HistoryManager::new(&stack, DEFAULT_MAX_HISTORY);
        assert!(!history.undo(&mut stack));
        assert!(!history.redo(&mut stack));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn snapshots_do_not_see_later_edits() {
        let mut stack = LayerStack::new(10, 10);
        let history = HistoryManager::new(&stack, DEFAULT_MAX_HISTORY);
        let base = stack.active_id();
        layers::rename_layer(&mut stack, base, "renamed").expect("rename");
        let snap = history.current();
        let mut restored = LayerStack::new(10, 10);
        snap.restore_into(&mut restored);
        assert_eq!(restored.layer(base).map(|l| l.name.as_str()), Some("Background"));
    }

    #[test]
    fn ids_are_not_reused_after_undo() {
        let mut stack = LayerStack::new(10, 10);
        let mut history = HistoryManager::new(&stack, DEFAULT_MAX_HISTORY);
        let first = layers::add_raster_layer(&mut stack, "");
        history.push("Add Layer", &stack);
        history.undo(&mut stack);
        let second = layers::add_raster_layer(&mut stack, "");
        assert_ne!(first, second);
    }

    #[test]
    fn default_history_keeps_every_edit() {
        let mut stack = LayerStack::new(10, 10);
        let mut history = HistoryManager::new(&stack, DEFAULT_MAX_HISTORY);
        for _ in 0..150 {
            layers::add_raster_layer(&mut stack, "");
            history.push("Add Layer", &stack);
        }
        assert_eq!(history.len(), 151);
        assert_eq!(history.index(), 150);

        let mut steps = 0;
        while history.undo(&mut stack) {
            steps += 1;
        }
        assert_eq!(steps, 150);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn opt_in_capacity_keeps_opening_snapshot() {
        let mut stack = LayerStack::new(10, 10);
        let mut history = HistoryManager::new(&stack, 3);
        for _ in 0..5 {
            layers::add_raster_layer(&mut stack, "");
            history.push("Add Layer", &stack);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.index(), 2);
        assert_eq!(history.labels()[0], "Open");
        assert!(history.undo(&mut stack));
        assert_eq!(stack.len(), 5);
        assert!(history.undo(&mut stack));
        assert_eq!(stack.len(), 1);
        assert!(!history.undo(&mut stack));
    }
}
