use std::collections::VecDeque;

use crate::canvas::{LayerStack, RasterBuffer};

/// Default number of retained mask states, baseline included.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

// ============================================================================
// MASK SNAPSHOT
// ============================================================================

/// A whole-buffer copy of the Mask layer plus the action that produced it.
#[derive(Clone)]
pub struct MaskSnapshot {
    pub mask: RasterBuffer,
    pub description: String,
}

impl MaskSnapshot {
    pub fn capture(stack: &LayerStack, description: impl Into<String>) -> Self {
        Self {
            mask: stack.mask().clone(),
            description: description.into(),
        }
    }

    pub fn restore_into(&self, stack: &mut LayerStack) -> bool {
        stack.restore_mask(&self.mask)
    }

    pub fn memory_size(&self) -> usize {
        self.mask.as_raw().len() + self.description.len()
    }
}

// ============================================================================
// HISTORY MANAGER
// ============================================================================

/// Bounded stack of Mask snapshots.
///
/// Entry 0 is the session baseline (the empty mask, or the service mask when
/// one was supplied). It is never evicted, so undo always lands on it and
/// never goes past it. There is no redo.
pub struct HistoryManager {
    stack: VecDeque<MaskSnapshot>,
    capacity: usize,
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            stack: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            total_memory: 0,
        }
    }

    /// Drop everything and start over from `stack`'s current Mask.
    pub fn reset_baseline(&mut self, stack: &LayerStack) {
        self.stack.clear();
        self.total_memory = 0;
        self.push(MaskSnapshot::capture(stack, "Baseline"));
    }

    /// Capture the current Mask and append it.
    pub fn snapshot(&mut self, stack: &LayerStack, description: impl Into<String>) {
        self.push(MaskSnapshot::capture(stack, description));
    }

    pub fn push(&mut self, snapshot: MaskSnapshot) {
        self.total_memory += snapshot.memory_size();
        self.stack.push_back(snapshot);
        self.prune();
    }

    /// Step back one entry and restore the Mask to the new top.
    /// Returns false (and leaves the Mask untouched) at the baseline.
    pub fn undo(&mut self, stack: &mut LayerStack) -> bool {
        if self.stack.len() <= 1 {
            return false;
        }
        if let Some(removed) = self.stack.pop_back() {
            self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            crate::log_info!("Undo: {}", removed.description);
        }
        match self.stack.back() {
            Some(top) => top.restore_into(stack),
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.stack.len() > 1
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn current(&self) -> Option<&MaskSnapshot> {
        self.stack.back()
    }

    pub fn undo_description(&self) -> Option<&str> {
        if self.can_undo() {
            self.stack.back().map(|s| s.description.as_str())
        } else {
            None
        }
    }

    /// Descriptions, most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.stack.iter().rev().map(|s| s.description.clone()).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    // Evict the oldest entry after the pinned baseline.
    fn prune(&mut self) {
        while self.stack.len() > self.capacity && self.stack.len() > 1 {
            if let Some(removed) = self.stack.remove(1) {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn stack() -> LayerStack {
        LayerStack::from_base(&RgbaImage::from_pixel(8, 8, Rgba([10, 10, 10, 255])), None).0
    }

    #[test]
    fn undo_at_baseline_is_noop() {
        let mut layers = stack();
        let mut history = HistoryManager::default();
        history.reset_baseline(&layers);
        assert!(!history.undo(&mut layers));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn overflow_keeps_baseline_pinned() {
        let mut layers = stack();
        let mut history = HistoryManager::new(3);
        history.reset_baseline(&layers);
        for i in 0..5u8 {
            layers.mask_mut().put_pixel(0, 0, Rgba([i, 0, 0, 255]));
            history.snapshot(&layers, format!("Stroke {}", i));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(
            history.undo_history(),
            vec!["Stroke 4".to_string(), "Stroke 3".to_string(), "Baseline".to_string()]
        );

        assert!(history.undo(&mut layers));
        assert_eq!(*layers.mask().get_pixel(0, 0), Rgba([3, 0, 0, 255]));
        assert!(history.undo(&mut layers));
        assert_eq!(layers.mask().get_pixel(0, 0)[3], 0);
        assert!(!history.undo(&mut layers));
    }

    #[test]
    fn memory_tracks_entries() {
        let layers = stack();
        let mut history = HistoryManager::new(2);
        history.reset_baseline(&layers);
        let one = history.memory_usage();
        history.snapshot(&layers, "a");
        history.snapshot(&layers, "b");
        assert_eq!(history.len(), 2);
        assert_eq!(history.memory_usage(), one + 8 * 8 * 4 + 1);
    }
}
