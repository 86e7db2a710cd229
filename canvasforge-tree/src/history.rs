use crate::node::ComponentNode;
use std::collections::VecDeque;

/// Default number of undo steps kept.
pub const DEFAULT_UNDO_LIMIT: usize = 100;

/// Bounded undo/redo stacks of whole-forest states.
#[derive(Debug, Clone)]
pub struct EditHistory {
    undo: VecDeque<Vec<ComponentNode>>,
    redo: Vec<Vec<ComponentNode>>,
    limit: usize,
}

impl Default for EditHistory {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_LIMIT)
    }
}

impl EditHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit,
        }
    }

    /// Record the state that existed before a successful edit.
    /// A new edit invalidates everything that could have been redone.
    pub fn record(&mut self, before: Vec<ComponentNode>) {
        if self.limit == 0 {
            return;
        }
        self.undo.push_back(before);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
        self.redo.clear();
    }

    /// Step back: returns the state to restore, stashing `current` for redo.
    pub fn undo(&mut self, current: Vec<ComponentNode>) -> Option<Vec<ComponentNode>> {
        let previous = self.undo.pop_back()?;
        self.redo.push(current);
        Some(previous)
    }

    /// Step forward again after an undo.
    pub fn redo(&mut self, current: Vec<ComponentNode>) -> Option<Vec<ComponentNode>> {
        let next = self.redo.pop()?;
        self.undo.push_back(current);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
