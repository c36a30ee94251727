// src/history.rs

/// Snapshot-based undo/redo with a bounded number of entries.
///
/// The entry under the cursor is the current state. The first entry is the
/// baseline and can never be undone past.
#[derive(Clone, Debug)]
pub struct UndoHistory<T: Clone> {
    stack: Vec<T>,
    cursor: usize,
    limit: usize,
}

impl<T: Clone> UndoHistory<T> {
    pub fn new(initial: T, limit: usize) -> Self {
        Self {
            stack: vec![initial],
            cursor: 0,
            limit: limit.max(1),
        }
    }

    /// Record a new state. Anything that could have been redone is dropped,
    /// and the oldest snapshots go once the limit is reached.
    pub fn push_snapshot(&mut self, value: T) {
        self.stack.truncate(self.cursor + 1);
        self.stack.push(value);
        if self.stack.len() > self.limit {
            let excess = self.stack.len() - self.limit;
            self.stack.drain(..excess);
        }
        self.cursor = self.stack.len() - 1;
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.stack.len()
    }

    pub fn undo(&mut self) -> Option<T> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        Some(self.stack[self.cursor].clone())
    }

    pub fn redo(&mut self) -> Option<T> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        Some(self.stack[self.cursor].clone())
    }

    pub fn current(&self) -> &T {
        &self.stack[self.cursor]
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn clear_with(&mut self, value: T) {
        self.stack.clear();
        self.stack.push(value);
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::UndoHistory;

    #[test]
    fn test_undo_redo_flow() {
        let mut history = UndoHistory::new(vec![1], 100);
        history.push_snapshot(vec![1, 2]);
        history.push_snapshot(vec![1, 2, 3]);

        assert_eq!(history.undo(), Some(vec![1, 2]));
        assert_eq!(history.undo(), Some(vec![1]));
        assert_eq!(history.undo(), None);

        assert_eq!(history.redo(), Some(vec![1, 2]));
        history.push_snapshot(vec![9]);
        assert_eq!(history.redo(), None);
        assert_eq!(history.current(), &vec![9]);
    }

    #[test]
    fn test_baseline_alone_cannot_be_undone() {
        let mut history = UndoHistory::new("base", 100);
        assert_eq!(history.undo(), None);
        assert_eq!(history.redo(), None);
        assert_eq!(history.current(), &"base");
    }

    #[test]
    fn test_oldest_snapshots_are_dropped_at_the_limit() {
        let mut history = UndoHistory::new(0, 3);
        for n in 1..=5 {
            history.push_snapshot(n);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.undo(), Some(4));
        assert_eq!(history.undo(), Some(3));
        assert_eq!(history.undo(), None);
        assert_eq!(history.redo(), Some(4));
        assert_eq!(history.redo(), Some(5));
    }

    #[test]
    fn test_undo_all_then_redo_all_restores_final_state() {
        let mut history = UndoHistory::new(0, 100);
        for n in 1..=10 {
            history.push_snapshot(n);
        }
        for _ in 0..10 {
            assert!(history.undo().is_some());
        }
        assert_eq!(history.current(), &0);
        for _ in 0..10 {
            assert!(history.redo().is_some());
        }
        assert_eq!(history.current(), &10);
    }
}
