//! Bounded re-entry guard.
//!
//! Each run owns its own guard, so recursion budget never leaks between
//! sessions or between consecutive runs.

use std::collections::HashMap;
use std::sync::Mutex;

/// Default maximum nesting depth per operation id.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Depth counters keyed by operation id.
#[derive(Debug)]
pub struct RecursionGuard {
    max_depth: usize,
    depths: Mutex<HashMap<String, usize>>,
}

impl Default for RecursionGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl RecursionGuard {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            depths: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Increment the counter for `op_id`. Returns `false` once the counter
    /// would exceed the maximum; a denied entry leaves the counter unchanged.
    pub fn enter(&self, op_id: &str) -> bool {
        let mut depths = match self.depths.lock() {
            Ok(d) => d,
            Err(poisoned) => poisoned.into_inner(),
        };
        let depth = depths.entry(op_id.to_string()).or_insert(0);
        if *depth >= self.max_depth {
            return false;
        }
        *depth += 1;
        true
    }

    /// Decrement the counter for `op_id`.
    pub fn exit(&self, op_id: &str) {
        let mut depths = match self.depths.lock() {
            Ok(d) => d,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(depth) = depths.get_mut(op_id) {
            *depth = depth.saturating_sub(1);
            if *depth == 0 {
                depths.remove(op_id);
            }
        }
    }

    pub fn depth(&self, op_id: &str) -> usize {
        match self.depths.lock() {
            Ok(d) => d.get(op_id).copied().unwrap_or(0),
            Err(poisoned) => poisoned.into_inner().get(op_id).copied().unwrap_or(0),
        }
    }

    /// Scoped entry: the returned token calls `exit` on drop.
    pub fn try_enter<'a>(&'a self, op_id: &str) -> Option<GuardToken<'a>> {
        if self.enter(op_id) {
            Some(GuardToken {
                guard: self,
                op_id: op_id.to_string(),
            })
        } else {
            None
        }
    }
}

/// Held while an operation is entered.
#[derive(Debug)]
pub struct GuardToken<'a> {
    guard: &'a RecursionGuard,
    op_id: String,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.guard.exit(&self.op_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourth_nested_enter_is_denied() {
        let guard = RecursionGuard::default();
        assert!(guard.enter("avatar"));
        assert!(guard.enter("avatar"));
        assert!(guard.enter("avatar"));
        assert!(!guard.enter("avatar"));
        assert_eq!(guard.depth("avatar"), 3);
    }

    #[test]
    fn test_exit_restores_budget() {
        let guard = RecursionGuard::new(1);
        assert!(guard.enter("op"));
        assert!(!guard.enter("op"));
        guard.exit("op");
        assert_eq!(guard.depth("op"), 0);
        assert!(guard.enter("op"));
    }

    #[test]
    fn test_keys_are_independent() {
        let guard = RecursionGuard::new(1);
        assert!(guard.enter("a"));
        assert!(guard.enter("b"));
        assert!(!guard.enter("a"));
    }

    #[test]
    fn test_token_exits_on_drop() {
        let guard = RecursionGuard::new(2);
        {
            let _outer = guard.try_enter("op").unwrap();
            let _inner = guard.try_enter("op").unwrap();
            assert!(guard.try_enter("op").is_none());
            assert_eq!(guard.depth("op"), 2);
        }
        assert_eq!(guard.depth("op"), 0);
    }

    #[test]
    fn test_exit_without_enter_is_harmless() {
        let guard = RecursionGuard::default();
        guard.exit("never-entered");
        assert_eq!(guard.depth("never-entered"), 0);
    }
}
