//! Compensating-action log for multi-step operations.
//!
//! Forward steps register their compensators immediately after succeeding, so
//! a failure later in the sequence can unwind all partial progress in reverse
//! order.

use crate::error::Result;
use log::warn;

type Action<C> = Box<dyn FnOnce(&mut C) -> Result<()> + Send>;

/// A LIFO list of compensating actions, executed against a caller-provided
/// context when a multi-step operation fails midway.
pub struct Rollback<C> {
    actions: Vec<Action<C>>,
}

impl<C> Rollback<C> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Register a compensating action. Call this right after the forward
    /// action it compensates has succeeded.
    pub fn add<F>(&mut self, action: F)
    where
        F: FnOnce(&mut C) -> Result<()> + Send + 'static,
    {
        self.actions.push(Box::new(action));
    }

    /// Run every recorded action in reverse registration order. Individual
    /// failures are logged and swallowed so that the remaining compensators
    /// still run.
    pub fn execute(mut self, ctx: &mut C) {
        while let Some(action) = self.actions.pop() {
            if let Err(e) = action(ctx) {
                warn!("rollback action failed: {}", e);
            }
        }
    }
}

impl<C> Default for Rollback<C> {
    fn default() -> Self {
        Self::new()
    }
}
