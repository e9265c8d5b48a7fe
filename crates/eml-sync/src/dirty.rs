use std::cell::Cell;
use std::rc::Rc;

use tracing::debug;

/// Document-level holder of the unsaved-changes flag.
///
/// Shared by handle between the entity trees editing one document. The
/// flag only goes back to clean through [`RootAggregate::reset`].
#[derive(Debug, Default)]
pub struct RootAggregate {
    dirty: Cell<bool>,
    transitions: Cell<u64>,
}

impl RootAggregate {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Set the flag. Returns true only for the clean to dirty transition.
    pub fn mark_dirty(&self) -> bool {
        if self.dirty.replace(true) {
            return false;
        }
        self.transitions.set(self.transitions.get() + 1);
        debug!(transitions = self.transitions.get(), "document marked dirty");
        true
    }

    /// Clear the flag after the document has been saved.
    pub fn reset(&self) {
        if self.dirty.replace(false) {
            debug!("document marked clean");
        }
    }

    /// How many times the flag went from clean to dirty.
    pub fn transitions(&self) -> u64 {
        self.transitions.get()
    }
}
