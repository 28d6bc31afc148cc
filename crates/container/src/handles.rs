//! Open-handle accounting shared by the store implementations

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Count of open handles of one store
#[derive(Debug, Clone, Default)]
pub struct HandleCounter(Arc<AtomicUsize>);

impl HandleCounter {
    /// Register a newly opened handle
    pub fn open(&self) -> HandleToken {
        self.0.fetch_add(1, Ordering::SeqCst);
        HandleToken {
            counter: Some(self.clone()),
        }
    }

    /// Handles currently open
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Registration of one open handle, released at most once
#[derive(Debug)]
pub struct HandleToken {
    counter: Option<HandleCounter>,
}

impl HandleToken {
    /// Whether the token has not been released
    pub fn is_open(&self) -> bool {
        self.counter.is_some()
    }

    /// Release the registration; later calls are no-ops returning false
    pub fn release(&mut self) -> bool {
        match self.counter.take() {
            Some(counter) => {
                counter.0.fetch_sub(1, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

impl Drop for HandleToken {
    fn drop(&mut self) {
        self.release();
    }
}
