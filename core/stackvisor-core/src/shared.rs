//! Thread-safe handle around a supervisor.
//!
//! The supervisor itself is not thread-safe; this wrapper is the single
//! logical lock callers share across threads.

use std::sync::{Arc, Mutex};

use crate::services::SystemServices;
use crate::supervisor::StackSupervisor;

pub struct SharedSupervisor<S: SystemServices> {
    inner: Arc<Mutex<StackSupervisor<S>>>,
}

impl<S: SystemServices> Clone for SharedSupervisor<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SystemServices> SharedSupervisor<S> {
    pub fn new(supervisor: StackSupervisor<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(supervisor)),
        }
    }

    /// Runs `f` under the lock. Returns `None` if a previous holder panicked.
    pub fn with<R>(&self, f: impl FnOnce(&mut StackSupervisor<S>) -> R) -> Option<R> {
        match self.inner.lock() {
            Ok(mut guard) => Some(f(&mut guard)),
            Err(_) => {
                tracing::error!("Supervisor lock poisoned");
                None
            }
        }
    }
}
