//! Mutual exclusion lock.

use std::sync::Arc;

use spin::Mutex;

use super::semaphore::Semaphore;
use crate::kernel::Kernel;
use crate::scheduler::ThreadRef;

/// A lock built on a binary semaphore, with an owner.
///
/// Not reentrant: the owner calling [`Lock::acquire`] again blocks forever.
/// [`Lock::release`] from any thread other than the owner does nothing.
pub struct Lock {
    kernel: Arc<Kernel>,
    semaphore: Semaphore,
    owner: Mutex<Option<ThreadRef>>,
}

impl Lock {
    pub fn new(kernel: &Arc<Kernel>, name: &str) -> Self {
        Lock {
            kernel: kernel.clone(),
            semaphore: Semaphore::new(kernel, name, 1),
            owner: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        self.semaphore.name()
    }

    pub fn acquire(&self) {
        self.semaphore.p();
        *self.owner.lock() = Some(self.kernel.current_thread());
    }

    pub fn release(&self) {
        let _guard = self.kernel.interrupt().mask();
        if !self.is_held_by_current_thread() {
            log::debug!(
                "[SYNC] {} released {} without holding it, ignored",
                self.kernel.current_name(),
                self.name()
            );
            return;
        }
        *self.owner.lock() = None;
        self.semaphore.v();
    }

    /// Whether the calling thread owns the lock.
    pub fn is_held_by_current_thread(&self) -> bool {
        let current = self.kernel.current_thread();
        let owner = self.owner.lock();
        owner
            .as_ref()
            .is_some_and(|owner| Arc::ptr_eq(owner, &current))
    }

    /// Whether any thread owns the lock.
    pub fn is_held(&self) -> bool {
        self.owner.lock().is_some()
    }

    /// Threads waiting to acquire.
    pub fn waiting(&self) -> usize {
        self.semaphore.waiting()
    }

    /// Run `f` with the lock held.
    pub fn with<R>(&self, f: impl FnOnce() -> R) -> R {
        self.acquire();
        let result = f();
        self.release();
        result
    }
}
