//! Condition variable.

use std::collections::VecDeque;
use std::sync::Arc;

use spin::Mutex;

use super::lock::Lock;
use crate::kernel::Kernel;
use crate::scheduler::ThreadRef;

/// A Mesa-style condition variable.
///
/// Every operation requires the caller to hold the associated lock. A
/// woken thread re-acquires the lock on its own, so the condition it waited
/// for must be re-checked after `wait` returns.
pub struct Condition {
    kernel: Arc<Kernel>,
    name: String,
    queue: Mutex<VecDeque<ThreadRef>>,
}

impl Condition {
    pub fn new(kernel: &Arc<Kernel>, name: &str) -> Self {
        Condition {
            kernel: kernel.clone(),
            name: name.to_string(),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release `lock`, block until signalled, then re-acquire `lock`.
    pub fn wait(&self, lock: &Lock) {
        assert!(
            lock.is_held_by_current_thread(),
            "condition {} waited on without holding {}",
            self.name,
            lock.name()
        );
        {
            let _guard = self.kernel.interrupt().mask();
            self.queue.lock().push_back(self.kernel.current_thread());
            lock.release();
            log::trace!("[SYNC] {} waits on {}", self.kernel.current_name(), self.name);
            self.kernel.sleep();
        }
        lock.acquire();
    }

    /// Wake the oldest waiter.
    pub fn signal(&self, lock: &Lock) {
        assert!(
            lock.is_held_by_current_thread(),
            "condition {} signalled without holding {}",
            self.name,
            lock.name()
        );
        let _guard = self.kernel.interrupt().mask();
        let waiter = self.queue.lock().pop_front();
        if let Some(waiter) = waiter {
            self.kernel.ready_to_run(waiter);
        }
    }

    /// Wake every waiter, oldest first.
    pub fn broadcast(&self, lock: &Lock) {
        assert!(
            lock.is_held_by_current_thread(),
            "condition {} broadcast without holding {}",
            self.name,
            lock.name()
        );
        let _guard = self.kernel.interrupt().mask();
        let waiters: Vec<ThreadRef> = self.queue.lock().drain(..).collect();
        log::trace!("[SYNC] {} broadcast to {} waiters", self.name, waiters.len());
        for waiter in waiters {
            self.kernel.ready_to_run(waiter);
        }
    }

    /// Number of blocked waiters.
    pub fn waiting(&self) -> usize {
        self.queue.lock().len()
    }
}
