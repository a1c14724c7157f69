//! Counting semaphore.

use std::collections::VecDeque;
use std::sync::Arc;

use spin::Mutex;

use crate::kernel::Kernel;
use crate::scheduler::ThreadRef;

struct SemaphoreState {
    value: u32,
    queue: VecDeque<ThreadRef>,
}

/// A counting semaphore with a FIFO wait queue.
///
/// The value never goes negative. `p` blocks while it is zero; `v` always
/// increments it and makes the oldest waiter ready, which then competes
/// for the unit like any other caller of `p`.
pub struct Semaphore {
    kernel: Arc<Kernel>,
    name: String,
    state: Mutex<SemaphoreState>,
}

impl Semaphore {
    pub fn new(kernel: &Arc<Kernel>, name: &str, initial: u32) -> Self {
        Semaphore {
            kernel: kernel.clone(),
            name: name.to_string(),
            state: Mutex::new(SemaphoreState {
                value: initial,
                queue: VecDeque::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait until the value is positive, then decrement it.
    pub fn p(&self) {
        let _guard = self.kernel.interrupt().mask();
        loop {
            let acquired = {
                let mut state = self.state.lock();
                if state.value > 0 {
                    state.value -= 1;
                    true
                } else {
                    state.queue.push_back(self.kernel.current_thread());
                    false
                }
            };
            if acquired {
                return;
            }
            log::trace!("[SYNC] {} blocks on {}", self.kernel.current_name(), self.name);
            self.kernel.sleep();
        }
    }

    /// Increment the value and wake the oldest waiter, if any.
    pub fn v(&self) {
        let _guard = self.kernel.interrupt().mask();
        let waiter = {
            let mut state = self.state.lock();
            state.value += 1;
            state.queue.pop_front()
        };
        if let Some(waiter) = waiter {
            log::trace!("[SYNC] {} wakes {}", self.name, waiter.lock().name());
            self.kernel.ready_to_run(waiter);
        }
    }

    /// Alias for [`Semaphore::p`].
    pub fn wait(&self) {
        self.p();
    }

    /// Alias for [`Semaphore::v`].
    pub fn signal(&self) {
        self.v();
    }

    /// Get the current value.
    pub fn value(&self) -> u32 {
        self.state.lock().value
    }

    /// Number of threads blocked in `p`.
    pub fn waiting(&self) -> usize {
        self.state.lock().queue.len()
    }
}
