//! Reusable barrier.

use std::sync::Arc;

use spin::Mutex;

use super::condition::Condition;
use super::lock::Lock;
use crate::kernel::Kernel;

#[derive(Debug, Default)]
struct BarrierState {
    count: usize,
    generation: u64,
}

/// Blocks threads until `parties` of them have arrived.
pub struct Barrier {
    lock: Lock,
    all_arrived: Condition,
    state: Mutex<BarrierState>,
    parties: usize,
}

impl Barrier {
    pub fn new(kernel: &Arc<Kernel>, name: &str, parties: usize) -> Self {
        assert!(parties > 0, "barrier {name} needs at least one party");
        Barrier {
            lock: Lock::new(kernel, name),
            all_arrived: Condition::new(kernel, &format!("{name}.all_arrived")),
            state: Mutex::new(BarrierState::default()),
            parties,
        }
    }

    /// Wait for the other parties.
    ///
    /// Returns `true` in exactly one caller per round, the last to arrive.
    pub fn wait(&self) -> bool {
        self.lock.acquire();
        let (leader, generation) = {
            let mut state = self.state.lock();
            state.count += 1;
            if state.count == self.parties {
                state.count = 0;
                state.generation += 1;
                (true, state.generation)
            } else {
                (false, state.generation)
            }
        };

        if leader {
            log::trace!("[SYNC] barrier {} released round {}", self.lock.name(), generation);
            self.all_arrived.broadcast(&self.lock);
        } else {
            while self.state.lock().generation == generation {
                self.all_arrived.wait(&self.lock);
            }
        }
        self.lock.release();
        leader
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Rounds completed so far.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }
}
