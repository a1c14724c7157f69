//! Ready queues.
//!
//! A FIFO of ready threads plus the quantum granted to threads taken from it.

use std::collections::VecDeque;

use super::thread::ThreadRef;

/// A FIFO ready queue.
pub struct ReadyQueue {
    /// Queue of ready threads.
    threads: VecDeque<ThreadRef>,
    /// Time quantum in ticks.
    quantum: u64,
}

impl ReadyQueue {
    /// Create a new queue.
    pub fn new(quantum: u64) -> Self {
        ReadyQueue {
            threads: VecDeque::new(),
            quantum,
        }
    }

    /// Add a thread to the back of the queue.
    pub fn enqueue(&mut self, thread: ThreadRef) {
        self.threads.push_back(thread);
    }

    /// Remove and return the thread at the front of the queue.
    pub fn dequeue(&mut self) -> Option<ThreadRef> {
        self.threads.pop_front()
    }

    /// Remove the first thread minimizing `key`; earlier entries win ties.
    pub fn remove_min_by_key<K, F>(&mut self, key: F) -> Option<ThreadRef>
    where
        K: Ord,
        F: Fn(&ThreadRef) -> K,
    {
        let mut best: Option<(usize, K)> = None;
        for (idx, thread) in self.threads.iter().enumerate() {
            let k = key(thread);
            if best.as_ref().map_or(true, |(_, b)| k < *b) {
                best = Some((idx, k));
            }
        }
        let (idx, _) = best?;
        self.threads.remove(idx)
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Get the number of threads in the queue.
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Get the time quantum.
    pub fn quantum(&self) -> u64 {
        self.quantum
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThreadRef> {
        self.threads.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::priority::Priority;
    use crate::scheduler::thread::Thread;

    fn named(name: &str, priority: u8) -> ThreadRef {
        Thread::new(name, Priority::new(priority)).into_ref()
    }

    fn name_of(thread: &ThreadRef) -> String {
        thread.lock().name().to_string()
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = ReadyQueue::new(10);
        queue.enqueue(named("a", 0));
        queue.enqueue(named("b", 0));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dequeue().as_ref().map(name_of).as_deref(), Some("a"));
        assert_eq!(queue.dequeue().as_ref().map(name_of).as_deref(), Some("b"));
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_min_by_key_prefers_earliest() {
        let mut queue = ReadyQueue::new(10);
        queue.enqueue(named("late", 3));
        queue.enqueue(named("first", 1));
        queue.enqueue(named("second", 1));
        let picked = queue
            .remove_min_by_key(|t| t.lock().priority())
            .expect("non-empty");
        assert_eq!(picked.lock().name(), "first");
        assert_eq!(queue.len(), 2);
    }
}
