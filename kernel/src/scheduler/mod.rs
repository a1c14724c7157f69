//! Kernel scheduler module.
//!
//! Ready queues, the thread id arena and policy decisions live in
//! [`Scheduler`]. Dispatch and the thread life cycle need the whole kernel
//! (machine state, interrupt mask) and are implemented on `Kernel` in
//! [`lifecycle`].
//!
//! Every method here must be called with interrupts masked.

pub mod lifecycle;
pub mod policy;
pub mod priority;
pub mod queue;
pub mod thread;

use std::collections::VecDeque;

pub use policy::SchedulingPolicy;
pub use priority::Priority;
pub use queue::ReadyQueue;
pub use thread::{Thread, ThreadRef, ThreadStats, ThreadStatus, Tid};

use crate::config::FEEDBACK_LEVELS;

/// One line of [`Scheduler::ready_snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyEntry {
    pub tid: Option<Tid>,
    pub name: String,
    pub priority: Priority,
    pub level: usize,
}

/// The scheduler implementation.
pub struct Scheduler {
    policy: SchedulingPolicy,
    /// Base quantum `Q`.
    quantum: u64,
    /// One queue, or one per feedback level.
    queues: Vec<ReadyQueue>,
    /// Threads holding an id, indexed by tid. Finished threads stay here
    /// until joined or orphaned.
    threads: Vec<Option<ThreadRef>>,
    /// Ids available for new threads, handed out in FIFO order.
    free_tids: VecDeque<Tid>,
}

impl Scheduler {
    /// Create a scheduler with `max_threads` thread ids.
    pub fn new(policy: SchedulingPolicy, quantum: u64, max_threads: usize) -> Self {
        let queues = (0..policy.queue_count())
            .map(|level| ReadyQueue::new(quantum << level))
            .collect();
        Scheduler {
            policy,
            quantum,
            queues,
            threads: vec![None; max_threads],
            free_tids: (0..max_threads).map(Tid).collect(),
        }
    }

    /// Get the active policy.
    pub fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    /// Get the base quantum.
    pub fn quantum(&self) -> u64 {
        self.quantum
    }

    /// Quantum granted to a thread at feedback `level`.
    pub fn quantum_for(&self, level: usize) -> u64 {
        match self.policy {
            SchedulingPolicy::MultilevelFeedback => {
                self.queues[level.min(FEEDBACK_LEVELS - 1)].quantum()
            }
            _ => self.quantum,
        }
    }

    /// Make a thread ready and queue it.
    ///
    /// Under multilevel feedback a thread that used up its quantum drops one
    /// level first.
    pub fn ready_enqueue(&mut self, thread: ThreadRef) {
        let queue = {
            let mut t = thread.lock();
            t.set_status(ThreadStatus::Ready);
            if self.policy == SchedulingPolicy::MultilevelFeedback {
                let level = t.level();
                if t.ticks_run() >= self.quantum_for(level) {
                    let demoted = (level + 1).min(FEEDBACK_LEVELS - 1);
                    if demoted != level {
                        log::debug!(
                            "[SCHED] {} demoted to level {} after {} ticks",
                            t.name(),
                            demoted,
                            t.ticks_run()
                        );
                    }
                    t.set_level(demoted);
                }
                t.level()
            } else {
                0
            }
        };
        log::trace!("[SCHED] enqueue {} on queue {}", thread.lock().name(), queue);
        self.queues[queue].enqueue(thread);
    }

    /// Remove and return the next thread to run, if any.
    pub fn select_next(&mut self) -> Option<ThreadRef> {
        match self.policy {
            SchedulingPolicy::Priority => {
                self.queues[0].remove_min_by_key(|t| t.lock().priority())
            }
            SchedulingPolicy::RoundRobin => self.queues[0].dequeue(),
            SchedulingPolicy::MultilevelFeedback => self
                .queues
                .iter_mut()
                .find(|queue| !queue.is_empty())
                .and_then(ReadyQueue::dequeue),
        }
    }

    /// Whether `current` should give up the processor now.
    pub fn should_preempt(&self, current: &Thread) -> bool {
        match self.policy {
            SchedulingPolicy::Priority => self.queues[0]
                .iter()
                .any(|t| t.lock().priority().is_higher_than(current.priority())),
            SchedulingPolicy::RoundRobin => current.ticks_run() >= self.quantum,
            SchedulingPolicy::MultilevelFeedback => {
                current.ticks_run() >= self.quantum_for(current.level())
            }
        }
    }

    /// Assign a free id to `thread` and register it as live.
    pub fn acquire_tid(&mut self, thread: &ThreadRef) -> Option<Tid> {
        let tid = self.free_tids.pop_front()?;
        thread.lock().set_tid(Some(tid));
        self.threads[tid.0] = Some(thread.clone());
        Some(tid)
    }

    /// Return `thread`'s id to the pool. No-op if it has none.
    pub fn release_tid(&mut self, thread: &ThreadRef) {
        let tid = {
            let mut t = thread.lock();
            let tid = t.tid();
            t.set_tid(None);
            tid
        };
        if let Some(tid) = tid {
            self.threads[tid.0] = None;
            self.free_tids.push_back(tid);
        }
    }

    /// Find a thread by id. Finished threads still waiting to be joined
    /// are found too.
    pub fn lookup(&self, tid: Tid) -> Option<ThreadRef> {
        self.threads.get(tid.0).cloned().flatten()
    }

    /// Number of ids still available.
    pub fn free_tid_count(&self) -> usize {
        self.free_tids.len()
    }

    /// Number of threads holding an id.
    pub fn live_count(&self) -> usize {
        self.threads.iter().filter(|t| t.is_some()).count()
    }

    /// Number of threads holding an id that have not finished.
    pub fn unfinished_count(&self) -> usize {
        self.threads
            .iter()
            .flatten()
            .filter(|t| !t.lock().is_finished())
            .count()
    }

    /// Release the ids of reaped children of `parent`. Returns how many
    /// were released.
    pub fn release_orphans(&mut self, parent: &ThreadRef) -> usize {
        let orphans: Vec<ThreadRef> = self
            .threads
            .iter()
            .flatten()
            .filter(|t| {
                let t = t.lock();
                t.is_reaped() && t.is_child_of(parent)
            })
            .cloned()
            .collect();
        for orphan in &orphans {
            self.release_tid(orphan);
        }
        orphans.len()
    }

    /// All live threads, in tid order.
    pub fn live_threads(&self) -> Vec<ThreadRef> {
        self.threads.iter().flatten().cloned().collect()
    }

    /// Number of ready threads across all queues.
    pub fn ready_count(&self) -> usize {
        self.queues.iter().map(ReadyQueue::len).sum()
    }

    /// Ready threads in dispatch-queue order, most urgent queue first.
    pub fn ready_snapshot(&self) -> Vec<ReadyEntry> {
        self.queues
            .iter()
            .flat_map(|queue| queue.iter())
            .map(|thread| {
                let t = thread.lock();
                ReadyEntry {
                    tid: t.tid(),
                    name: t.name().to_string(),
                    priority: t.priority(),
                    level: t.level(),
                }
            })
            .collect()
    }

    /// Log the ready list at debug level.
    pub fn log_ready_list(&self) {
        for entry in self.ready_snapshot() {
            log::debug!(
                "[SCHED] ready: {} (tid {:?}, priority {}, level {})",
                entry.name,
                entry.tid,
                entry.priority,
                entry.level
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(name: &str, priority: u8) -> ThreadRef {
        Thread::new(name, Priority::new(priority)).into_ref()
    }

    fn name_of(thread: &ThreadRef) -> String {
        thread.lock().name().to_string()
    }

    fn drain(sched: &mut Scheduler) -> Vec<String> {
        let mut names = Vec::new();
        while let Some(next) = sched.select_next() {
            names.push(name_of(&next));
        }
        names
    }

    #[test]
    fn test_round_robin_is_fifo() {
        let mut sched = Scheduler::new(SchedulingPolicy::RoundRobin, 10, 8);
        for (name, priority) in [("a", 3), ("b", 1), ("c", 2)] {
            sched.ready_enqueue(thread(name, priority));
        }
        assert_eq!(sched.ready_count(), 3);
        assert_eq!(drain(&mut sched), ["a", "b", "c"]);
    }

    #[test]
    fn test_priority_order_with_fifo_ties() {
        let mut sched = Scheduler::new(SchedulingPolicy::Priority, 10, 8);
        for (name, priority) in [("p3", 3), ("p1", 1), ("p2", 2), ("p1b", 1)] {
            sched.ready_enqueue(thread(name, priority));
        }
        assert_eq!(drain(&mut sched), ["p1", "p1b", "p2", "p3"]);
    }

    #[test]
    fn test_priority_preemption_is_strict() {
        let mut sched = Scheduler::new(SchedulingPolicy::Priority, 10, 8);
        let current = Thread::new("current", Priority::new(2));
        sched.ready_enqueue(thread("equal", 2));
        assert!(!sched.should_preempt(&current));
        sched.ready_enqueue(thread("urgent", 1));
        assert!(sched.should_preempt(&current));
    }

    #[test]
    fn test_round_robin_quantum() {
        let sched = Scheduler::new(SchedulingPolicy::RoundRobin, 3, 8);
        let mut current = Thread::new("current", Priority::DEFAULT);
        current.charge(2);
        assert!(!sched.should_preempt(&current));
        current.charge(1);
        assert!(sched.should_preempt(&current));
    }

    #[test]
    fn test_feedback_demotes_on_exhausted_quantum() {
        let mut sched = Scheduler::new(SchedulingPolicy::MultilevelFeedback, 2, 8);
        assert_eq!(
            (sched.quantum_for(0), sched.quantum_for(1), sched.quantum_for(2)),
            (2, 4, 8)
        );

        let hog = thread("hog", 0);
        let polite = thread("polite", 0);
        hog.lock().charge(2);
        polite.lock().charge(1);
        sched.ready_enqueue(hog.clone());
        sched.ready_enqueue(polite.clone());
        assert_eq!(hog.lock().level(), 1);
        assert_eq!(polite.lock().level(), 0);

        // Level 0 drains before level 1.
        assert_eq!(drain(&mut sched), ["polite", "hog"]);

        // Demotion stops at the last level.
        hog.lock().set_level(2);
        hog.lock().charge(100);
        sched.ready_enqueue(hog.clone());
        assert_eq!(hog.lock().level(), 2);
    }

    #[test]
    fn test_tid_pool() {
        let mut sched = Scheduler::new(SchedulingPolicy::RoundRobin, 10, 2);
        let a = thread("a", 0);
        let b = thread("b", 0);
        let c = thread("c", 0);
        assert_eq!(sched.acquire_tid(&a), Some(Tid(0)));
        assert_eq!(sched.acquire_tid(&b), Some(Tid(1)));
        assert_eq!(sched.acquire_tid(&c), None);
        assert_eq!(sched.live_count(), 2);

        let found = sched.lookup(Tid(1)).expect("live");
        assert_eq!(name_of(&found), "b");

        sched.release_tid(&a);
        sched.release_tid(&a);
        assert_eq!(a.lock().tid(), None);
        assert!(sched.lookup(Tid(0)).is_none());
        assert_eq!(sched.acquire_tid(&c), Some(Tid(0)));
        assert_eq!(sched.free_tid_count(), 0);
    }

    #[test]
    fn test_ready_snapshot_lists_queue_order() {
        let mut sched = Scheduler::new(SchedulingPolicy::RoundRobin, 10, 4);
        let a = thread("a", 7);
        sched.acquire_tid(&a);
        sched.ready_enqueue(a);
        sched.ready_enqueue(thread("b", 1));
        let snapshot = sched.ready_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].tid, Some(Tid(0)));
        assert_eq!(snapshot[0].priority, Priority::new(7));
        assert_eq!(snapshot[1].name, "b");
        assert_eq!(snapshot[1].tid, None);
    }

    #[test]
    fn test_release_orphans_frees_reaped_children_only() {
        let mut sched = Scheduler::new(SchedulingPolicy::RoundRobin, 10, 4);
        let parent = thread("parent", 0);
        let done = thread("done", 0);
        let running = thread("running", 0);
        for t in [&parent, &done, &running] {
            sched.acquire_tid(t);
        }
        done.lock().set_parent(&parent);
        running.lock().set_parent(&parent);
        {
            let mut t = done.lock();
            t.set_status(ThreadStatus::Finished);
            t.mark_reaped();
        }
        assert_eq!(sched.unfinished_count(), 2);

        assert_eq!(sched.release_orphans(&parent), 1);
        assert_eq!(done.lock().tid(), None);
        assert_eq!(running.lock().tid(), Some(Tid(2)));
        assert_eq!(sched.live_count(), 2);
    }
}
