//! Thread control block.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};

use spin::Mutex;

use super::priority::Priority;
use crate::config::NUM_TOTAL_REGS;
use crate::machine::context::SwitchContext;
use crate::memory::AddressSpace;

/// Thread identifier, drawn from the scheduler's id pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid(pub usize);

impl Tid {
    /// Get the raw id.
    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// In a ready queue.
    Ready,
    /// On the processor.
    Running,
    /// Waiting on a primitive, or created but not yet readied.
    Blocked,
    /// Done. Its id stays taken until it has been joined or its parent
    /// has finished.
    Finished,
}

/// Per-thread accounting.
#[derive(Debug, Default, Clone)]
pub struct ThreadStats {
    /// Ticks charged over the thread's lifetime.
    pub total_ticks: u64,
    /// Number of times the thread was dispatched.
    pub dispatches: u64,
}

/// Shared handle to a thread control block.
pub type ThreadRef = Arc<Mutex<Thread>>;

/// A thread in the system.
pub struct Thread {
    /// Id; `None` before one is assigned and after release.
    tid: Option<Tid>,
    /// Name, for diagnostics only.
    name: String,
    priority: Priority,
    status: ThreadStatus,
    /// Ticks charged since the thread was last dispatched.
    ticks_run: u64,
    /// Feedback level (0 = most urgent queue).
    level: usize,
    /// Threads blocked in `join` on this one.
    waiting_list: VecDeque<ThreadRef>,
    /// Set once, when the thread finishes.
    exit_code: Option<i32>,
    /// Exit code of the thread this one joined.
    join_result: Option<i32>,
    /// Thread that created this one.
    parent: Option<Weak<Mutex<Thread>>>,
    /// Some thread has joined, or is joining, this one.
    joined: bool,
    /// Resources released after finishing; only the id is left.
    reaped: bool,
    /// User address space, while switched out. `None` for kernel threads.
    space: Option<AddressSpace>,
    /// User registers, while switched out.
    user_registers: Option<[i32; NUM_TOTAL_REGS]>,
    /// Host execution context.
    context: Arc<SwitchContext>,
    stats: ThreadStats,
}

impl Thread {
    /// Create a thread. It stays `Blocked` until readied.
    pub fn new(name: impl Into<String>, priority: Priority) -> Self {
        Thread {
            tid: None,
            name: name.into(),
            priority,
            status: ThreadStatus::Blocked,
            ticks_run: 0,
            level: 0,
            waiting_list: VecDeque::new(),
            exit_code: None,
            join_result: None,
            parent: None,
            joined: false,
            reaped: false,
            space: None,
            user_registers: None,
            context: Arc::new(SwitchContext::new()),
            stats: ThreadStats::default(),
        }
    }

    /// Wrap the thread in a shared handle.
    pub fn into_ref(self) -> ThreadRef {
        Arc::new(Mutex::new(self))
    }

    /// Get the thread id.
    pub fn tid(&self) -> Option<Tid> {
        self.tid
    }

    pub(crate) fn set_tid(&mut self, tid: Option<Tid>) {
        self.tid = tid;
    }

    /// Get the thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the thread priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Get the thread status.
    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ThreadStatus) {
        self.status = status;
    }

    pub fn is_finished(&self) -> bool {
        self.status == ThreadStatus::Finished
    }

    /// Get the ticks charged in the current quantum.
    pub fn ticks_run(&self) -> u64 {
        self.ticks_run
    }

    /// Charge ticks to the thread.
    pub fn charge(&mut self, ticks: u64) {
        self.ticks_run += ticks;
        self.stats.total_ticks += ticks;
    }

    /// Start a fresh quantum.
    pub fn reset_ticks(&mut self) {
        self.ticks_run = 0;
    }

    /// Get the feedback level.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn set_level(&mut self, level: usize) {
        self.level = level;
    }

    pub fn waiting_list_mut(&mut self) -> &mut VecDeque<ThreadRef> {
        &mut self.waiting_list
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn set_exit_code(&mut self, code: i32) {
        if self.exit_code.is_none() {
            self.exit_code = Some(code);
        }
    }

    pub fn join_result(&self) -> Option<i32> {
        self.join_result
    }

    pub fn set_join_result(&mut self, code: Option<i32>) {
        self.join_result = code;
    }

    pub(crate) fn set_parent(&mut self, parent: &ThreadRef) {
        self.parent = Some(Arc::downgrade(parent));
    }

    /// The creating thread, if it still exists.
    pub fn parent(&self) -> Option<ThreadRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Whether `parent` created this thread.
    pub fn is_child_of(&self, parent: &ThreadRef) -> bool {
        self.parent
            .as_ref()
            .is_some_and(|p| Weak::as_ptr(p) == Arc::as_ptr(parent))
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    pub(crate) fn mark_joined(&mut self) {
        self.joined = true;
    }

    /// Whether the thread finished and was reaped but still holds its id.
    pub fn is_reaped(&self) -> bool {
        self.reaped
    }

    pub(crate) fn mark_reaped(&mut self) {
        self.reaped = true;
    }

    /// Whether the thread runs user code.
    pub fn is_user(&self) -> bool {
        self.space.is_some() || self.user_registers.is_some()
    }

    pub fn space(&self) -> Option<&AddressSpace> {
        self.space.as_ref()
    }

    pub fn take_space(&mut self) -> Option<AddressSpace> {
        self.space.take()
    }

    pub fn set_space(&mut self, space: Option<AddressSpace>) {
        self.space = space;
    }

    pub fn take_registers(&mut self) -> Option<[i32; NUM_TOTAL_REGS]> {
        self.user_registers.take()
    }

    pub fn set_registers(&mut self, registers: Option<[i32; NUM_TOTAL_REGS]>) {
        self.user_registers = registers;
    }

    /// Get the host context.
    pub fn context(&self) -> Arc<SwitchContext> {
        self.context.clone()
    }

    pub fn stats(&self) -> &ThreadStats {
        &self.stats
    }

    pub(crate) fn record_dispatch(&mut self) {
        self.stats.dispatches += 1;
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("tid", &self.tid)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("status", &self.status)
            .field("ticks_run", &self.ticks_run)
            .field("level", &self.level)
            .field("waiters", &self.waiting_list.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_thread_is_blocked_without_tid() {
        let thread = Thread::new("t", Priority::new(2));
        assert_eq!(thread.status(), ThreadStatus::Blocked);
        assert_eq!(thread.tid(), None);
        assert_eq!(thread.level(), 0);
        assert!(!thread.is_user());
    }

    #[test]
    fn test_exit_code_set_once() {
        let mut thread = Thread::new("t", Priority::DEFAULT);
        thread.set_exit_code(3);
        thread.set_exit_code(4);
        assert_eq!(thread.exit_code(), Some(3));
    }

    #[test]
    fn test_charge_accumulates() {
        let mut thread = Thread::new("t", Priority::DEFAULT);
        thread.charge(5);
        thread.reset_ticks();
        thread.charge(2);
        assert_eq!(thread.ticks_run(), 2);
        assert_eq!(thread.stats().total_ticks, 7);
    }

    #[test]
    fn test_parent_link_does_not_keep_parent_alive() {
        let parent = Thread::new("parent", Priority::DEFAULT).into_ref();
        let other = Thread::new("other", Priority::DEFAULT).into_ref();
        let mut child = Thread::new("child", Priority::DEFAULT);
        child.set_parent(&parent);

        assert!(child.is_child_of(&parent));
        assert!(!child.is_child_of(&other));
        assert!(child.parent().is_some());
        drop(parent);
        assert!(child.parent().is_none());
    }
}
