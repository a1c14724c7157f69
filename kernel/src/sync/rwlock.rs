//! Reader-writer locks.
//!
//! Two designs with different fairness:
//!
//! - [`CountingRwLock`] lets readers in whenever a reader is already
//!   inside. A steady stream of readers starves writers.
//! - [`WriterPriorityRwLock`] stops admitting readers as soon as a writer
//!   waits. A steady stream of writers starves readers.

use std::sync::Arc;

use spin::Mutex;

use super::condition::Condition;
use super::lock::Lock;
use super::semaphore::Semaphore;
use crate::kernel::Kernel;

/// Reader-preference lock: the first reader in takes the write lock for
/// all readers, the last one out gives it back.
pub struct CountingRwLock {
    reader_count: Mutex<u32>,
    count_lock: Lock,
    write_lock: Semaphore,
}

impl CountingRwLock {
    pub fn new(kernel: &Arc<Kernel>, name: &str) -> Self {
        CountingRwLock {
            reader_count: Mutex::new(0),
            count_lock: Lock::new(kernel, &format!("{name}.readers")),
            write_lock: Semaphore::new(kernel, &format!("{name}.write"), 1),
        }
    }

    pub fn start_read(&self) {
        self.count_lock.acquire();
        let first = {
            let mut count = self.reader_count.lock();
            *count += 1;
            *count == 1
        };
        if first {
            self.write_lock.p();
        }
        self.count_lock.release();
    }

    pub fn end_read(&self) {
        self.count_lock.acquire();
        let last = {
            let mut count = self.reader_count.lock();
            *count -= 1;
            *count == 0
        };
        if last {
            self.write_lock.v();
        }
        self.count_lock.release();
    }

    pub fn start_write(&self) {
        self.write_lock.p();
    }

    pub fn end_write(&self) {
        self.write_lock.v();
    }

    /// Run `f` as a reader.
    pub fn read<R>(&self, f: impl FnOnce() -> R) -> R {
        self.start_read();
        let result = f();
        self.end_read();
        result
    }

    /// Run `f` as the only writer.
    pub fn write<R>(&self, f: impl FnOnce() -> R) -> R {
        self.start_write();
        let result = f();
        self.end_write();
        result
    }

    /// Readers currently inside.
    pub fn readers(&self) -> u32 {
        *self.reader_count.lock()
    }
}

/// Occupancy of a [`WriterPriorityRwLock`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RwCounters {
    pub active_readers: u32,
    pub waiting_readers: u32,
    pub active_writers: u32,
    pub waiting_writers: u32,
}

/// Writer-preference lock built from one lock and two conditions.
pub struct WriterPriorityRwLock {
    lock: Lock,
    read_allowed: Condition,
    write_allowed: Condition,
    counters: Mutex<RwCounters>,
}

impl WriterPriorityRwLock {
    pub fn new(kernel: &Arc<Kernel>, name: &str) -> Self {
        WriterPriorityRwLock {
            lock: Lock::new(kernel, name),
            read_allowed: Condition::new(kernel, &format!("{name}.read_allowed")),
            write_allowed: Condition::new(kernel, &format!("{name}.write_allowed")),
            counters: Mutex::new(RwCounters::default()),
        }
    }

    pub fn start_read(&self) {
        self.lock.acquire();
        self.counters.lock().waiting_readers += 1;
        while self.readers_must_wait() {
            self.read_allowed.wait(&self.lock);
        }
        {
            let mut c = self.counters.lock();
            c.waiting_readers -= 1;
            c.active_readers += 1;
        }
        self.lock.release();
    }

    pub fn end_read(&self) {
        self.lock.acquire();
        let wake_writer = {
            let mut c = self.counters.lock();
            c.active_readers -= 1;
            c.active_readers == 0 && c.waiting_writers > 0
        };
        if wake_writer {
            self.write_allowed.signal(&self.lock);
        }
        self.lock.release();
    }

    pub fn start_write(&self) {
        self.lock.acquire();
        self.counters.lock().waiting_writers += 1;
        while self.writers_must_wait() {
            self.write_allowed.wait(&self.lock);
        }
        {
            let mut c = self.counters.lock();
            c.waiting_writers -= 1;
            c.active_writers += 1;
        }
        self.lock.release();
    }

    pub fn end_write(&self) {
        self.lock.acquire();
        let (wake_writer, wake_readers) = {
            let mut c = self.counters.lock();
            c.active_writers -= 1;
            (c.waiting_writers > 0, c.waiting_readers > 0)
        };
        if wake_writer {
            self.write_allowed.signal(&self.lock);
        } else if wake_readers {
            self.read_allowed.broadcast(&self.lock);
        }
        self.lock.release();
    }

    /// Run `f` as a reader.
    pub fn read<R>(&self, f: impl FnOnce() -> R) -> R {
        self.start_read();
        let result = f();
        self.end_read();
        result
    }

    /// Run `f` as the only writer.
    pub fn write<R>(&self, f: impl FnOnce() -> R) -> R {
        self.start_write();
        let result = f();
        self.end_write();
        result
    }

    /// Snapshot of the counters.
    pub fn counters(&self) -> RwCounters {
        *self.counters.lock()
    }

    fn readers_must_wait(&self) -> bool {
        let c = self.counters.lock();
        c.active_writers + c.waiting_writers > 0
    }

    fn writers_must_wait(&self) -> bool {
        let c = self.counters.lock();
        c.active_readers + c.active_writers > 0
    }
}
