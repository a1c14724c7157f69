//! Synchronization primitives.
//!
//! All of them are built on interrupt masking and the scheduler's
//! sleep/wake-up: a blocked thread sits in the primitive's own FIFO queue
//! until another thread moves it to the ready queue.

pub mod barrier;
pub mod condition;
pub mod lock;
pub mod rwlock;
pub mod semaphore;

pub use barrier::Barrier;
pub use condition::Condition;
pub use lock::Lock;
pub use rwlock::{CountingRwLock, RwCounters, WriterPriorityRwLock};
pub use semaphore::Semaphore;
