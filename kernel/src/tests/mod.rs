//! Kernel Scenario Tests
//!
//! Each test boots a fresh simulated machine and drives several threads
//! through one subsystem.

mod syscall_tests;

use std::sync::Arc;

use spin::Mutex;

use crate::config::KernelConfig;
use crate::kernel::{HaltReport, Kernel};

/// Shared, ordered record of what the threads did.
pub(crate) type Events<T> = Arc<Mutex<Vec<T>>>;

pub(crate) fn events<T>() -> Events<T> {
    Arc::new(Mutex::new(Vec::new()))
}

pub(crate) fn snapshot<T: Clone>(events: &Events<T>) -> Vec<T> {
    events.lock().clone()
}

/// Boot a kernel built from `config` with `body` as its main thread.
pub(crate) fn boot_with<F>(config: KernelConfig, body: F) -> HaltReport
where
    F: FnOnce(&Arc<Kernel>) + Send + 'static,
{
    let kernel = Kernel::new(config).expect("valid config");
    kernel.boot("main", body)
}
