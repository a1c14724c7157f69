//! Dianti Kernel Library
//!
//! The core of a single-processor teaching kernel running on a simulated
//! machine: cooperative threads under a selectable scheduling policy,
//! blocking synchronization built on interrupt masking, and software-managed
//! address translation with demand paging.
//!
//! # Usage
//!
//! ```no_run
//! use dianti_kernel::{Kernel, KernelConfig, Priority};
//!
//! let kernel = Kernel::new(KernelConfig::default()).expect("valid config");
//! let report = kernel.boot("main", |k| {
//!     k.fork("worker", Priority::DEFAULT, |k| {
//!         log::info!("hello from {}", k.current_name());
//!     })
//!     .expect("thread id available");
//!     k.yield_now();
//! });
//! println!("{:?}", report.reason);
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod error;
pub mod exception;
pub mod fs;
pub mod interrupt;
pub mod kernel;
pub mod machine;
pub mod memory;
pub mod scheduler;
pub mod sync;
pub mod syscall;
pub mod userprog;

#[cfg(test)]
mod tests;

pub use config::KernelConfig;
pub use error::{ConfigError, Fault, SyscallError, ThreadError};
pub use exception::ExceptionType;
pub use fs::{FileSystem, MemFileSystem, OpenFileId};
pub use interrupt::IntLevel;
pub use kernel::{HaltReason, HaltReport, Kernel, Statistics};
pub use memory::{ReplacementStrategy, TranslationEntry, TranslationScheme};
pub use scheduler::{Priority, SchedulingPolicy, ThreadRef, ThreadStatus, Tid};
pub use syscall::SyscallNumber;
pub use userprog::{program, UserContext, UserProgram};
