//! Kernel configuration.
//!
//! Constants here describe the simulated machine: memory geometry, register
//! layout and clock granularity. `KernelConfig` selects the run-time
//! policies (scheduler, translation scheme, replacement) and can be loaded
//! from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::memory::{ReplacementStrategy, TranslationScheme};
use crate::scheduler::SchedulingPolicy;

/// Page size in bytes. Equal to the simulated disk sector size.
pub const PAGE_SIZE: usize = 128;

/// Number of physical page frames.
pub const NUM_PHYS_PAGES: usize = 32;

/// Size of simulated main memory in bytes.
pub const MEMORY_SIZE: usize = NUM_PHYS_PAGES * PAGE_SIZE;

/// Number of TLB slots.
pub const TLB_SIZE: usize = 4;

/// Size of the thread id pool.
pub const MAX_THREADS: usize = 128;

/// Default scheduling quantum in ticks.
pub const DEFAULT_QUANTUM: u64 = 200;

/// Number of ready queues used by the multilevel feedback policy.
pub const FEEDBACK_LEVELS: usize = 3;

/// Default number of virtual pages in a user address space.
pub const DEFAULT_ADDRESS_SPACE_PAGES: usize = 16;

/// Longest path accepted by the file system calls, including the NUL.
pub const MAX_PATH_LEN: usize = 256;

/// Clock advance for one unit of kernel work.
pub const SYSTEM_TICK: u64 = 10;

/// Clock advance for one user instruction.
pub const USER_TICK: u64 = 1;

// Register file of the simulated CPU.

/// Total number of registers, including the special ones below.
pub const NUM_TOTAL_REGS: usize = 40;
/// Syscall code on entry, syscall result on exit.
pub const RESULT_REG: usize = 2;
/// First syscall argument.
pub const ARG1_REG: usize = 4;
/// Second syscall argument.
pub const ARG2_REG: usize = 5;
/// Third syscall argument.
pub const ARG3_REG: usize = 6;
/// Fourth syscall argument.
pub const ARG4_REG: usize = 7;
/// User stack pointer.
pub const STACK_REG: usize = 29;
/// Current program counter.
pub const PC_REG: usize = 34;
/// Next program counter (branch delay).
pub const NEXT_PC_REG: usize = 35;
/// Previous program counter, for debugging.
pub const PREV_PC_REG: usize = 36;
/// Failing virtual address on an exception.
pub const BAD_VADDR_REG: usize = 39;

/// Run-time kernel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Scheduling policy, fixed for the lifetime of the kernel.
    pub policy: SchedulingPolicy,
    /// Base quantum in ticks (`Q`).
    pub quantum: u64,
    /// Size of the thread id pool (`N`).
    pub max_threads: usize,
    /// Number of physical frames.
    pub phys_pages: usize,
    /// Number of TLB slots.
    pub tlb_size: usize,
    /// Translation scheme used by new user address spaces.
    pub translation: TranslationScheme,
    /// Victim selection for TLB and page-table replacement.
    pub replacement: ReplacementStrategy,
    /// Virtual pages per user address space.
    pub address_space_pages: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            policy: SchedulingPolicy::default(),
            quantum: DEFAULT_QUANTUM,
            max_threads: MAX_THREADS,
            phys_pages: NUM_PHYS_PAGES,
            tlb_size: TLB_SIZE,
            translation: TranslationScheme::default(),
            replacement: ReplacementStrategy::default(),
            address_space_pages: DEFAULT_ADDRESS_SPACE_PAGES,
        }
    }
}

impl KernelConfig {
    /// Parse a configuration from a TOML document.
    ///
    /// Missing keys take their default value. The result is validated.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: KernelConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Check that the configuration describes a usable machine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quantum == 0 {
            return Err(ConfigError::Invalid("quantum must be at least one tick".into()));
        }
        if self.max_threads == 0 {
            return Err(ConfigError::Invalid("thread pool must not be empty".into()));
        }
        if self.phys_pages == 0 {
            return Err(ConfigError::Invalid("machine needs at least one frame".into()));
        }
        if self.tlb_size == 0 {
            return Err(ConfigError::Invalid("TLB needs at least one slot".into()));
        }
        if self.address_space_pages == 0 {
            return Err(ConfigError::Invalid("address space needs at least one page".into()));
        }
        Ok(())
    }

    /// Set the scheduling policy.
    pub fn with_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the base quantum.
    pub fn with_quantum(mut self, quantum: u64) -> Self {
        self.quantum = quantum;
        self
    }

    /// Set the thread id pool size.
    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Set the number of physical frames.
    pub fn with_phys_pages(mut self, phys_pages: usize) -> Self {
        self.phys_pages = phys_pages;
        self
    }

    /// Set the number of TLB slots.
    pub fn with_tlb_size(mut self, tlb_size: usize) -> Self {
        self.tlb_size = tlb_size;
        self
    }

    /// Set the translation scheme for user address spaces.
    pub fn with_translation(mut self, translation: TranslationScheme) -> Self {
        self.translation = translation;
        self
    }

    /// Set the replacement strategy.
    pub fn with_replacement(mut self, replacement: ReplacementStrategy) -> Self {
        self.replacement = replacement;
        self
    }

    /// Set the number of virtual pages per user address space.
    pub fn with_address_space_pages(mut self, pages: usize) -> Self {
        self.address_space_pages = pages;
        self
    }
}
