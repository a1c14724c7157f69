//! Kernel error types.

/// A failed address translation or memory access.
///
/// The same values are raised as machine exceptions when user code touches
/// memory, so each variant maps onto an `ExceptionType`.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Unaligned access or virtual page outside the address space.
    #[error("address error")]
    AddressError,

    /// Page not resident, or no TLB entry for it.
    #[error("page fault")]
    PageFault,

    /// Write to a read-only page.
    #[error("write to read-only page")]
    ReadOnly,

    /// Translation produced a frame beyond physical memory.
    #[error("bus error")]
    BusError,

    /// No frame could be freed to serve a page fault.
    #[error("out of physical frames")]
    OutOfFrames,
}

/// Thread creation errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ThreadError {
    /// Every thread id is in use.
    #[error("thread id pool exhausted")]
    TidExhausted,

    /// The host could not start a thread to run the body.
    #[error("failed to spawn thread: {0}")]
    SpawnFailed(String),
}

/// System call failures. Reported to user code as `-1` in the result register.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SyscallError {
    #[error("unknown syscall number {0}")]
    Unknown(i32),

    #[error("invalid argument")]
    InvalidArgument,

    #[error("not found")]
    NotFound,

    #[error("file system error: {0}")]
    Fs(String),

    #[error(transparent)]
    Thread(#[from] ThreadError),
}

/// Configuration loading errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(String),

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Result of a system call handler: the value for the result register.
pub type SyscallResult = Result<i32, SyscallError>;
