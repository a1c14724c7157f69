//! System call handling module.
//!
//! User code traps with the call number in r2 and up to four arguments in
//! r4..r7. The handler's result goes back in r2 (`-1` on any error) and the
//! program counter moves past the trapping instruction.

pub mod handlers;

use core::fmt;

use crate::config::{ARG1_REG, ARG2_REG, ARG3_REG, ARG4_REG, NUM_TOTAL_REGS, RESULT_REG};
pub use crate::error::{SyscallError, SyscallResult};

/// System call numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SyscallNumber {
    /// Stop the machine.
    Halt = 0,
    /// Terminate the calling thread.
    Exit = 1,
    /// Start a registered program in a new thread.
    Exec = 2,
    /// Wait for a thread and collect its exit code.
    Join = 3,
    /// Create a file.
    Create = 4,
    /// Open a file.
    Open = 5,
    /// Read from an open file.
    Read = 6,
    /// Write to an open file.
    Write = 7,
    /// Close an open file.
    Close = 8,
    /// Start a registered entry routine in a new thread.
    Fork = 9,
    /// Yield the processor.
    Yield = 10,
}

impl TryFrom<i32> for SyscallNumber {
    type Error = SyscallError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SyscallNumber::Halt),
            1 => Ok(SyscallNumber::Exit),
            2 => Ok(SyscallNumber::Exec),
            3 => Ok(SyscallNumber::Join),
            4 => Ok(SyscallNumber::Create),
            5 => Ok(SyscallNumber::Open),
            6 => Ok(SyscallNumber::Read),
            7 => Ok(SyscallNumber::Write),
            8 => Ok(SyscallNumber::Close),
            9 => Ok(SyscallNumber::Fork),
            10 => Ok(SyscallNumber::Yield),
            _ => Err(SyscallError::Unknown(value)),
        }
    }
}

impl fmt::Display for SyscallNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// System call context (registers at trap time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallContext {
    /// Raw call number from r2.
    pub number: i32,
    /// r4.
    pub arg1: i32,
    /// r5.
    pub arg2: i32,
    /// r6.
    pub arg3: i32,
    /// r7.
    pub arg4: i32,
}

impl SyscallContext {
    /// Capture the call number and arguments from a register file.
    pub fn from_registers(registers: &[i32; NUM_TOTAL_REGS]) -> Self {
        SyscallContext {
            number: registers[RESULT_REG],
            arg1: registers[ARG1_REG],
            arg2: registers[ARG2_REG],
            arg3: registers[ARG3_REG],
            arg4: registers[ARG4_REG],
        }
    }

    /// Decode the call number.
    pub fn syscall(&self) -> Result<SyscallNumber, SyscallError> {
        SyscallNumber::try_from(self.number)
    }
}
