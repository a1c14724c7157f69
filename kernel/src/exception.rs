//! Exception dispatch.
//!
//! Every trap from user mode enters the kernel through
//! [`Kernel::raise_exception`]. System calls are decoded and handled, page
//! faults are resolved by the MMU, and anything else either terminates the
//! offending thread or stops the machine.

use std::sync::Arc;

use crate::config::{BAD_VADDR_REG, MAX_PATH_LEN, RESULT_REG};
use crate::error::{Fault, SyscallError};
use crate::kernel::Kernel;
use crate::memory::TranslationScheme;
use crate::syscall::{handlers, SyscallContext};

/// Kinds of trap raised by the simulated CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionType {
    /// Program executed a system call.
    Syscall,
    /// No valid translation (TLB miss or page not resident).
    PageFault,
    /// Write to a read-only page.
    ReadOnly,
    /// Translation produced an invalid physical address.
    BusError,
    /// Unaligned access or address outside the address space.
    AddressError,
    /// Integer overflow in add or sub.
    Overflow,
    /// Unimplemented or reserved instruction.
    IllegalInstr,
}

impl From<Fault> for ExceptionType {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::AddressError => ExceptionType::AddressError,
            Fault::PageFault | Fault::OutOfFrames => ExceptionType::PageFault,
            Fault::ReadOnly => ExceptionType::ReadOnly,
            Fault::BusError => ExceptionType::BusError,
        }
    }
}

impl Kernel {
    /// Enter the kernel from user mode.
    ///
    /// Returns when the faulting instruction can be resumed (or the
    /// system call completed). Faults that cannot be resolved terminate
    /// the thread with exit code -1.
    pub fn raise_exception(self: &Arc<Self>, which: ExceptionType) {
        match which {
            ExceptionType::Syscall => self.dispatch_syscall(),
            ExceptionType::PageFault => {
                let va = self.read_register(BAD_VADDR_REG);
                if let Err(fault) = self.handle_page_fault(va) {
                    log::warn!(
                        "[EXCEPT] {}: cannot resolve page fault at {:#x}: {}",
                        self.current_name(),
                        va,
                        fault
                    );
                    self.exit(-1);
                }
            }
            ExceptionType::AddressError | ExceptionType::ReadOnly => {
                let va = self.read_register(BAD_VADDR_REG);
                log::warn!(
                    "[EXCEPT] {}: {:?} at {:#x}, terminating",
                    self.current_name(),
                    which,
                    va
                );
                self.exit(-1);
            }
            ExceptionType::BusError | ExceptionType::Overflow | ExceptionType::IllegalInstr => {
                let va = self.read_register(BAD_VADDR_REG);
                log::error!("[EXCEPT] unexpected {:?} at {:#x}", which, va);
                panic!("unexpected user mode exception {which:?} at {va:#x}");
            }
        }
    }

    fn dispatch_syscall(self: &Arc<Self>) {
        let ctx = SyscallContext::from_registers(self.machine.lock().registers());
        self.count_syscall();

        let value = match handlers::handle(self, &ctx) {
            Ok(value) => value,
            Err(err) => {
                log::debug!("[SYSCALL] {} failed: {}", ctx.number, err);
                -1
            }
        };

        {
            let mut machine = self.machine.lock();
            machine.write_register(RESULT_REG, value);
            machine.advance_pc();
        }
        self.user_tick();
    }

    /// Resolve a page fault at `va` in the running address space.
    fn handle_page_fault(&self, va: i32) -> Result<(), Fault> {
        let _guard = self.interrupt.mask();
        let mut machine = self.machine.lock();
        let scheme = machine
            .space()
            .map(|space| space.scheme())
            .ok_or(Fault::AddressError)?;
        match scheme {
            TranslationScheme::PageTable => machine.serve_page_fault(va),
            TranslationScheme::Tlb => match machine.reload_tlb(va) {
                Err(Fault::PageFault) => {
                    machine.serve_page_fault(va)?;
                    machine.reload_tlb(va)
                }
                other => other,
            },
        }
    }

    /// Raise the exception for a failed access and come back for a retry.
    fn fault_on(self: &Arc<Self>, fault: Fault, va: i32) {
        self.write_register(BAD_VADDR_REG, va);
        self.raise_exception(ExceptionType::from(fault));
    }

    /// Read `size` bytes of the running program's memory.
    ///
    /// Resolvable faults are handled transparently. Any other fault
    /// terminates the calling thread.
    pub fn read_user(self: &Arc<Self>, va: i32, size: usize) -> i32 {
        loop {
            let result = self.machine.lock().read_mem(va, size);
            match result {
                Ok(value) => return value,
                Err(fault) => self.fault_on(fault, va),
            }
        }
    }

    /// Write `size` bytes of the running program's memory.
    pub fn write_user(self: &Arc<Self>, va: i32, size: usize, value: i32) {
        loop {
            let result = self.machine.lock().write_mem(va, size, value);
            match result {
                Ok(()) => return,
                Err(fault) => self.fault_on(fault, va),
            }
        }
    }

    /// Copy `len` bytes out of user memory.
    pub fn read_user_bytes(self: &Arc<Self>, va: i32, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| self.read_user(va.wrapping_add(i as i32), 1) as u8)
            .collect()
    }

    /// Copy bytes into user memory.
    pub fn write_user_bytes(self: &Arc<Self>, va: i32, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            self.write_user(va.wrapping_add(i as i32), 1, byte as i32);
        }
    }

    /// Copy a NUL-terminated string out of user memory.
    pub fn read_user_str(self: &Arc<Self>, va: i32) -> Result<String, SyscallError> {
        let mut bytes = Vec::new();
        for i in 0..MAX_PATH_LEN {
            let byte = self.read_user(va.wrapping_add(i as i32), 1) as u8;
            if byte == 0 {
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }
            bytes.push(byte);
        }
        Err(SyscallError::InvalidArgument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_maps_to_exception() {
        assert_eq!(ExceptionType::from(Fault::PageFault), ExceptionType::PageFault);
        assert_eq!(ExceptionType::from(Fault::ReadOnly), ExceptionType::ReadOnly);
        assert_eq!(ExceptionType::from(Fault::BusError), ExceptionType::BusError);
        assert_eq!(
            ExceptionType::from(Fault::AddressError),
            ExceptionType::AddressError
        );
    }
}
