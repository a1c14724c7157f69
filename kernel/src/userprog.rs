//! User programs.
//!
//! There is no instruction interpreter: a user program is a host closure
//! that talks to the kernel only the way compiled code would, through
//! memory loads and stores in its own address space and system call traps
//! with arguments in registers. [`UserContext`] provides those stubs.

use std::sync::Arc;

use hashbrown::HashMap;
use spin::Mutex;

use crate::config::{ARG1_REG, ARG2_REG, ARG3_REG, ARG4_REG, RESULT_REG};
use crate::exception::ExceptionType;
use crate::fs::OpenFileId;
use crate::kernel::Kernel;
use crate::syscall::SyscallNumber;

/// A user program. Its return value becomes the thread's exit code.
pub type UserProgram = Arc<dyn Fn(&UserContext) -> i32 + Send + Sync>;

/// Wrap a closure as a [`UserProgram`].
pub fn program<F>(f: F) -> UserProgram
where
    F: Fn(&UserContext) -> i32 + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Programs reachable from `Exec` (by name) and `Fork` (by entry address).
#[derive(Default)]
pub struct ProgramRegistry {
    by_name: Mutex<HashMap<String, UserProgram>>,
    by_entry: Mutex<HashMap<i32, UserProgram>>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a program under an executable name.
    pub fn register(&self, name: &str, program: UserProgram) {
        self.by_name.lock().insert(name.to_string(), program);
    }

    /// Register a routine under a user entry address.
    pub fn register_entry(&self, pc: i32, program: UserProgram) {
        self.by_entry.lock().insert(pc, program);
    }

    /// Look up a program by name.
    pub fn get(&self, name: &str) -> Option<UserProgram> {
        self.by_name.lock().get(name).cloned()
    }

    /// Look up a routine by entry address.
    pub fn entry(&self, pc: i32) -> Option<UserProgram> {
        self.by_entry.lock().get(&pc).cloned()
    }
}

/// The view a running user program has of the machine.
pub struct UserContext {
    kernel: Arc<Kernel>,
}

impl UserContext {
    pub fn new(kernel: Arc<Kernel>) -> Self {
        UserContext { kernel }
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Trap into the kernel with `number` and `args` in the argument
    /// registers, and return r2.
    pub fn syscall(&self, number: SyscallNumber, args: [i32; 4]) -> i32 {
        {
            let mut machine = self.kernel.machine();
            machine.write_register(RESULT_REG, number as i32);
            for (reg, value) in [ARG1_REG, ARG2_REG, ARG3_REG, ARG4_REG].into_iter().zip(args) {
                machine.write_register(reg, value);
            }
        }
        self.kernel.raise_exception(ExceptionType::Syscall);
        self.kernel.read_register(RESULT_REG)
    }

    /// Account for one executed instruction.
    pub fn step(&self) {
        self.kernel.user_tick();
    }

    pub fn halt(&self) -> ! {
        self.syscall(SyscallNumber::Halt, [0; 4]);
        unreachable!("halt returned")
    }

    pub fn exit(&self, code: i32) -> ! {
        self.syscall(SyscallNumber::Exit, [code, 0, 0, 0]);
        unreachable!("exit returned")
    }

    /// Start the program whose name is stored at `name_addr`.
    pub fn exec(&self, name_addr: i32) -> i32 {
        self.syscall(SyscallNumber::Exec, [name_addr, 0, 0, 0])
    }

    /// Start the routine registered at entry address `pc`.
    pub fn fork(&self, pc: i32) -> i32 {
        self.syscall(SyscallNumber::Fork, [pc, 0, 0, 0])
    }

    pub fn yield_now(&self) {
        self.syscall(SyscallNumber::Yield, [0; 4]);
    }

    pub fn join(&self, tid: i32) -> i32 {
        self.syscall(SyscallNumber::Join, [tid, 0, 0, 0])
    }

    pub fn create(&self, name_addr: i32) -> i32 {
        self.syscall(SyscallNumber::Create, [name_addr, 0, 0, 0])
    }

    pub fn open(&self, name_addr: i32) -> OpenFileId {
        self.syscall(SyscallNumber::Open, [name_addr, 0, 0, 0])
    }

    pub fn close(&self, id: OpenFileId) {
        self.syscall(SyscallNumber::Close, [id, 0, 0, 0]);
    }

    pub fn read(&self, buf_addr: i32, size: i32, id: OpenFileId) -> i32 {
        self.syscall(SyscallNumber::Read, [buf_addr, size, id, 0])
    }

    pub fn write(&self, buf_addr: i32, size: i32, id: OpenFileId) -> i32 {
        self.syscall(SyscallNumber::Write, [buf_addr, size, id, 0])
    }

    /// Load `size` bytes from user memory.
    pub fn load(&self, va: i32, size: usize) -> i32 {
        self.kernel.read_user(va, size)
    }

    /// Store `size` bytes to user memory.
    pub fn store(&self, va: i32, size: usize, value: i32) {
        self.kernel.write_user(va, size, value);
    }

    pub fn store_bytes(&self, va: i32, bytes: &[u8]) {
        self.kernel.write_user_bytes(va, bytes);
    }

    pub fn load_bytes(&self, va: i32, len: usize) -> Vec<u8> {
        self.kernel.read_user_bytes(va, len)
    }

    /// Store `s` followed by a NUL terminator.
    pub fn store_str(&self, va: i32, s: &str) {
        self.store_bytes(va, s.as_bytes());
        self.store(va.wrapping_add(s.len() as i32), 1, 0);
    }

    pub fn read_register(&self, reg: usize) -> i32 {
        self.kernel.read_register(reg)
    }
}
