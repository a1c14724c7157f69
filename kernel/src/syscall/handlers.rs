//! System call handlers.
//!
//! This module implements the handlers for each system call.

use std::sync::Arc;

use super::{SyscallContext, SyscallError, SyscallNumber, SyscallResult};
use crate::kernel::Kernel;
use crate::scheduler::Tid;

/// Handle a system call.
pub fn handle(kernel: &Arc<Kernel>, ctx: &SyscallContext) -> SyscallResult {
    let syscall = ctx.syscall()?;
    let result = match syscall {
        SyscallNumber::Halt => handle_halt(kernel),
        SyscallNumber::Exit => handle_exit(kernel, ctx),
        SyscallNumber::Exec => handle_exec(kernel, ctx),
        SyscallNumber::Join => handle_join(kernel, ctx),
        SyscallNumber::Create => handle_create(kernel, ctx),
        SyscallNumber::Open => handle_open(kernel, ctx),
        SyscallNumber::Read => handle_read(kernel, ctx),
        SyscallNumber::Write => handle_write(kernel, ctx),
        SyscallNumber::Close => handle_close(kernel, ctx),
        SyscallNumber::Fork => handle_fork(kernel, ctx),
        SyscallNumber::Yield => handle_yield(kernel),
    };

    #[cfg(feature = "trace-syscalls")]
    log::trace!(
        "[SYSCALL] {} {}({}, {}, {}, {}) = {:?}",
        kernel.current_name(),
        syscall,
        ctx.arg1,
        ctx.arg2,
        ctx.arg3,
        ctx.arg4,
        result
    );

    result
}

/// Stop the machine.
fn handle_halt(kernel: &Arc<Kernel>) -> SyscallResult {
    log::info!("[SYSCALL] halt requested by {}", kernel.current_name());
    kernel.halt()
}

/// Terminate the calling thread with the code in r4.
fn handle_exit(kernel: &Arc<Kernel>, ctx: &SyscallContext) -> SyscallResult {
    kernel.exit(ctx.arg1)
}

/// Run the program named by the string at r4 in a new thread.
fn handle_exec(kernel: &Arc<Kernel>, ctx: &SyscallContext) -> SyscallResult {
    let path = kernel.read_user_str(ctx.arg1)?;
    let program = kernel.programs().get(&path).ok_or(SyscallError::NotFound)?;
    let priority = kernel.current_thread().lock().priority();
    let tid = kernel.spawn_user(&path, priority, program)?;
    Ok(tid.as_usize() as i32)
}

/// Run the entry routine registered at address r4 in a new thread whose
/// address space is as large as the caller's.
fn handle_fork(kernel: &Arc<Kernel>, ctx: &SyscallContext) -> SyscallResult {
    let program = kernel
        .programs()
        .entry(ctx.arg1)
        .ok_or(SyscallError::NotFound)?;
    let pages = kernel
        .machine()
        .space()
        .map(|space| space.num_pages())
        .unwrap_or(kernel.config().address_space_pages);
    let (name, priority) = {
        let current = kernel.current_thread();
        let t = current.lock();
        (format!("{}-fork", t.name()), t.priority())
    };
    let tid = kernel.spawn_user_sized(&name, priority, program, pages)?;
    Ok(tid.as_usize() as i32)
}

/// Give up the processor.
fn handle_yield(kernel: &Arc<Kernel>) -> SyscallResult {
    kernel.yield_now();
    Ok(0)
}

/// Wait for thread r4 and return its exit code.
fn handle_join(kernel: &Arc<Kernel>, ctx: &SyscallContext) -> SyscallResult {
    let tid = usize::try_from(ctx.arg1).map_err(|_| SyscallError::InvalidArgument)?;
    kernel.join(Tid(tid)).ok_or(SyscallError::NotFound)
}

/// Create the file named by the string at r4.
fn handle_create(kernel: &Arc<Kernel>, ctx: &SyscallContext) -> SyscallResult {
    let path = kernel.read_user_str(ctx.arg1)?;
    if kernel.file_system().create(&path) {
        Ok(0)
    } else {
        Err(SyscallError::Fs(format!("cannot create {path}")))
    }
}

/// Open the file named by the string at r4.
fn handle_open(kernel: &Arc<Kernel>, ctx: &SyscallContext) -> SyscallResult {
    let path = kernel.read_user_str(ctx.arg1)?;
    let id = kernel.file_system().open(&path);
    id.ok_or(SyscallError::NotFound)
}

/// Close open file r4.
fn handle_close(kernel: &Arc<Kernel>, ctx: &SyscallContext) -> SyscallResult {
    kernel.file_system().close(ctx.arg1);
    Ok(0)
}

/// Check that r6 names an open file and clamp the byte count in r5 to
/// the caller's address space.
fn transfer_size(kernel: &Arc<Kernel>, ctx: &SyscallContext) -> Result<usize, SyscallError> {
    let size = usize::try_from(ctx.arg2).map_err(|_| SyscallError::InvalidArgument)?;
    if !kernel.file_system().is_open(ctx.arg3) {
        return Err(SyscallError::NotFound);
    }
    let limit = kernel.machine().space().map_or(0, |space| space.size());
    Ok(size.min(limit))
}

/// Read up to r5 bytes from file r6 into the buffer at r4.
fn handle_read(kernel: &Arc<Kernel>, ctx: &SyscallContext) -> SyscallResult {
    let size = transfer_size(kernel, ctx)?;
    let mut buf = vec![0u8; size];
    let read = kernel.file_system().read(ctx.arg3, &mut buf);
    let n = read.ok_or(SyscallError::NotFound)?;
    kernel.write_user_bytes(ctx.arg1, &buf[..n]);
    Ok(n as i32)
}

/// Write r5 bytes from the buffer at r4 to file r6.
fn handle_write(kernel: &Arc<Kernel>, ctx: &SyscallContext) -> SyscallResult {
    let size = transfer_size(kernel, ctx)?;
    let buf = kernel.read_user_bytes(ctx.arg1, size);
    let written = kernel.file_system().write(ctx.arg3, &buf);
    written
        .map(|n| n as i32)
        .ok_or(SyscallError::NotFound)
}
