//! System Call Scenario Tests
//!
//! User programs trapping into the kernel: process control, files and the
//! console, and demand paging behind ordinary loads and stores.

use std::sync::Arc;

use super::{events, snapshot};
use crate::config::{KernelConfig, PAGE_SIZE, PC_REG, RESULT_REG};
use crate::exception::ExceptionType;
use crate::fs::{MemFileSystem, CONSOLE_INPUT, CONSOLE_OUTPUT};
use crate::kernel::{HaltReason, HaltReport, Kernel};
use crate::memory::{ReplacementStrategy, TranslationScheme};
use crate::scheduler::Priority;
use crate::userprog::{program, UserProgram};

fn kernel_with(config: KernelConfig) -> (Arc<Kernel>, MemFileSystem) {
    let fs = MemFileSystem::new();
    let kernel = Kernel::with_file_system(config, Box::new(fs.clone())).expect("valid config");
    (kernel, fs)
}

/// Boot with a main thread that runs `user` as a user program and records
/// its exit code.
fn run_user(kernel: &Arc<Kernel>, user: UserProgram) -> (HaltReport, Option<i32>) {
    let code = events();
    let observed = code.clone();
    let report = kernel.boot("main", move |k| {
        let tid = k
            .spawn_user("user", Priority::DEFAULT, user)
            .expect("spawn user program");
        let exit = k.join(tid);
        code.lock().push(exit);
    });
    let exit = snapshot(&observed).first().copied().flatten();
    (report, exit)
}

// ========================================
// Process Control
// ========================================

#[test]
fn test_exec_join_exit() {
    let (kernel, _) = kernel_with(KernelConfig::default());
    let log = events();
    let observed = log.clone();

    kernel.programs().register("child", program(|_| 42));
    let parent = program(move |ctx| {
        ctx.store_str(0, "child");
        let tid = ctx.exec(0);
        let code = ctx.join(tid);
        ctx.store_str(64, "missing");
        let missing = ctx.exec(64);
        let bogus = ctx.join(999);
        log.lock().push((tid >= 0, code, missing, bogus));
        3
    });

    let (report, exit) = run_user(&kernel, parent);
    assert_eq!(snapshot(&observed), [(true, 42, -1, -1)]);
    assert_eq!(exit, Some(3));
    assert_eq!(report.reason, HaltReason::Idle { blocked: 0 });
    assert!(report.statistics.syscalls >= 4);
}

#[test]
fn test_fork_runs_registered_entry() {
    let (kernel, _) = kernel_with(KernelConfig::default());
    let log = events();
    let observed = log.clone();

    kernel.programs().register_entry(0x100, program(|ctx| {
        ctx.store(0, 4, 9);
        ctx.load(0, 4) + 1
    }));
    let parent = program(move |ctx| {
        let tid = ctx.fork(0x100);
        let code = ctx.join(tid);
        let unknown = ctx.fork(0x200);
        log.lock().push((code, unknown));
        0
    });

    run_user(&kernel, parent);
    assert_eq!(snapshot(&observed), [(10, -1)]);
}

#[test]
fn test_user_threads_have_separate_address_spaces() {
    let (kernel, _) = kernel_with(KernelConfig::default());
    let log = events();
    let observed = log.clone();

    kernel.boot("main", move |k| {
        for (name, value) in [("a", 111), ("b", 222)] {
            let log = log.clone();
            let user = program(move |ctx| {
                ctx.store(0, 4, value);
                log.lock().push(format!("{name} stored"));
                ctx.yield_now();
                let seen = ctx.load(0, 4);
                log.lock().push(format!("{name} sees {seen}"));
                0
            });
            k.spawn_user(name, Priority::DEFAULT, user).expect("spawn");
        }
    });

    assert_eq!(
        snapshot(&observed),
        ["a stored", "b stored", "a sees 111", "b sees 222"]
    );
}

#[test]
fn test_unknown_syscall_returns_error_and_advances_pc() {
    let (kernel, _) = kernel_with(KernelConfig::default());
    let log = events();
    let observed = log.clone();

    let user = program(move |ctx| {
        let before = ctx.read_register(PC_REG);
        ctx.kernel().write_register(RESULT_REG, 77);
        ctx.kernel().raise_exception(ExceptionType::Syscall);
        let result = ctx.read_register(RESULT_REG);
        let after = ctx.read_register(PC_REG);
        log.lock().push((result, after - before));
        0
    });

    run_user(&kernel, user);
    assert_eq!(snapshot(&observed), [(-1, 4)]);
}

#[test]
fn test_halt_stops_machine() {
    let (kernel, _) = kernel_with(KernelConfig::default());
    let log = events();
    let observed = log.clone();

    let user = program(move |ctx| {
        log.lock().push("halting");
        ctx.halt();
    });

    let (report, exit) = run_user(&kernel, user);
    assert_eq!(report.reason, HaltReason::Shutdown);
    assert_eq!(exit, None);
    assert_eq!(snapshot(&observed), ["halting"]);
}

// ========================================
// Files and Console
// ========================================

#[test]
fn test_file_create_write_read() {
    let (kernel, fs) = kernel_with(KernelConfig::default());
    let log = events();
    let observed = log.clone();

    let user = program(move |ctx| {
        ctx.store_str(0, "notes");
        let created = ctx.create(0);
        let fd = ctx.open(0);
        ctx.store_bytes(64, b"hello");
        let written = ctx.write(64, 5, fd);
        ctx.close(fd);

        let fd = ctx.open(0);
        let read = ctx.read(128, 8, fd);
        let data = ctx.load_bytes(128, 5);
        ctx.close(fd);

        ctx.store_str(256, "absent");
        let missing = ctx.open(256);
        log.lock().push((created, fd > CONSOLE_OUTPUT, written, read, data, missing));
        0
    });

    let (_, exit) = run_user(&kernel, user);
    assert_eq!(exit, Some(0));
    assert_eq!(
        snapshot(&observed),
        [(0, true, 5, 5, b"hello".to_vec(), -1)]
    );
    assert_eq!(fs.contents("notes").as_deref(), Some(&b"hello"[..]));
    assert_eq!(fs.open_count(), 0);
}

#[test]
fn test_console_echo() {
    let (kernel, fs) = kernel_with(KernelConfig::default());
    fs.push_console_input(b"ping");

    let user = program(|ctx| {
        let n = ctx.read(0, 16, CONSOLE_INPUT);
        ctx.write(0, n, CONSOLE_OUTPUT);
        ctx.write(0, 4, 42)
    });

    let (_, exit) = run_user(&kernel, user);
    assert_eq!(fs.console_output(), b"ping");
    assert_eq!(exit, Some(-1));
}

#[test]
fn test_oversized_transfers_are_bounded() {
    let (kernel, fs) = kernel_with(KernelConfig::default());
    fs.push_console_input(b"hi");
    let log = events();
    let observed = log.clone();

    let user = program(move |ctx| {
        let bad_read = ctx.read(0, i32::MAX, 42);
        let bad_write = ctx.write(0, i32::MAX, 42);
        let read = ctx.read(0, i32::MAX, CONSOLE_INPUT);
        let data = ctx.load_bytes(0, 2);
        log.lock().push((bad_read, bad_write, read, data));
        0
    });

    let (_, exit) = run_user(&kernel, user);
    assert_eq!(exit, Some(0));
    assert_eq!(snapshot(&observed), [(-1, -1, 2, b"hi".to_vec())]);
}

// ========================================
// Demand Paging
// ========================================

fn touch_pages(pages: usize) -> (UserProgram, super::Events<Vec<i32>>) {
    let seen = events();
    let record = seen.clone();
    let user = program(move |ctx| {
        for page in 0..pages {
            ctx.store((page * PAGE_SIZE) as i32, 4, page as i32 * 10 + 1);
        }
        let values = (0..pages)
            .map(|page| ctx.load((page * PAGE_SIZE) as i32, 4))
            .collect();
        record.lock().push(values);
        0
    });
    (user, seen)
}

#[test]
fn test_page_table_eviction_preserves_data() {
    let config = KernelConfig::default()
        .with_phys_pages(2)
        .with_address_space_pages(8);
    let (kernel, _) = kernel_with(config);
    let (user, seen) = touch_pages(6);

    let (report, exit) = run_user(&kernel, user);
    assert_eq!(exit, Some(0));
    assert_eq!(snapshot(&seen), [vec![1, 11, 21, 31, 41, 51]]);

    let stats = report.statistics;
    assert!(stats.page_faults >= 6);
    assert!(stats.evictions > 0);
    assert!(stats.disk_writes > 0);
    assert!(stats.disk_reads > 0);
    assert_eq!(kernel.machine().mmu().frames().free_count(), 2);
    assert!(kernel.machine().mmu().backing_store().is_empty());
}

#[test]
fn test_tlb_scheme_eviction_preserves_data() {
    let config = KernelConfig::default()
        .with_phys_pages(3)
        .with_tlb_size(2)
        .with_address_space_pages(8)
        .with_translation(TranslationScheme::Tlb);
    let (kernel, _) = kernel_with(config);
    let (user, seen) = touch_pages(5);

    let (report, exit) = run_user(&kernel, user);
    assert_eq!(exit, Some(0));
    assert_eq!(snapshot(&seen), [vec![1, 11, 21, 31, 41]]);
    assert!(report.statistics.tlb_misses >= 5);
    assert!(report.statistics.evictions > 0);
}

#[test]
fn test_fixed_replacement_preserves_data() {
    let config = KernelConfig::default()
        .with_phys_pages(2)
        .with_replacement(ReplacementStrategy::Fixed);
    let (kernel, _) = kernel_with(config);
    let (user, seen) = touch_pages(4);

    let (_, exit) = run_user(&kernel, user);
    assert_eq!(exit, Some(0));
    assert_eq!(snapshot(&seen), [vec![1, 11, 21, 31]]);
}

// ========================================
// Faults
// ========================================

#[test]
fn test_read_only_write_terminates_thread() {
    let (kernel, _) = kernel_with(KernelConfig::default());
    let log = events();
    let observed = log.clone();

    let user = program(move |ctx| {
        ctx.store(0, 4, 5);
        if let Some(space) = ctx.kernel().machine().space_mut() {
            space.protect(0);
        }
        log.lock().push("protected");
        ctx.store(0, 4, 6);
        log.lock().push("wrote read-only page");
        0
    });

    let (_, exit) = run_user(&kernel, user);
    assert_eq!(exit, Some(-1));
    assert_eq!(snapshot(&observed), ["protected"]);
}

#[test]
fn test_address_errors_terminate_thread() {
    let (kernel, _) = kernel_with(KernelConfig::default());
    let outside = program(|ctx| ctx.load((PAGE_SIZE * 100) as i32, 4));
    let (_, exit) = run_user(&kernel, outside);
    assert_eq!(exit, Some(-1));

    let (kernel, _) = kernel_with(KernelConfig::default());
    let unaligned = program(|ctx| ctx.load(2, 4));
    let (_, exit) = run_user(&kernel, unaligned);
    assert_eq!(exit, Some(-1));
}

#[test]
fn test_user_instructions_count_user_ticks() {
    let (kernel, _) = kernel_with(KernelConfig::default());
    let user = program(|ctx| {
        for _ in 0..5 {
            ctx.step();
        }
        0
    });

    let (report, _) = run_user(&kernel, user);
    assert_eq!(report.statistics.user_ticks, 5);
}
