//! The kernel runtime context.
//!
//! A `Kernel` owns every piece of process-wide state: the interrupt mask,
//! the scheduler, the simulated machine, the file system and the program
//! registry. It is created once, shared as `Arc<Kernel>`, and booted once.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, PoisonError};
use std::thread::JoinHandle;

use spin::Mutex;

use crate::config::{KernelConfig, SYSTEM_TICK, USER_TICK};
use crate::error::ConfigError;
use crate::fs::{FileSystem, MemFileSystem};
use crate::interrupt::Interrupt;
use crate::machine::context;
use crate::machine::Machine;
use crate::scheduler::{Priority, Scheduler, Thread, ThreadRef, ThreadStatus, Tid};
use crate::userprog::ProgramRegistry;

/// Why the machine stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// `Halt` system call or an explicit `Kernel::halt`.
    Shutdown,
    /// The last runnable thread finished. `blocked` threads were still
    /// waiting on something that will never happen.
    Idle { blocked: usize },
}

/// Machine-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub total_ticks: u64,
    pub system_ticks: u64,
    pub user_ticks: u64,
    pub context_switches: u64,
    pub tlb_misses: u64,
    pub page_faults: u64,
    pub evictions: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
    pub syscalls: u64,
}

/// Result of [`Kernel::boot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaltReport {
    pub reason: HaltReason,
    pub statistics: Statistics,
}

#[derive(Debug, Clone)]
pub(crate) enum HaltState {
    Running,
    Halted(HaltReason),
    Panicked(String),
}

#[derive(Debug, Default)]
struct Counters {
    total_ticks: AtomicU64,
    system_ticks: AtomicU64,
    user_ticks: AtomicU64,
    context_switches: AtomicU64,
    syscalls: AtomicU64,
}

/// Body of a kernel thread.
pub type ThreadBody = Box<dyn FnOnce(&Arc<Kernel>) + Send + 'static>;

/// The kernel.
pub struct Kernel {
    config: KernelConfig,
    pub(crate) interrupt: Interrupt,
    pub(crate) scheduler: Mutex<Scheduler>,
    /// The thread holding the processor.
    pub(crate) current: Mutex<Option<ThreadRef>>,
    /// A finished thread whose resources are released by the next thread
    /// to run.
    pub(crate) to_be_destroyed: Mutex<Option<ThreadRef>>,
    pub(crate) machine: Mutex<Machine>,
    file_system: Mutex<Box<dyn FileSystem>>,
    programs: ProgramRegistry,
    counters: Counters,
    halt_state: std::sync::Mutex<HaltState>,
    halted: Condvar,
    /// Host threads not yet known to have exited.
    hosts: Mutex<Vec<JoinHandle<()>>>,
    booted: AtomicBool,
}

impl Kernel {
    /// Build a kernel with an in-memory file system.
    pub fn new(config: KernelConfig) -> Result<Arc<Self>, ConfigError> {
        Self::with_file_system(config, Box::new(MemFileSystem::new()))
    }

    /// Build a kernel around a given file system.
    pub fn with_file_system(
        config: KernelConfig,
        file_system: Box<dyn FileSystem>,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        Ok(Arc::new(Kernel {
            interrupt: Interrupt::new(),
            scheduler: Mutex::new(Scheduler::new(
                config.policy,
                config.quantum,
                config.max_threads,
            )),
            current: Mutex::new(None),
            to_be_destroyed: Mutex::new(None),
            machine: Mutex::new(Machine::new(&config)),
            file_system: Mutex::new(file_system),
            programs: ProgramRegistry::new(),
            counters: Counters::default(),
            halt_state: std::sync::Mutex::new(HaltState::Running),
            halted: Condvar::new(),
            hosts: Mutex::new(Vec::new()),
            booted: AtomicBool::new(false),
            config,
        }))
    }

    /// Run the machine. `body` becomes the first kernel thread.
    ///
    /// Returns when the machine halts. A panic in any simulated thread is
    /// re-raised here.
    pub fn boot<F>(self: &Arc<Self>, name: &str, body: F) -> HaltReport
    where
        F: FnOnce(&Arc<Kernel>) + Send + 'static,
    {
        assert!(
            !self.booted.swap(true, Ordering::SeqCst),
            "kernel already booted"
        );

        let main = Thread::new(name, Priority::DEFAULT).into_ref();
        let tid = self.scheduler.lock().acquire_tid(&main);
        assert!(tid.is_some(), "no thread id for {name}");
        main.lock().set_status(ThreadStatus::Running);
        main.lock().record_dispatch();
        *self.current.lock() = Some(main.clone());

        let ctx = main.lock().context();
        let host = self.start_host(name, &main, Box::new(body));
        match host {
            Ok(handle) => self.hosts.lock().push(handle),
            Err(e) => panic!("kernel panic: cannot start {name}: {e}"),
        }

        log::info!(
            "[KERNEL] booting: {} scheduling, quantum {}, {} frames, {:?} translation",
            self.config.policy,
            self.config.quantum,
            self.config.phys_pages,
            self.config.translation
        );
        ctx.resume();

        let state = {
            let mut state = self.halt_state.lock().unwrap_or_else(PoisonError::into_inner);
            while matches!(*state, HaltState::Running) {
                state = self
                    .halted
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            state.clone()
        };

        loop {
            let hosts = std::mem::take(&mut *self.hosts.lock());
            if hosts.is_empty() {
                break;
            }
            for host in hosts {
                // Host threads catch their own panics.
                let _ = host.join();
            }
        }

        match state {
            HaltState::Panicked(msg) => {
                log::error!("[KERNEL] panic: {}", msg);
                panic!("kernel panic: {msg}");
            }
            HaltState::Halted(reason) => {
                let statistics = self.statistics();
                log::info!("[KERNEL] halted: {:?}, {:?}", reason, statistics);
                HaltReport { reason, statistics }
            }
            HaltState::Running => unreachable!("halt wait returned while running"),
        }
    }

    /// Start the host thread backing `thread`.
    pub(crate) fn start_host(
        self: &Arc<Self>,
        name: &str,
        thread: &ThreadRef,
        body: ThreadBody,
    ) -> std::io::Result<JoinHandle<()>> {
        let ctx = thread.lock().context();
        let kernel = self.clone();
        let on_panic = self.clone();
        context::spawn(
            name.to_string(),
            ctx,
            move || kernel.thread_root(body),
            move |msg| on_panic.signal_halt(HaltState::Panicked(msg)),
        )
    }

    /// Track a new host thread, dropping handles of hosts that have exited.
    pub(crate) fn add_host(&self, handle: JoinHandle<()>) {
        let mut hosts = self.hosts.lock();
        hosts.retain(|host| !host.is_finished());
        hosts.push(handle);
    }

    /// Number of host threads that may still be running.
    pub(crate) fn host_count(&self) -> usize {
        let mut hosts = self.hosts.lock();
        hosts.retain(|host| !host.is_finished());
        hosts.len()
    }

    /// Stop the machine. Never returns.
    pub fn halt(&self) -> ! {
        log::info!("[KERNEL] machine halting");
        self.signal_halt(HaltState::Halted(HaltReason::Shutdown));
        context::exit_context()
    }

    /// Stop the machine because nothing is left to run.
    pub(crate) fn halt_idle(&self) -> ! {
        let blocked = self.scheduler.lock().unfinished_count();
        if blocked > 0 {
            log::warn!("[KERNEL] no ready threads, {} still blocked", blocked);
        } else {
            log::info!("[KERNEL] all threads finished");
        }
        self.signal_halt(HaltState::Halted(HaltReason::Idle { blocked }));
        context::exit_context()
    }

    /// Record the halt state and retire every simulated thread.
    pub(crate) fn signal_halt(&self, state: HaltState) {
        {
            let mut current = self.halt_state.lock().unwrap_or_else(PoisonError::into_inner);
            if matches!(*current, HaltState::Running) {
                *current = state;
            }
        }

        let mut threads = self.scheduler.lock().live_threads();
        threads.extend(self.current.lock().clone());
        threads.extend(self.to_be_destroyed.lock().clone());
        for thread in threads {
            let ctx = thread.lock().context();
            ctx.teardown();
        }

        self.halted.notify_all();
    }

    /// Whether the machine has halted.
    pub fn is_halted(&self) -> bool {
        let state = self.halt_state.lock().unwrap_or_else(PoisonError::into_inner);
        !matches!(*state, HaltState::Running)
    }

    /// Advance the clock by one unit of kernel work.
    ///
    /// Charges the current thread and yields if the scheduling policy says
    /// its time is up. No preemption happens while interrupts are masked.
    pub fn tick(&self) {
        self.counters.system_ticks.fetch_add(SYSTEM_TICK, Ordering::Relaxed);
        self.advance_clock(SYSTEM_TICK);
    }

    /// Advance the clock by one user instruction.
    pub fn user_tick(&self) {
        self.counters.user_ticks.fetch_add(USER_TICK, Ordering::Relaxed);
        self.advance_clock(USER_TICK);
    }

    fn advance_clock(&self, ticks: u64) {
        self.counters.total_ticks.fetch_add(ticks, Ordering::Relaxed);
        let current = self.current_thread();
        current.lock().charge(1);

        if self.interrupt.is_masked() {
            return;
        }
        let preempt = {
            let scheduler = self.scheduler.lock();
            let thread = current.lock();
            scheduler.should_preempt(&thread)
        };
        if preempt {
            log::trace!("[SCHED] quantum expired for {}", current.lock().name());
            self.yield_now();
        }
    }

    pub(crate) fn count_context_switch(&self) {
        self.counters.context_switches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_syscall(&self) {
        self.counters.syscalls.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the machine counters.
    pub fn statistics(&self) -> Statistics {
        let mmu = self.machine.lock().mmu().stats();
        Statistics {
            total_ticks: self.counters.total_ticks.load(Ordering::Relaxed),
            system_ticks: self.counters.system_ticks.load(Ordering::Relaxed),
            user_ticks: self.counters.user_ticks.load(Ordering::Relaxed),
            context_switches: self.counters.context_switches.load(Ordering::Relaxed),
            tlb_misses: mmu.tlb_misses,
            page_faults: mmu.page_faults,
            evictions: mmu.evictions,
            disk_reads: mmu.disk_reads,
            disk_writes: mmu.disk_writes,
            syscalls: self.counters.syscalls.load(Ordering::Relaxed),
        }
    }

    /// The thread holding the processor.
    pub fn current_thread(&self) -> ThreadRef {
        let current = self.current.lock().clone();
        match current {
            Some(thread) => thread,
            None => panic!("no current thread: kernel not booted"),
        }
    }

    /// Get the id of the running thread.
    pub fn current_tid(&self) -> Option<Tid> {
        self.current_thread().lock().tid()
    }

    /// Get the name of the running thread.
    pub fn current_name(&self) -> String {
        self.current_thread().lock().name().to_string()
    }

    /// Get the interrupt controller.
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Get the configuration.
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Lock the scheduler for inspection.
    pub fn scheduler(&self) -> spin::MutexGuard<'_, Scheduler> {
        self.scheduler.lock()
    }

    /// Lock the machine for inspection.
    pub fn machine(&self) -> spin::MutexGuard<'_, Machine> {
        self.machine.lock()
    }

    /// Lock the file system.
    pub fn file_system(&self) -> spin::MutexGuard<'_, Box<dyn FileSystem>> {
        self.file_system.lock()
    }

    /// Programs available to `Exec` and `Fork`.
    pub fn programs(&self) -> &ProgramRegistry {
        &self.programs
    }

    /// Get a register of the running user program.
    pub fn read_register(&self, reg: usize) -> i32 {
        self.machine.lock().read_register(reg)
    }

    /// Set a register of the running user program.
    pub fn write_register(&self, reg: usize, value: i32) {
        self.machine.lock().write_register(reg, value);
    }
}
