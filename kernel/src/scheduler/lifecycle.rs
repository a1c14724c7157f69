//! Thread life cycle and dispatch.
//!
//! Creation, yielding, blocking, termination and joining. All of these
//! touch the ready queues and the machine, so they run with interrupts
//! masked.

use std::sync::Arc;

use super::priority::Priority;
use super::thread::{Thread, ThreadRef, ThreadStatus, Tid};
use crate::error::ThreadError;
use crate::interrupt::IntLevel;
use crate::kernel::{Kernel, ThreadBody};
use crate::machine::context;
use crate::memory::AddressSpace;
use crate::userprog::{UserContext, UserProgram};

impl Kernel {
    /// Create a kernel thread running `body` and make it ready.
    ///
    /// The caller keeps the processor; the new thread runs when the
    /// scheduler picks it.
    pub fn fork<F>(self: &Arc<Self>, name: &str, priority: Priority, body: F) -> Result<Tid, ThreadError>
    where
        F: FnOnce(&Arc<Kernel>) + Send + 'static,
    {
        let thread = Thread::new(name, priority).into_ref();
        self.spawn_thread(thread, Box::new(body))
    }

    /// Create a user thread with a fresh address space of the configured
    /// size and make it ready.
    pub fn spawn_user(
        self: &Arc<Self>,
        name: &str,
        priority: Priority,
        program: UserProgram,
    ) -> Result<Tid, ThreadError> {
        self.spawn_user_sized(name, priority, program, self.config().address_space_pages)
    }

    /// Create a user thread whose address space has `pages` pages.
    pub fn spawn_user_sized(
        self: &Arc<Self>,
        name: &str,
        priority: Priority,
        program: UserProgram,
        pages: usize,
    ) -> Result<Tid, ThreadError> {
        let space = AddressSpace::new(pages, self.config().translation);
        let mut thread = Thread::new(name, priority);
        thread.set_registers(Some(space.init_registers()));
        thread.set_space(Some(space));

        self.spawn_thread(
            thread.into_ref(),
            Box::new(move |kernel: &Arc<Kernel>| {
                let ctx = UserContext::new(kernel.clone());
                let code = program(&ctx);
                kernel.exit(code);
            }),
        )
    }

    fn spawn_thread(self: &Arc<Self>, thread: ThreadRef, body: ThreadBody) -> Result<Tid, ThreadError> {
        let _guard = self.interrupt.mask();

        let parent = self.current.lock().clone();
        let name = {
            let mut t = thread.lock();
            if let Some(parent) = &parent {
                t.set_parent(parent);
            }
            t.name().to_string()
        };
        let tid = self.scheduler.lock().acquire_tid(&thread);
        let Some(tid) = tid else {
            log::warn!("[THREAD] cannot create {}: thread id pool exhausted", name);
            return Err(ThreadError::TidExhausted);
        };

        match self.start_host(&format!("{name}#{tid}"), &thread, body) {
            Ok(handle) => self.add_host(handle),
            Err(e) => {
                self.scheduler.lock().release_tid(&thread);
                return Err(ThreadError::SpawnFailed(e.to_string()));
            }
        }

        log::debug!("[THREAD] created {} (tid {})", name, tid);
        self.ready_to_run(thread);
        Ok(tid)
    }

    /// First code run by every thread.
    pub(crate) fn thread_root(self: Arc<Self>, body: ThreadBody) {
        self.resume_current();
        self.interrupt.set_level(IntLevel::On);
        body(&self);
        self.finish();
    }

    /// Give up the processor to the thread the policy picks next.
    ///
    /// The caller competes with the ready threads, so under strict priority
    /// a yield never hands the processor to a less urgent thread. If the
    /// caller is picked again it keeps running with a fresh quantum.
    pub fn yield_now(&self) {
        let _guard = self.interrupt.mask();
        let current = self.current_thread();
        let next = {
            let mut scheduler = self.scheduler.lock();
            scheduler.ready_enqueue(current.clone());
            scheduler.select_next()
        };
        match next {
            Some(next) if !Arc::ptr_eq(&next, &current) => {
                log::trace!("[THREAD] {} yields", current.lock().name());
                self.run(next);
            }
            _ => {
                let mut t = current.lock();
                t.set_status(ThreadStatus::Running);
                t.reset_ticks();
            }
        }
    }

    /// Block the current thread and run another.
    ///
    /// The caller must have masked interrupts and queued the thread
    /// somewhere it will be woken from. A finished thread never returns.
    pub(crate) fn sleep(&self) {
        assert!(
            self.interrupt.is_masked(),
            "sleep called with interrupts enabled"
        );
        let current = self.current_thread();
        let finishing = {
            let mut t = current.lock();
            if !t.is_finished() {
                t.set_status(ThreadStatus::Blocked);
            }
            t.is_finished()
        };

        let next = self.scheduler.lock().select_next();
        match next {
            Some(next) => self.run(next),
            None if finishing => self.halt_idle(),
            None => {
                let name = current.lock().name().to_string();
                panic!("deadlock: {name} blocked with no ready threads");
            }
        }
    }

    /// Terminate the current thread with its recorded exit code (0 if none).
    ///
    /// Joiners are woken with the exit code. Never returns.
    pub fn finish(&self) -> ! {
        self.interrupt.set_level(IntLevel::Off);
        let current = self.current_thread();
        let (name, code, waiters) = {
            let mut t = current.lock();
            t.set_exit_code(0);
            let code = t.exit_code().unwrap_or(0);
            t.set_status(ThreadStatus::Finished);
            let waiters: Vec<ThreadRef> = t.waiting_list_mut().drain(..).collect();
            (t.name().to_string(), code, waiters)
        };
        log::debug!("[THREAD] {} finished with code {}", name, code);

        for waiter in waiters {
            waiter.lock().set_join_result(Some(code));
            self.ready_to_run(waiter);
        }

        self.sleep();
        context::exit_context()
    }

    /// Terminate the current thread with `code`. Never returns.
    pub fn exit(&self, code: i32) -> ! {
        self.current_thread().lock().set_exit_code(code);
        self.finish()
    }

    /// Wait for thread `tid` to finish and return its exit code.
    ///
    /// A thread that already finished can be joined once, as long as its
    /// parent was still running when it finished; joining releases its id.
    /// Returns `None` if `tid` names no such thread, or is the caller.
    pub fn join(&self, tid: Tid) -> Option<i32> {
        let _guard = self.interrupt.mask();
        let current = self.current_thread();
        let target = self.scheduler.lock().lookup(tid)?;
        if Arc::ptr_eq(&target, &current) {
            return None;
        }

        {
            let mut t = target.lock();
            if t.is_finished() {
                if t.is_joined() {
                    return None;
                }
                t.mark_joined();
                let code = t.exit_code();
                let reaped = t.is_reaped();
                drop(t);
                if reaped {
                    self.scheduler.lock().release_tid(&target);
                }
                return code;
            }
            t.mark_joined();
            t.waiting_list_mut().push_back(current.clone());
        }
        log::debug!("[THREAD] {} joins tid {}", current.lock().name(), tid);

        self.sleep();

        let mut t = current.lock();
        let result = t.join_result();
        t.set_join_result(None);
        result
    }

    /// Put a thread on the ready queue.
    pub(crate) fn ready_to_run(&self, thread: ThreadRef) {
        assert!(
            self.interrupt.is_masked(),
            "ready_to_run called with interrupts enabled"
        );
        self.scheduler.lock().ready_enqueue(thread);
    }

    /// Switch the processor to `next`.
    ///
    /// Returns when the calling thread is dispatched again. If the calling
    /// thread has finished, it never returns and `next` releases it.
    fn run(&self, next: ThreadRef) {
        let old = self.current_thread();
        self.save_state(&old);

        let next_ctx = {
            let mut n = next.lock();
            n.set_status(ThreadStatus::Running);
            n.reset_ticks();
            n.record_dispatch();
            n.context()
        };
        let (old_ctx, old_finished) = {
            let o = old.lock();
            log::debug!(
                "[SCHED] switch {} -> {}",
                o.name(),
                next.lock().name()
            );
            (o.context(), o.is_finished())
        };

        if log::log_enabled!(log::Level::Debug) {
            self.scheduler.lock().log_ready_list();
        }

        *self.current.lock() = Some(next);
        self.count_context_switch();

        if old_finished {
            *self.to_be_destroyed.lock() = Some(old);
            next_ctx.resume();
            context::exit_context();
        }
        drop(old);

        context::switch_context(&old_ctx, &next_ctx);
        self.resume_current();
    }

    /// Runs on the thread that just got the processor: release a finished
    /// predecessor, then load this thread's user state.
    pub(crate) fn resume_current(&self) {
        let dead = self.to_be_destroyed.lock().take();
        if let Some(dead) = dead {
            self.destroy(dead);
        }
        let current = self.current_thread();
        self.restore_state(&current);
    }

    /// Release a finished thread's resources.
    ///
    /// Its id is kept while a running parent may still join it. Reaped
    /// children of the thread lose their last possible joiner and are
    /// released with it.
    fn destroy(&self, thread: ThreadRef) {
        let (space, joined, parent) = {
            let mut t = thread.lock();
            t.mark_reaped();
            (t.take_space(), t.is_joined(), t.parent())
        };
        if let Some(space) = space {
            self.machine.lock().mmu_mut().release(space);
        }
        let parent_running = parent
            .as_ref()
            .is_some_and(|p| !p.lock().is_finished());

        let mut scheduler = self.scheduler.lock();
        let orphans = scheduler.release_orphans(&thread);
        if orphans > 0 {
            log::trace!("[THREAD] released {} orphaned children", orphans);
        }
        if !joined && parent_running {
            log::trace!("[THREAD] reaped {}, id kept for join", thread.lock().name());
        } else {
            log::trace!("[THREAD] reaped {}", thread.lock().name());
            scheduler.release_tid(&thread);
        }
    }

    /// Move the machine's user state into the outgoing thread.
    fn save_state(&self, thread: &ThreadRef) {
        let (space, registers) = {
            let mut machine = self.machine.lock();
            let space = machine.take_space();
            let registers = space.as_ref().map(|_| *machine.registers());
            (space, registers)
        };
        if space.is_some() {
            let mut t = thread.lock();
            t.set_space(space);
            t.set_registers(registers);
        }
    }

    /// Load the incoming thread's user state into the machine.
    fn restore_state(&self, thread: &ThreadRef) {
        let (space, registers) = {
            let mut t = thread.lock();
            (t.take_space(), t.take_registers())
        };
        let mut machine = self.machine.lock();
        if let Some(registers) = registers {
            machine.set_registers(registers);
        }
        machine.install_space(space);
    }
}
