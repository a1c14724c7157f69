//! Context switch implementation.
//!
//! Every simulated thread runs on its own host thread, but only the holder
//! of the processor baton makes progress. A switch hands the baton to the
//! next context and parks the current one until the baton comes back.
//!
//! A context that will never run again is unwound with a `ContextExit`
//! payload, which the spawn wrapper swallows. Any other panic escaping a
//! thread body is reported through the `on_panic` callback.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Who may run on a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Baton {
    /// Waiting for the processor.
    Parked,
    /// Holds the processor.
    Running,
    /// Will never run again; unwind as soon as it wakes.
    Teardown,
}

/// Unwind payload used to retire a context.
#[derive(Debug)]
pub struct ContextExit;

/// Saved execution state of one simulated thread.
#[derive(Debug)]
pub struct SwitchContext {
    state: Mutex<Baton>,
    wakeup: Condvar,
}

impl SwitchContext {
    /// Create a parked context.
    pub fn new() -> Self {
        SwitchContext {
            state: Mutex::new(Baton::Parked),
            wakeup: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Baton> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Give this context the processor.
    pub fn resume(&self) {
        let mut state = self.lock();
        if *state != Baton::Teardown {
            *state = Baton::Running;
        }
        self.wakeup.notify_all();
    }

    /// Give up the processor without blocking yet.
    pub fn park(&self) {
        let mut state = self.lock();
        if *state == Baton::Running {
            *state = Baton::Parked;
        }
    }

    /// Block until this context holds the processor.
    ///
    /// Unwinds with `ContextExit` if the context was torn down meanwhile.
    pub fn wait(&self) {
        let mut state = self.lock();
        loop {
            match *state {
                Baton::Running => return,
                Baton::Teardown => {
                    drop(state);
                    exit_context();
                }
                Baton::Parked => {
                    state = self
                        .wakeup
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// Retire the context. A parked owner unwinds when it wakes.
    pub fn teardown(&self) {
        *self.lock() = Baton::Teardown;
        self.wakeup.notify_all();
    }

    /// Whether the context currently holds the processor.
    pub fn is_running(&self) -> bool {
        *self.lock() == Baton::Running
    }
}

impl Default for SwitchContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Perform a context switch from `current` to `next`.
///
/// Returns once some later switch resumes `current`.
pub fn switch_context(current: &SwitchContext, next: &SwitchContext) {
    current.park();
    next.resume();
    current.wait();
}

/// Abandon the calling context. Never returns.
pub fn exit_context() -> ! {
    panic::resume_unwind(Box::new(ContextExit))
}

/// Start a host thread for `context`.
///
/// The thread waits for its first `resume` before running `entry`.
pub fn spawn<F, P>(
    name: String,
    context: Arc<SwitchContext>,
    entry: F,
    on_panic: P,
) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
    P: FnOnce(String) + Send + 'static,
{
    thread::Builder::new().name(name).spawn(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            context.wait();
            entry();
        }));
        if let Err(payload) = result {
            if !payload.is::<ContextExit>() {
                on_panic(panic_message(payload.as_ref()));
            }
        }
    })
}

/// Extract a printable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_switch_hands_off_processor() {
        let main = Arc::new(SwitchContext::new());
        let worker = Arc::new(SwitchContext::new());
        let steps = Arc::new(AtomicUsize::new(0));

        main.resume();

        let handle = {
            let main = main.clone();
            let worker_ctx = worker.clone();
            let steps = steps.clone();
            spawn(
                "worker".into(),
                worker.clone(),
                move || {
                    assert_eq!(steps.fetch_add(1, Ordering::SeqCst), 0);
                    main.resume();
                    worker_ctx.park();
                    exit_context();
                },
                |msg| panic!("unexpected panic: {msg}"),
            )
            .expect("spawn")
        };

        switch_context(&main, &worker);
        assert_eq!(steps.load(Ordering::SeqCst), 1);
        assert!(main.is_running());
        handle.join().expect("join");
    }

    #[test]
    fn test_teardown_unwinds_parked_context() {
        let ctx = Arc::new(SwitchContext::new());
        let ran = Arc::new(AtomicUsize::new(0));
        let handle = {
            let ran = ran.clone();
            spawn(
                "parked".into(),
                ctx.clone(),
                move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                },
                |msg| panic!("unexpected panic: {msg}"),
            )
            .expect("spawn")
        };

        ctx.teardown();
        handle.join().expect("join");
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panic_is_reported() {
        let ctx = Arc::new(SwitchContext::new());
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = spawn(
            "faulty".into(),
            ctx.clone(),
            || panic!("boom"),
            move |msg| tx.send(msg).expect("send"),
        )
        .expect("spawn");

        ctx.resume();
        handle.join().expect("join");
        assert_eq!(rx.recv().expect("recv"), "boom");
    }
}
