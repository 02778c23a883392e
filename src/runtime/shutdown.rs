//! Exactly-once teardown and panic recovery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, ThreadId};

use crate::error::KillReason;
use crate::platform::panic_hook::{self, PanicReport};
use crate::render::scheduler::ThreadRunner;
use crate::runtime::context::{lock, Latch};
use crate::runtime::program::Shared;

/// Lets the first shutdown run and makes later callers wait for it to finish.
#[derive(Default)]
pub(crate) struct ShutdownGate {
    started: AtomicBool,
    runner: Mutex<Option<ThreadId>>,
    done: Latch,
}

impl ShutdownGate {
    /// Returns `true` if the caller should run the teardown itself.
    fn begin(&self) -> bool {
        if !self.started.swap(true, Ordering::SeqCst) {
            *lock(&self.runner) = Some(thread::current().id());
            return true;
        }
        let runner = *lock(&self.runner);
        if runner != Some(thread::current().id()) {
            self.done.wait();
        }
        false
    }
}

/// Stop every runtime thread and give the terminal back.
///
/// `kill` skips the final flush and the input drain, and leaves `wait()` blocked.
pub(crate) fn shutdown(shared: &Shared, kill: bool) {
    if !shared.gate.begin() {
        return;
    }
    tracing::debug!(kill, "shutting down");

    shared.ctx.cancel();
    shared.handles.wait_all();

    {
        let mut session = shared.session();
        session.cancel_reader(!kill);
        session.stop_renderer(kill);
        if let Err(err) = session.restore_terminal_state() {
            tracing::warn!(error = %err, "failed to restore terminal state");
        }
    }

    if !kill {
        shared.finished.release();
    }
    shared.gate.done.release();
    tracing::debug!("shutdown complete");
}

/// Tear down after a caught panic and print the report on stderr.
pub(crate) fn recover_from_panic(shared: &Shared, report: PanicReport) {
    tracing::error!(panic = %report, "recovered from panic");
    shared.ctx.cancel_with(KillReason::Panic);
    shutdown(shared, true);
    print_report(&report);
}

fn print_report(report: &PanicReport) {
    eprintln!(
        "Caught panic:\n\n{report}\n\nRestoring terminal...\n\n{}",
        report.backtrace
    );
}

/// Runs thread bodies under the program's panic policy.
///
/// Holds the program weakly so detached command threads never keep it alive.
#[derive(Clone)]
pub(crate) struct Recovery {
    shared: Weak<Shared>,
    enabled: bool,
}

impl Recovery {
    pub(crate) fn new(shared: &Arc<Shared>) -> Self {
        Self {
            shared: Arc::downgrade(shared),
            enabled: shared.catch_panics,
        }
    }

    pub(crate) fn run<F: FnOnce()>(&self, body: F) {
        if !self.enabled {
            body();
            return;
        }
        if let Err(report) = panic_hook::catch(body) {
            match self.shared.upgrade() {
                Some(shared) => recover_from_panic(&shared, report),
                None => print_report(&report),
            }
        }
    }

    pub(crate) fn runner(self) -> ThreadRunner {
        Box::new(move |body| self.run(body))
    }

    /// Spawn a detached thread that runs `body` under this policy.
    pub(crate) fn spawn<F>(&self, name: &str, body: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let recovery = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("tape-{name}"))
            .spawn(move || recovery.run(body));
        if let Err(err) = spawned {
            tracing::error!(task = name, error = %err, "failed to spawn thread");
        }
    }
}
