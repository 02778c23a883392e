//! Cancellation, completion latches, and the registry of runtime threads.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::error::KillReason;

/// Never sent; a channel of this type only ever reports disconnection.
pub(crate) enum Never {}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One-shot signal that wakes every waiter, present and future.
pub(crate) struct Latch {
    tx: Mutex<Option<Sender<Never>>>,
    rx: Receiver<Never>,
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

impl Latch {
    pub(crate) fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Returns `true` for the call that released the latch.
    pub(crate) fn release(&self) -> bool {
        lock(&self.tx).take().is_some()
    }

    pub(crate) fn is_released(&self) -> bool {
        lock(&self.tx).is_none()
    }

    pub(crate) fn wait(&self) {
        let _ = self.rx.recv();
    }

    /// Returns `false` on timeout.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        !matches!(self.rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }

    /// Disconnects when the latch is released; for use in `select!`.
    pub(crate) fn receiver(&self) -> &Receiver<Never> {
        &self.rx
    }
}

type CancelHook = Box<dyn FnOnce() + Send>;

struct ContextInner {
    done: Latch,
    reason: Mutex<Option<KillReason>>,
    hooks: Mutex<Vec<CancelHook>>,
}

/// A cancellable context.
///
/// Pass one to [`crate::ProgramConfig::with_context`] to stop a program from outside; the
/// runtime also uses its own root context to unblock every thread it starts.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                done: Latch::new(),
                reason: Mutex::new(None),
                hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn cancel(&self) {
        self.finish();
    }

    /// Cancel and record why. Only the first reason is kept.
    pub(crate) fn cancel_with(&self, reason: KillReason) {
        {
            let mut slot = lock(&self.inner.reason);
            if slot.is_none() && !self.inner.done.is_released() {
                *slot = Some(reason);
            }
        }
        self.finish();
    }

    fn finish(&self) {
        if !self.inner.done.release() {
            return;
        }
        let hooks = std::mem::take(&mut *lock(&self.inner.hooks));
        for hook in hooks {
            hook();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.done.is_released()
    }

    pub(crate) fn reason(&self) -> Option<KillReason> {
        *lock(&self.inner.reason)
    }

    /// Block until cancelled.
    pub fn wait(&self) {
        self.inner.done.wait();
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.inner.done.wait_timeout(timeout)
    }

    pub(crate) fn done(&self) -> &Receiver<Never> {
        self.inner.done.receiver()
    }

    /// Run `hook` once on cancellation, immediately if already cancelled.
    pub(crate) fn on_cancel<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut hooks = lock(&self.inner.hooks);
            if !self.is_cancelled() {
                hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }
}

/// Completion marker held by a running task; dropping it reports completion.
pub(crate) struct TaskDone {
    _tx: Sender<Never>,
}

/// In-flight runtime threads that shutdown waits for.
#[derive(Default)]
pub(crate) struct TaskHandles {
    handles: Mutex<Vec<(&'static str, Receiver<Never>)>>,
}

impl TaskHandles {
    pub(crate) fn register(&self, name: &'static str) -> TaskDone {
        let (tx, rx) = bounded(0);
        lock(&self.handles).push((name, rx));
        TaskDone { _tx: tx }
    }

    /// Spawn a named thread whose completion is tracked.
    pub(crate) fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let done = self.register(name);
        let spawned = thread::Builder::new()
            .name(format!("tape-{name}"))
            .spawn(move || {
                let _done = done;
                task();
            });
        if let Err(err) = spawned {
            tracing::error!(task = name, error = %err, "failed to spawn runtime thread");
        }
    }

    /// Block until every registered task has finished.
    pub(crate) fn wait_all(&self) {
        let handles = std::mem::take(&mut *lock(&self.handles));
        for (name, rx) in handles {
            let _ = rx.recv();
            tracing::trace!(task = name, "task finished");
        }
    }
}
