//! Panic capture for runtime-owned threads.
//!
//! While at least one [`CaptureHookGuard`] is alive, a process panic hook is
//! installed that records panics raised inside [`catch`] instead of printing them.
//! Panics anywhere else go to whatever hook was installed before.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe, PanicHookInfo};
use std::sync::{Arc, Mutex};

type PanicHookFn = dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static;

#[derive(Debug, Clone)]
pub struct PanicReport {
    pub message: String,
    pub location: Option<String>,
    pub backtrace: String,
}

impl PanicReport {
    fn from_hook(info: &PanicHookInfo<'_>) -> Self {
        Self {
            message: payload_message(info.payload()),
            location: info
                .location()
                .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column())),
            backtrace: Backtrace::force_capture().to_string(),
        }
    }

    fn from_payload(payload: &(dyn Any + Send)) -> Self {
        Self {
            message: payload_message(payload),
            location: None,
            backtrace: String::new(),
        }
    }
}

impl fmt::Display for PanicReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} at {location}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

#[derive(Default)]
struct CaptureState {
    depth: usize,
    report: Option<PanicReport>,
}

thread_local! {
    static CAPTURE: RefCell<CaptureState> = RefCell::new(CaptureState::default());
}

/// Returns `true` if the panic was recorded for an enclosing [`catch`].
fn capture(info: &PanicHookInfo<'_>) -> bool {
    CAPTURE
        .try_with(|state| {
            let Ok(mut state) = state.try_borrow_mut() else {
                return false;
            };
            if state.depth == 0 {
                return false;
            }
            state.report = Some(PanicReport::from_hook(info));
            true
        })
        .unwrap_or(false)
}

/// Run `f`, turning a panic into a [`PanicReport`].
pub fn catch<R, F>(f: F) -> Result<R, PanicReport>
where
    F: FnOnce() -> R,
{
    CAPTURE.with(|state| state.borrow_mut().depth += 1);
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    let report = CAPTURE.with(|state| {
        let mut state = state.borrow_mut();
        state.depth -= 1;
        state.report.take()
    });
    result.map_err(|payload| report.unwrap_or_else(|| PanicReport::from_payload(payload.as_ref())))
}

struct HookState {
    guards: usize,
    /// Address of the installed capture hook, used only for identity checks.
    installed: Option<usize>,
    previous: Option<Arc<Box<PanicHookFn>>>,
}

static HOOK_STATE: Mutex<HookState> = Mutex::new(HookState {
    guards: 0,
    installed: None,
    previous: None,
});

fn hook_id(hook: &PanicHookFn) -> usize {
    (hook as *const PanicHookFn).cast::<()>() as usize
}

fn lock_state() -> std::sync::MutexGuard<'static, HookState> {
    match HOOK_STATE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Keeps the capture hook installed. The previous hook comes back when the last guard drops.
#[must_use]
pub struct CaptureHookGuard {
    _private: (),
}

pub fn install() -> CaptureHookGuard {
    let mut state = lock_state();
    state.guards += 1;

    let current = panic::take_hook();
    if state.installed == Some(hook_id(current.as_ref())) {
        panic::set_hook(current);
    } else {
        let previous = Arc::new(current);
        let delegate = Arc::clone(&previous);
        let hook: Box<PanicHookFn> = Box::new(move |info| {
            if !capture(info) {
                (delegate)(info);
            }
        });
        state.installed = Some(hook_id(hook.as_ref()));
        state.previous = Some(previous);
        panic::set_hook(hook);
    }

    CaptureHookGuard { _private: () }
}

impl Drop for CaptureHookGuard {
    fn drop(&mut self) {
        let mut state = lock_state();
        state.guards = state.guards.saturating_sub(1);
        if state.guards > 0 {
            return;
        }

        let current = panic::take_hook();
        let ours = state.installed.take() == Some(hook_id(current.as_ref()));
        let previous = state.previous.take();
        if !ours {
            // Someone installed a newer hook; leave it in place.
            panic::set_hook(current);
            return;
        }
        drop(current);
        match previous.map(Arc::try_unwrap) {
            Some(Ok(previous)) => panic::set_hook(previous),
            Some(Err(shared)) => panic::set_hook(Box::new(move |info| (shared)(info))),
            None => {}
        }
    }
}
