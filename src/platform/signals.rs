//! OS signal delivery as a blocking stream that can be closed from another thread.

use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Interrupt,
    Terminate,
    WindowChange,
    Continue,
}

#[cfg(unix)]
impl SignalKind {
    fn raw(self) -> libc::c_int {
        match self {
            SignalKind::Interrupt => libc::SIGINT,
            SignalKind::Terminate => libc::SIGTERM,
            SignalKind::WindowChange => libc::SIGWINCH,
            SignalKind::Continue => libc::SIGCONT,
        }
    }

    fn from_raw(raw: libc::c_int) -> Option<Self> {
        match raw {
            libc::SIGINT => Some(SignalKind::Interrupt),
            libc::SIGTERM => Some(SignalKind::Terminate),
            libc::SIGWINCH => Some(SignalKind::WindowChange),
            libc::SIGCONT => Some(SignalKind::Continue),
            _ => None,
        }
    }
}

/// Closes a [`SignalStream`], ending any blocked iteration.
#[derive(Clone)]
pub struct SignalCloser {
    #[cfg(unix)]
    handle: signal_hook::iterator::Handle,
}

impl SignalCloser {
    pub fn close(&self) {
        #[cfg(unix)]
        self.handle.close();
    }
}

/// Registered signal handlers. Dropping the stream unregisters them.
pub struct SignalStream {
    #[cfg(unix)]
    signals: signal_hook::iterator::Signals,
}

#[cfg(unix)]
impl SignalStream {
    pub fn new(kinds: &[SignalKind]) -> io::Result<Self> {
        let signals = signal_hook::iterator::Signals::new(kinds.iter().map(|kind| kind.raw()))?;
        Ok(Self { signals })
    }

    pub fn closer(&self) -> SignalCloser {
        SignalCloser {
            handle: self.signals.handle(),
        }
    }

    /// Block until one signal arrives. `None` once the stream is closed.
    pub fn next(mut self) -> Option<SignalKind> {
        self.signals.forever().find_map(SignalKind::from_raw)
    }

    /// Deliver signals to `on_signal` until it returns `false` or the stream is closed.
    pub fn for_each<F>(mut self, mut on_signal: F)
    where
        F: FnMut(SignalKind) -> bool,
    {
        for raw in self.signals.forever() {
            let Some(kind) = SignalKind::from_raw(raw) else {
                continue;
            };
            if !on_signal(kind) {
                break;
            }
        }
    }
}

#[cfg(not(unix))]
impl SignalStream {
    pub fn new(_kinds: &[SignalKind]) -> io::Result<Self> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "signal streams are only supported on Unix platforms",
        ))
    }

    pub fn closer(&self) -> SignalCloser {
        SignalCloser {}
    }

    pub fn next(self) -> Option<SignalKind> {
        None
    }

    pub fn for_each<F>(self, _on_signal: F)
    where
        F: FnMut(SignalKind) -> bool,
    {
    }
}
