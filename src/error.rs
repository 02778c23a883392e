//! Error taxonomy for program runs and configuration.

use std::fmt;
use std::io;

use thiserror::Error;

/// Why a program ended through the hard-kill path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    /// `kill()` was called on the program or one of its handles.
    Killed,
    /// The parent context supplied in the configuration was cancelled.
    ContextCancelled,
    /// A panic was recovered in the transition function, a command, or a runtime thread.
    Panic,
}

impl fmt::Display for KillReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillReason::Killed => f.write_str("killed"),
            KillReason::ContextCancelled => f.write_str("context canceled"),
            KillReason::Panic => f.write_str("recovered from panic"),
        }
    }
}

/// Errors returned from `Program::run`.
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("program was killed: {0}")]
    Killed(KillReason),

    #[error("program was interrupted")]
    Interrupted,

    #[error("failed to initialize terminal: {0}")]
    TerminalInit(#[source] io::Error),

    #[error("error reading input: {0}")]
    Input(#[source] io::Error),
}

impl ProgramError {
    pub fn is_killed(&self) -> bool {
        matches!(self, ProgramError::Killed(_))
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, ProgramError::Interrupted)
    }

    pub fn kill_reason(&self) -> Option<KillReason> {
        match self {
            ProgramError::Killed(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Errors returned when validating a `ProgramConfig`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("mouse cell motion and all motion tracking are mutually exclusive")]
    ConflictingMouseModes,

    #[error("initial window size must be non-zero, got {width}x{height}")]
    EmptyWindowSize { width: u16, height: u16 },
}

#[cfg(test)]
mod tests {
    use super::{KillReason, ProgramError};

    #[test]
    fn killed_error_names_its_reason() {
        let err = ProgramError::Killed(KillReason::ContextCancelled);
        assert_eq!(err.to_string(), "program was killed: context canceled");
        assert_eq!(err.kill_reason(), Some(KillReason::ContextCancelled));
        assert!(err.is_killed());
        assert!(!err.is_interrupted());
    }

    #[test]
    fn interrupted_is_distinct_from_killed() {
        let err = ProgramError::Interrupted;
        assert!(err.is_interrupted());
        assert!(err.kill_reason().is_none());
    }
}
