//! The program runtime: event loop, command executor, terminal session, and teardown.

pub(crate) mod bus;
pub(crate) mod context;
pub(crate) mod event_loop;
pub(crate) mod executor;
pub(crate) mod negotiator;
pub(crate) mod program;
pub(crate) mod session;
pub(crate) mod shutdown;

pub use context::Context;
pub use event_loop::Filter;
pub use program::{Program, ProgramHandle, RunOutcome};
