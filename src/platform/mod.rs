//! Platform-specific terminal integrations.

pub mod input_reader;
pub mod panic_hook;
pub mod process_terminal;
pub mod signals;
pub mod stdin_buffer;

pub use input_reader::{InputReader, ReaderSource};
pub use signals::{SignalCloser, SignalKind, SignalStream};
