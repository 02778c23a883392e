//! Elm-style terminal program runtime.
//!
//! A [`Program`] owns the terminal for the duration of [`Program::run`]. Messages from
//! input, signals, commands, and [`ProgramHandle`]s are serialized through one event
//! loop that applies them to a [`Model`]; the model's view is rendered at a fixed frame
//! rate.
//!
//! Invariant: single output gate. Terminal writes go through `core::output::SharedOutput`,
//! batched with `OutputGate` where several sequences belong together.
//!
//! # Public API Overview
//! - Implement [`Model`] and start it with [`Program::new`] or [`Program::with_config`].
//! - Return [`Cmd`]s from `init`/`update`; helpers live in [`command`].
//! - Control a running program from other threads with [`ProgramHandle`].
//! - Supply a custom [`Renderer`] with [`Program::with_renderer`].

#![allow(
    clippy::new_without_default,
    clippy::too_many_arguments,
    clippy::type_complexity
)]

pub mod config;
pub mod error;
pub mod logging;

pub mod core;
pub mod platform;
pub mod render;
pub mod runtime;

/// Command constructors (`quit`, `batch`, `sequence`, `tick`, ...).
pub use crate::core::command;

pub use crate::core::color::{ColorProfile, Rgb};
pub use crate::core::command::Cmd;
pub use crate::core::input::{
    InputEvent, KeyCode, KeyEvent, KeyEventKind, Modifiers, MouseAction, MouseButton, MouseEvent,
};
pub use crate::core::keyboard::{kitty, KeyboardEnhancements, KeyboardReport};
pub use crate::core::message::{ExecCallback, ExecCommand, ExecRequest, Msg};
pub use crate::core::model::{Cursor, CursorShape, Model};
pub use crate::core::modes::{Mode, ModeKind, ModeSetting};
pub use crate::core::output::{ClipboardSelection, ColorTarget};

pub use crate::config::{EnvConfig, InputSource, MouseMode, OutputTarget, ProgramConfig};
pub use crate::error::{ConfigError, KillReason, ProgramError};
pub use crate::logging::{log_to_file, LogGuard, LoggingError};
pub use crate::render::{Renderer, StandardRenderer};
pub use crate::runtime::{Context, Filter, Program, ProgramHandle, RunOutcome};
