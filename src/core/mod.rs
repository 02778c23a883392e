//! Core data model: messages, commands, the model contract, and terminal protocol values.

pub mod color;
pub mod command;
pub mod input;
pub mod keyboard;
pub mod message;
pub mod model;
pub mod modes;
pub mod output;
