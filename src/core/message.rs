//! Messages flowing through the program's message bus.

use std::any::Any;
use std::fmt;
use std::io;
use std::process::Command;

use crate::core::color::{ColorProfile, Rgb};
use crate::core::command::Cmd;
use crate::core::input::InputEvent;
use crate::core::keyboard::{KeyboardEnhancements, KeyboardReport};
use crate::core::modes::{Mode, ModeSetting};
use crate::core::output::{ClipboardSelection, ColorTarget};

/// A message delivered to the event loop.
///
/// Control and report variants are interpreted by the runtime before (or instead of)
/// reaching the model. Application data travels in [`Msg::Custom`].
pub enum Msg {
    /// Graceful exit.
    Quit,
    /// Exit with `ProgramError::Interrupted` (SIGINT or ctrl+c handling in the model).
    Interrupt,
    /// Release the terminal and stop the process until it is continued.
    Suspend,
    /// Sent after a suspended program is continued.
    Resume,

    WindowSize { width: u16, height: u16 },
    RequestWindowSize,
    ClearScreen,
    Repaint,

    EnableMode(Mode),
    DisableMode(Mode),
    RequestMode(Mode),
    ModeReport { mode: Mode, setting: ModeSetting },

    EnableKeyboardEnhancements(KeyboardEnhancements),
    DisableKeyboardEnhancements,
    /// One decoded protocol response. The runtime folds it into the active set.
    KeyboardReport(KeyboardReport),
    /// The active enhancement set after negotiation or a report.
    KeyboardEnhancements(KeyboardEnhancements),

    SetWindowTitle(String),
    /// Print a line above the rendered frame.
    Println(String),
    /// Write bytes to the terminal verbatim.
    Raw(String),

    SetClipboard { selection: ClipboardSelection, content: String },
    ReadClipboard(ClipboardSelection),
    Clipboard { selection: ClipboardSelection, content: String },

    /// `None` resets the color to the terminal default.
    SetColor { target: ColorTarget, color: Option<Rgb> },
    RequestColor(ColorTarget),
    Color { target: ColorTarget, color: Rgb },

    RequestCursorPosition,
    CursorPosition { x: u16, y: u16 },
    RequestTerminalVersion,
    TerminalVersion(String),
    RequestCapability(String),
    Capability { name: String, value: Option<String> },

    ColorProfile(ColorProfile),
    Env(Vec<(String, String)>),

    /// Run every command concurrently. Never reaches the model.
    Batch(Vec<Cmd>),
    /// Run commands one after another. The model sees it with the commands already taken.
    Sequence(Vec<Cmd>),
    /// Run an external process with the terminal released. The model sees it once the
    /// process has finished, with the request spent.
    Exec(ExecRequest),

    Input(InputEvent),
    Custom(Box<dyn Any + Send>),
}

impl Msg {
    pub fn custom<T: Any + Send>(value: T) -> Self {
        Msg::Custom(Box::new(value))
    }

    pub fn is<T: Any>(&self) -> bool {
        matches!(self, Msg::Custom(value) if value.is::<T>())
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Msg::Custom(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Take the custom payload out, or give the message back unchanged.
    pub fn downcast<T: Any>(self) -> Result<T, Msg> {
        match self {
            Msg::Custom(value) => value.downcast::<T>().map(|value| *value).map_err(Msg::Custom),
            other => Err(other),
        }
    }

    pub fn as_input(&self) -> Option<&InputEvent> {
        match self {
            Msg::Input(event) => Some(event),
            _ => None,
        }
    }
}

impl fmt::Debug for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Msg::Quit => f.write_str("Quit"),
            Msg::Interrupt => f.write_str("Interrupt"),
            Msg::Suspend => f.write_str("Suspend"),
            Msg::Resume => f.write_str("Resume"),
            Msg::WindowSize { width, height } => f
                .debug_struct("WindowSize")
                .field("width", width)
                .field("height", height)
                .finish(),
            Msg::RequestWindowSize => f.write_str("RequestWindowSize"),
            Msg::ClearScreen => f.write_str("ClearScreen"),
            Msg::Repaint => f.write_str("Repaint"),
            Msg::EnableMode(mode) => f.debug_tuple("EnableMode").field(mode).finish(),
            Msg::DisableMode(mode) => f.debug_tuple("DisableMode").field(mode).finish(),
            Msg::RequestMode(mode) => f.debug_tuple("RequestMode").field(mode).finish(),
            Msg::ModeReport { mode, setting } => f
                .debug_struct("ModeReport")
                .field("mode", mode)
                .field("setting", setting)
                .finish(),
            Msg::EnableKeyboardEnhancements(enh) => f
                .debug_tuple("EnableKeyboardEnhancements")
                .field(enh)
                .finish(),
            Msg::DisableKeyboardEnhancements => f.write_str("DisableKeyboardEnhancements"),
            Msg::KeyboardReport(report) => f.debug_tuple("KeyboardReport").field(report).finish(),
            Msg::KeyboardEnhancements(enh) => {
                f.debug_tuple("KeyboardEnhancements").field(enh).finish()
            }
            Msg::SetWindowTitle(title) => f.debug_tuple("SetWindowTitle").field(title).finish(),
            Msg::Println(line) => f.debug_tuple("Println").field(line).finish(),
            Msg::Raw(data) => f.debug_tuple("Raw").field(data).finish(),
            Msg::SetClipboard { selection, content } => f
                .debug_struct("SetClipboard")
                .field("selection", selection)
                .field("content", content)
                .finish(),
            Msg::ReadClipboard(selection) => {
                f.debug_tuple("ReadClipboard").field(selection).finish()
            }
            Msg::Clipboard { selection, content } => f
                .debug_struct("Clipboard")
                .field("selection", selection)
                .field("content", content)
                .finish(),
            Msg::SetColor { target, color } => f
                .debug_struct("SetColor")
                .field("target", target)
                .field("color", color)
                .finish(),
            Msg::RequestColor(target) => f.debug_tuple("RequestColor").field(target).finish(),
            Msg::Color { target, color } => f
                .debug_struct("Color")
                .field("target", target)
                .field("color", color)
                .finish(),
            Msg::RequestCursorPosition => f.write_str("RequestCursorPosition"),
            Msg::CursorPosition { x, y } => f
                .debug_struct("CursorPosition")
                .field("x", x)
                .field("y", y)
                .finish(),
            Msg::RequestTerminalVersion => f.write_str("RequestTerminalVersion"),
            Msg::TerminalVersion(version) => {
                f.debug_tuple("TerminalVersion").field(version).finish()
            }
            Msg::RequestCapability(name) => f.debug_tuple("RequestCapability").field(name).finish(),
            Msg::Capability { name, value } => f
                .debug_struct("Capability")
                .field("name", name)
                .field("value", value)
                .finish(),
            Msg::ColorProfile(profile) => f.debug_tuple("ColorProfile").field(profile).finish(),
            Msg::Env(environ) => f.debug_tuple("Env").field(&environ.len()).finish(),
            Msg::Batch(cmds) => f.debug_tuple("Batch").field(&cmds.len()).finish(),
            Msg::Sequence(cmds) => f.debug_tuple("Sequence").field(&cmds.len()).finish(),
            Msg::Exec(request) if request.is_spent() => f.write_str("Exec(spent)"),
            Msg::Exec(_) => f.write_str("Exec"),
            Msg::Input(event) => f.debug_tuple("Input").field(event).finish(),
            Msg::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A process the runtime runs while the terminal is released.
pub trait ExecCommand: Send {
    fn run(&mut self) -> io::Result<()>;
}

impl ExecCommand for Command {
    fn run(&mut self) -> io::Result<()> {
        let status = self.status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("process exited with {status}")))
        }
    }
}

pub type ExecCallback = Box<dyn FnOnce(io::Result<()>) -> Option<Msg> + Send>;

pub struct ExecRequest {
    command: Option<Box<dyn ExecCommand>>,
    callback: Option<ExecCallback>,
}

impl ExecRequest {
    pub fn new(command: impl ExecCommand + 'static) -> Self {
        Self {
            command: Some(Box::new(command)),
            callback: None,
        }
    }

    /// Whether the runtime has already run this request.
    pub fn is_spent(&self) -> bool {
        self.command.is_none()
    }

    /// Take the process and its callback, leaving the request spent.
    pub(crate) fn take(&mut self) -> Option<(Box<dyn ExecCommand>, Option<ExecCallback>)> {
        let command = self.command.take()?;
        Some((command, self.callback.take()))
    }

    /// Message produced from the process result once the terminal is restored.
    pub fn on_exit<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(io::Result<()>) -> Option<Msg> + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{ExecRequest, Msg};

    #[derive(Debug, PartialEq)]
    struct Tick(u32);

    #[test]
    fn custom_payloads_downcast_by_type() {
        let msg = Msg::custom(Tick(7));
        assert!(msg.is::<Tick>());
        assert!(!msg.is::<u32>());
        assert_eq!(msg.downcast_ref::<Tick>(), Some(&Tick(7)));
        assert_eq!(msg.downcast::<Tick>().ok(), Some(Tick(7)));
    }

    #[test]
    fn exec_request_is_taken_once() {
        let mut request = ExecRequest::new(std::process::Command::new("true")).on_exit(|_| None);
        assert!(!request.is_spent());
        let (_, callback) = request.take().expect("first take");
        assert!(callback.is_some());
        assert!(request.is_spent());
        assert!(request.take().is_none());
        assert_eq!(format!("{:?}", Msg::Exec(request)), "Exec(spent)");
    }

    #[test]
    fn failed_downcast_returns_the_message() {
        let msg = Msg::custom(5u8);
        let back = msg.downcast::<Tick>().expect_err("wrong type");
        assert_eq!(back.downcast_ref::<u8>(), Some(&5));

        let quit = Msg::Quit.downcast::<Tick>().expect_err("not custom");
        assert!(matches!(quit, Msg::Quit));
    }
}
