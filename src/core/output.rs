//! Typed terminal output commands and the shared output writer.
//!
//! Invariant: runtime writes reach the terminal through `SharedOutput`, either directly
//! (`SharedOutput::execute`) or batched via `OutputGate::flush(..)`.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::core::color::Rgb;
use crate::core::keyboard::KeyboardEnhancements;
use crate::core::modes::Mode;

/// Clipboard selection addressed by OSC 52.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipboardSelection {
    #[default]
    System,
    Primary,
}

impl ClipboardSelection {
    pub fn code(self) -> char {
        match self {
            ClipboardSelection::System => 'c',
            ClipboardSelection::Primary => 'p',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'c' => Some(ClipboardSelection::System),
            'p' => Some(ClipboardSelection::Primary),
            _ => None,
        }
    }
}

/// Dynamic colors addressed by OSC 10/11/12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorTarget {
    Foreground,
    Background,
    Cursor,
}

impl ColorTarget {
    pub fn osc(self) -> u16 {
        match self {
            ColorTarget::Foreground => 10,
            ColorTarget::Background => 11,
            ColorTarget::Cursor => 12,
        }
    }

    pub fn from_osc(code: u16) -> Option<Self> {
        match code {
            10 => Some(ColorTarget::Foreground),
            11 => Some(ColorTarget::Background),
            12 => Some(ColorTarget::Cursor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCmd {
    /// Raw bytes/control sequences (UTF-8 string) written verbatim.
    Raw(String),

    SetMode(Mode),
    ResetMode(Mode),
    RequestMode(Mode),

    /// `CSI > flags u`
    PushKittyKeyboard(u8),
    /// `CSI = 0 ; 1 u`
    DisableKittyKeyboard,
    /// `CSI ? u`
    RequestKittyKeyboard,
    /// `CSI > 4 ; level m`
    SetModifyOtherKeys(u8),
    /// `CSI > 4 m`
    ResetModifyOtherKeys,
    /// `CSI ? 4 m`
    RequestModifyOtherKeys,

    SetWindowTitle(String),
    SetClipboard(ClipboardSelection, String),
    RequestClipboard(ClipboardSelection),
    SetColor(ColorTarget, Rgb),
    ResetColor(ColorTarget),
    RequestColor(ColorTarget),

    RequestCursorPosition,
    RequestTerminalVersion,
    RequestCapability(String),

    /// Clear the alternate screen before leaving it.
    EraseScreenAndHome,
}

impl TerminalCmd {
    pub fn raw(data: impl Into<String>) -> Self {
        Self::Raw(data.into())
    }

    /// Append the wire encoding of this command to `out`.
    pub fn encode(&self, out: &mut String) {
        match self {
            TerminalCmd::Raw(data) => out.push_str(data),
            TerminalCmd::SetMode(mode) => out.push_str(&mode.set_sequence()),
            TerminalCmd::ResetMode(mode) => out.push_str(&mode.reset_sequence()),
            TerminalCmd::RequestMode(mode) => out.push_str(&mode.request_sequence()),
            TerminalCmd::PushKittyKeyboard(flags) => {
                out.push_str(&KeyboardEnhancements::new(*flags, 0).kitty_push_sequence())
            }
            TerminalCmd::DisableKittyKeyboard => out.push_str("\x1b[=0;1u"),
            TerminalCmd::RequestKittyKeyboard => out.push_str("\x1b[?u"),
            TerminalCmd::SetModifyOtherKeys(level) => {
                out.push_str(&KeyboardEnhancements::new(0, *level).modify_other_keys_sequence())
            }
            TerminalCmd::ResetModifyOtherKeys => out.push_str("\x1b[>4m"),
            TerminalCmd::RequestModifyOtherKeys => out.push_str("\x1b[?4m"),
            TerminalCmd::SetWindowTitle(title) => osc_title_sequence(out, title),
            TerminalCmd::SetClipboard(selection, text) => {
                let _ = write!(
                    out,
                    "\x1b]52;{};{}\x07",
                    selection.code(),
                    BASE64.encode(text.as_bytes())
                );
            }
            TerminalCmd::RequestClipboard(selection) => {
                let _ = write!(out, "\x1b]52;{};?\x07", selection.code());
            }
            TerminalCmd::SetColor(target, color) => {
                let _ = write!(out, "\x1b]{};{}\x07", target.osc(), color);
            }
            TerminalCmd::ResetColor(target) => {
                let _ = write!(out, "\x1b]{}\x07", target.osc() + 100);
            }
            TerminalCmd::RequestColor(target) => {
                let _ = write!(out, "\x1b]{};?\x07", target.osc());
            }
            TerminalCmd::RequestCursorPosition => out.push_str("\x1b[6n"),
            TerminalCmd::RequestTerminalVersion => out.push_str("\x1b[>0q"),
            TerminalCmd::RequestCapability(name) => {
                out.push_str("\x1bP+q");
                for byte in name.bytes() {
                    let _ = write!(out, "{byte:02X}");
                }
                out.push_str("\x1b\\");
            }
            TerminalCmd::EraseScreenAndHome => out.push_str("\x1b[2J\x1b[H"),
        }
    }

    pub fn to_sequence(&self) -> String {
        let mut out = String::new();
        self.encode(&mut out);
        out
    }
}

/// OSC 0 sets both the icon name and the window title.
fn osc_title_sequence(out: &mut String, title: &str) {
    out.push_str("\x1b]0;");
    out.extend(title.chars().filter(|ch| !ch.is_control()));
    out.push('\x07');
}

/// Mutex-guarded writer shared by the event loop, the renderer, and teardown.
#[derive(Clone)]
pub struct SharedOutput {
    inner: Arc<Mutex<OutputInner>>,
}

struct OutputInner {
    writer: Box<dyn Write + Send>,
    trace: bool,
}

impl SharedOutput {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(OutputInner {
                writer,
                trace: false,
            })),
        }
    }

    /// Log every write at trace level.
    pub fn set_trace(&self, enabled: bool) {
        self.lock().trace = enabled;
    }

    fn lock(&self) -> MutexGuard<'_, OutputInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn write_str(&self, data: &str) -> io::Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut inner = self.lock();
        if inner.trace {
            tracing::trace!(target: "tape_runtime::output", data = ?data, "write");
        }
        inner.writer.write_all(data.as_bytes())?;
        inner.writer.flush()
    }

    /// Write one command immediately. Errors are logged and dropped.
    pub fn execute(&self, cmd: &TerminalCmd) {
        if let Err(err) = self.write_str(&cmd.to_sequence()) {
            tracing::warn!(target: "tape_runtime::output", %err, ?cmd, "terminal write failed");
        }
    }
}

/// Buffers commands so a group of them reaches the terminal in one write.
#[derive(Debug, Default)]
pub struct OutputGate {
    cmds: Vec<TerminalCmd>,
}

impl OutputGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cmd: TerminalCmd) {
        self.cmds.push(cmd);
    }

    pub fn extend<I>(&mut self, cmds: I)
    where
        I: IntoIterator<Item = TerminalCmd>,
    {
        self.cmds.extend(cmds);
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    pub fn commands(&self) -> &[TerminalCmd] {
        &self.cmds
    }

    pub fn flush(&mut self, output: &SharedOutput) {
        if self.cmds.is_empty() {
            return;
        }
        let mut data = String::new();
        for cmd in self.cmds.drain(..) {
            cmd.encode(&mut data);
        }
        if let Err(err) = output.write_str(&data) {
            tracing::warn!(target: "tape_runtime::output", %err, "terminal write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    use super::{ClipboardSelection, ColorTarget, OutputGate, SharedOutput, TerminalCmd};
    use crate::core::color::Rgb;
    use crate::core::modes::Mode;

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("sink lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Sink {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("sink lock")).into_owned()
        }
    }

    #[test]
    fn protocol_sequences() {
        assert_eq!(TerminalCmd::PushKittyKeyboard(3).to_sequence(), "\x1b[>3u");
        assert_eq!(TerminalCmd::DisableKittyKeyboard.to_sequence(), "\x1b[=0;1u");
        assert_eq!(TerminalCmd::SetModifyOtherKeys(1).to_sequence(), "\x1b[>4;1m");
        assert_eq!(TerminalCmd::ResetModifyOtherKeys.to_sequence(), "\x1b[>4m");
        assert_eq!(TerminalCmd::RequestModifyOtherKeys.to_sequence(), "\x1b[?4m");
        assert_eq!(
            TerminalCmd::RequestCapability("RGB".to_string()).to_sequence(),
            "\x1bP+q524742\x1b\\"
        );
    }

    #[test]
    fn osc_sequences() {
        assert_eq!(
            TerminalCmd::SetWindowTitle("a\x07b".to_string()).to_sequence(),
            "\x1b]0;ab\x07"
        );
        assert_eq!(
            TerminalCmd::SetClipboard(ClipboardSelection::System, "hi".to_string()).to_sequence(),
            "\x1b]52;c;aGk=\x07"
        );
        assert_eq!(
            TerminalCmd::RequestClipboard(ClipboardSelection::Primary).to_sequence(),
            "\x1b]52;p;?\x07"
        );
        assert_eq!(
            TerminalCmd::SetColor(ColorTarget::Background, Rgb::new(0, 0, 255)).to_sequence(),
            "\x1b]11;#0000ff\x07"
        );
        assert_eq!(
            TerminalCmd::ResetColor(ColorTarget::Cursor).to_sequence(),
            "\x1b]112\x07"
        );
    }

    #[test]
    fn gate_flushes_in_push_order_as_one_write() {
        let sink = Sink::default();
        let output = SharedOutput::new(Box::new(sink.clone()));
        let mut gate = OutputGate::new();
        gate.push(TerminalCmd::ResetMode(Mode::BRACKETED_PASTE));
        gate.push(TerminalCmd::SetMode(Mode::TEXT_CURSOR_ENABLE));
        gate.flush(&output);
        assert!(gate.is_empty());
        assert_eq!(sink.contents(), "\x1b[?2004l\x1b[?25h");

        gate.flush(&output);
        assert_eq!(sink.contents(), "\x1b[?2004l\x1b[?25h");
    }
}
