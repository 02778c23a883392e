//! Commands: deferred, possibly slow work that produces at most one message.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::core::color::Rgb;
use crate::core::keyboard::KeyboardEnhancements;
use crate::core::message::{ExecCommand, ExecRequest, Msg};
use crate::core::modes::Mode;
use crate::core::output::{ClipboardSelection, ColorTarget};

/// A unit of work run off the event loop. Its message, if any, is fed back into the loop.
pub struct Cmd(Box<dyn FnOnce() -> Option<Msg> + Send + 'static>);

impl Cmd {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> Option<Msg> + Send + 'static,
    {
        Self(Box::new(f))
    }

    /// A command that immediately yields `msg`.
    pub fn message(msg: Msg) -> Self {
        Self::new(move || Some(msg))
    }

    pub fn run(self) -> Option<Msg> {
        (self.0)()
    }
}

impl fmt::Debug for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cmd(..)")
    }
}

fn collect(cmds: impl IntoIterator<Item = Option<Cmd>>) -> Vec<Cmd> {
    cmds.into_iter().flatten().collect()
}

/// Run commands concurrently with no ordering guarantee.
pub fn batch(cmds: impl IntoIterator<Item = Option<Cmd>>) -> Option<Cmd> {
    let mut cmds = collect(cmds);
    match cmds.len() {
        0 => None,
        1 => cmds.pop(),
        _ => Some(Cmd::message(Msg::Batch(cmds))),
    }
}

/// Run commands one at a time, each starting after the previous one's message was delivered.
pub fn sequence(cmds: impl IntoIterator<Item = Option<Cmd>>) -> Option<Cmd> {
    let mut cmds = collect(cmds);
    match cmds.len() {
        0 => None,
        1 => cmds.pop(),
        _ => Some(Cmd::message(Msg::Sequence(cmds))),
    }
}

/// Produce a message once `duration` has elapsed.
pub fn tick<F>(duration: Duration, f: F) -> Cmd
where
    F: FnOnce(Instant) -> Msg + Send + 'static,
{
    Cmd::new(move || {
        thread::sleep(duration);
        Some(f(Instant::now()))
    })
}

/// Like [`tick`], but fires on the next wall-clock multiple of `duration`.
pub fn every<F>(duration: Duration, f: F) -> Cmd
where
    F: FnOnce(SystemTime) -> Msg + Send + 'static,
{
    Cmd::new(move || {
        thread::sleep(until_next_multiple(SystemTime::now(), duration));
        Some(f(SystemTime::now()))
    })
}

fn until_next_multiple(now: SystemTime, duration: Duration) -> Duration {
    let step = duration.as_nanos();
    if step == 0 {
        return Duration::ZERO;
    }
    let since_epoch = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos();
    let remaining = step - since_epoch % step;
    Duration::from_nanos(remaining.min(u64::MAX as u128) as u64)
}

pub fn quit() -> Cmd {
    Cmd::message(Msg::Quit)
}

pub fn interrupt() -> Cmd {
    Cmd::message(Msg::Interrupt)
}

pub fn suspend() -> Cmd {
    Cmd::message(Msg::Suspend)
}

pub fn clear_screen() -> Cmd {
    Cmd::message(Msg::ClearScreen)
}

pub fn request_window_size() -> Cmd {
    Cmd::message(Msg::RequestWindowSize)
}

pub fn set_window_title(title: impl Into<String>) -> Cmd {
    Cmd::message(Msg::SetWindowTitle(title.into()))
}

pub fn println(line: impl Into<String>) -> Cmd {
    Cmd::message(Msg::Println(line.into()))
}

pub fn raw(data: impl Into<String>) -> Cmd {
    Cmd::message(Msg::Raw(data.into()))
}

pub fn enable_mode(mode: Mode) -> Cmd {
    Cmd::message(Msg::EnableMode(mode))
}

pub fn disable_mode(mode: Mode) -> Cmd {
    Cmd::message(Msg::DisableMode(mode))
}

pub fn request_mode(mode: Mode) -> Cmd {
    Cmd::message(Msg::RequestMode(mode))
}

/// Request keyboard enhancements. Key disambiguation is always part of the request.
pub fn request_keyboard_enhancements(enhancements: KeyboardEnhancements) -> Cmd {
    Cmd::message(Msg::EnableKeyboardEnhancements(
        enhancements.with_key_disambiguation(),
    ))
}

pub fn disable_keyboard_enhancements() -> Cmd {
    Cmd::message(Msg::DisableKeyboardEnhancements)
}

pub fn set_clipboard(content: impl Into<String>) -> Cmd {
    Cmd::message(Msg::SetClipboard {
        selection: ClipboardSelection::System,
        content: content.into(),
    })
}

pub fn set_primary_clipboard(content: impl Into<String>) -> Cmd {
    Cmd::message(Msg::SetClipboard {
        selection: ClipboardSelection::Primary,
        content: content.into(),
    })
}

pub fn read_clipboard() -> Cmd {
    Cmd::message(Msg::ReadClipboard(ClipboardSelection::System))
}

pub fn read_primary_clipboard() -> Cmd {
    Cmd::message(Msg::ReadClipboard(ClipboardSelection::Primary))
}

pub fn set_background_color(color: Option<Rgb>) -> Cmd {
    Cmd::message(Msg::SetColor {
        target: ColorTarget::Background,
        color,
    })
}

pub fn set_foreground_color(color: Option<Rgb>) -> Cmd {
    Cmd::message(Msg::SetColor {
        target: ColorTarget::Foreground,
        color,
    })
}

pub fn set_cursor_color(color: Option<Rgb>) -> Cmd {
    Cmd::message(Msg::SetColor {
        target: ColorTarget::Cursor,
        color,
    })
}

pub fn request_background_color() -> Cmd {
    Cmd::message(Msg::RequestColor(ColorTarget::Background))
}

pub fn request_foreground_color() -> Cmd {
    Cmd::message(Msg::RequestColor(ColorTarget::Foreground))
}

pub fn request_cursor_color() -> Cmd {
    Cmd::message(Msg::RequestColor(ColorTarget::Cursor))
}

pub fn request_cursor_position() -> Cmd {
    Cmd::message(Msg::RequestCursorPosition)
}

pub fn request_terminal_version() -> Cmd {
    Cmd::message(Msg::RequestTerminalVersion)
}

/// Query a termcap/terminfo capability (XTGETTCAP).
pub fn request_capability(name: impl Into<String>) -> Cmd {
    Cmd::message(Msg::RequestCapability(name.into()))
}

/// Run `command` with the terminal released, then deliver `on_exit(result)`.
pub fn exec_process<C, F>(command: C, on_exit: F) -> Cmd
where
    C: ExecCommand + 'static,
    F: FnOnce(std::io::Result<()>) -> Option<Msg> + Send + 'static,
{
    let request = ExecRequest::new(command).on_exit(on_exit);
    Cmd::message(Msg::Exec(request))
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::{batch, sequence, tick, until_next_multiple, Cmd};
    use crate::core::message::Msg;

    #[test]
    fn batch_drops_empty_entries_and_collapses_single_command() {
        assert!(batch([None, None]).is_none());

        let single = batch([None, Some(Cmd::message(Msg::custom(1u8))), None])
            .expect("single command");
        let msg = single.run().expect("message");
        assert_eq!(msg.downcast_ref::<u8>(), Some(&1));
    }

    #[test]
    fn batch_of_many_wraps_commands() {
        let cmd = batch([Some(Cmd::message(Msg::Quit)), Some(Cmd::message(Msg::Repaint))])
            .expect("batch command");
        match cmd.run() {
            Some(Msg::Batch(cmds)) => assert_eq!(cmds.len(), 2),
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn sequence_preserves_order() {
        let cmd = sequence((0..3u8).map(|i| Some(Cmd::message(Msg::custom(i)))))
            .expect("sequence command");
        let Some(Msg::Sequence(cmds)) = cmd.run() else {
            panic!("expected sequence");
        };
        let values: Vec<u8> = cmds
            .into_iter()
            .filter_map(|cmd| cmd.run())
            .filter_map(|msg| msg.downcast::<u8>().ok())
            .collect();
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[test]
    fn tick_waits_before_producing() {
        let start = std::time::Instant::now();
        let msg = tick(Duration::from_millis(20), |at| Msg::custom(at))
            .run()
            .expect("tick message");
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(msg.is::<std::time::Instant>());
    }

    #[test]
    fn every_aligns_to_wall_clock() {
        let now = UNIX_EPOCH + Duration::from_millis(1_250);
        assert_eq!(
            until_next_multiple(now, Duration::from_secs(1)),
            Duration::from_millis(750)
        );
        assert_eq!(until_next_multiple(now, Duration::ZERO), Duration::ZERO);
    }
}
