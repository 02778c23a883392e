//! Input events and decoding of complete terminal input sequences.
//!
//! Sequences arrive already split by `platform::stdin_buffer::StdinBuffer`; this module
//! only turns one complete sequence into a message.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::core::color::Rgb;
use crate::core::keyboard::KeyboardReport;
use crate::core::message::Msg;
use crate::core::modes::{Mode, ModeSetting};
use crate::core::output::{ClipboardSelection, ColorTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Key(KeyEvent),
    Paste(String),
    Mouse(MouseEvent),
    Focus,
    Blur,
    /// A sequence nothing recognized, kept verbatim.
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Enter,
    Tab,
    Backspace,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F(u8),
}

/// Key modifiers, encoded as in xterm's `1 + bits` parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const SHIFT: Modifiers = Modifiers(1);
    pub const ALT: Modifiers = Modifiers(2);
    pub const CTRL: Modifiers = Modifiers(4);
    pub const SUPER: Modifiers = Modifiers(8);

    /// From an xterm/kitty modifier parameter (`1` means none).
    pub fn from_param(param: u32) -> Self {
        Modifiers((param.saturating_sub(1) & 0x0f) as u8)
    }

    pub fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Modifiers) -> Modifiers {
        Modifiers(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum KeyEventKind {
    #[default]
    Press,
    Repeat,
    Release,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub modifiers: Modifiers,
    pub kind: KeyEventKind,
    /// Text the key produces, when the terminal reported it.
    pub text: Option<String>,
}

impl KeyEvent {
    pub fn new(code: KeyCode, modifiers: Modifiers) -> Self {
        Self {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            text: None,
        }
    }

    pub fn is_release(&self) -> bool {
        self.kind == KeyEventKind::Release
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.contains(Modifiers::CTRL) {
            f.write_str("ctrl+")?;
        }
        if self.modifiers.contains(Modifiers::ALT) {
            f.write_str("alt+")?;
        }
        if self.modifiers.contains(Modifiers::SHIFT) {
            f.write_str("shift+")?;
        }
        if self.modifiers.contains(Modifiers::SUPER) {
            f.write_str("super+")?;
        }
        match self.code {
            KeyCode::Char(' ') => f.write_str("space"),
            KeyCode::Char(ch) => write!(f, "{ch}"),
            KeyCode::Enter => f.write_str("enter"),
            KeyCode::Tab => f.write_str("tab"),
            KeyCode::Backspace => f.write_str("backspace"),
            KeyCode::Escape => f.write_str("esc"),
            KeyCode::Up => f.write_str("up"),
            KeyCode::Down => f.write_str("down"),
            KeyCode::Left => f.write_str("left"),
            KeyCode::Right => f.write_str("right"),
            KeyCode::Home => f.write_str("home"),
            KeyCode::End => f.write_str("end"),
            KeyCode::PageUp => f.write_str("pgup"),
            KeyCode::PageDown => f.write_str("pgdown"),
            KeyCode::Insert => f.write_str("insert"),
            KeyCode::Delete => f.write_str("delete"),
            KeyCode::F(n) => write!(f, "f{n}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    None,
    Left,
    Middle,
    Right,
    WheelUp,
    WheelDown,
    WheelLeft,
    WheelRight,
    Other(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAction {
    Press,
    Release,
    Motion,
}

/// Mouse event with zero-based cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub x: u16,
    pub y: u16,
    pub button: MouseButton,
    pub action: MouseAction,
    pub modifiers: Modifiers,
}

/// Decode one complete input sequence into a message.
pub fn decode_sequence(seq: &str) -> Option<Msg> {
    if seq.is_empty() {
        return None;
    }
    if let Some(body) = seq.strip_prefix("\x1b[") {
        return Some(decode_csi(seq, body));
    }
    if let Some(body) = seq.strip_prefix("\x1b]") {
        return Some(decode_osc(seq, body));
    }
    if let Some(body) = seq.strip_prefix("\x1bP") {
        return Some(decode_dcs(seq, body));
    }
    if let Some(body) = seq.strip_prefix("\x1bO") {
        return Some(decode_ss3(seq, body));
    }
    if seq.starts_with("\x1b_") {
        return Some(unknown(seq));
    }
    if seq == "\x1b" {
        return Some(key(KeyCode::Escape, Modifiers::NONE));
    }
    if let Some(rest) = seq.strip_prefix('\x1b') {
        return match decode_sequence(rest) {
            Some(Msg::Input(InputEvent::Key(mut event))) => {
                event.modifiers = event.modifiers | Modifiers::ALT;
                Some(Msg::Input(InputEvent::Key(event)))
            }
            _ => Some(unknown(seq)),
        };
    }

    let mut chars = seq.chars();
    let ch = chars.next()?;
    if chars.next().is_some() {
        return Some(unknown(seq));
    }
    Some(Msg::Input(InputEvent::Key(decode_char(ch))))
}

fn decode_char(ch: char) -> KeyEvent {
    match ch {
        '\r' | '\n' => KeyEvent::new(KeyCode::Enter, Modifiers::NONE),
        '\t' => KeyEvent::new(KeyCode::Tab, Modifiers::NONE),
        '\x7f' | '\x08' => KeyEvent::new(KeyCode::Backspace, Modifiers::NONE),
        '\x00' => KeyEvent::new(KeyCode::Char(' '), Modifiers::CTRL),
        '\x01'..='\x1a' => {
            let letter = (b'a' + (ch as u8 - 1)) as char;
            KeyEvent::new(KeyCode::Char(letter), Modifiers::CTRL)
        }
        '\x1b' => KeyEvent::new(KeyCode::Escape, Modifiers::NONE),
        ch => {
            let mut event = KeyEvent::new(KeyCode::Char(ch), Modifiers::NONE);
            event.text = Some(ch.to_string());
            event
        }
    }
}

fn key(code: KeyCode, modifiers: Modifiers) -> Msg {
    Msg::Input(InputEvent::Key(KeyEvent::new(code, modifiers)))
}

fn unknown(seq: &str) -> Msg {
    Msg::Input(InputEvent::Unknown(seq.to_string()))
}

fn number(value: &str) -> Option<u32> {
    if value.is_empty() {
        return None;
    }
    value.parse().ok()
}

fn decode_csi(seq: &str, body: &str) -> Msg {
    let Some(final_byte) = body.chars().last() else {
        return unknown(seq);
    };
    let inner = &body[..body.len() - final_byte.len_utf8()];
    let (marker, inner) = match inner.chars().next() {
        Some(m @ ('?' | '>' | '<' | '=')) => (Some(m), &inner[1..]),
        _ => (None, inner),
    };

    match (marker, final_byte) {
        (Some('?'), 'u') => match number(inner) {
            Some(flags) => Msg::KeyboardReport(KeyboardReport::Kitty(flags.min(255) as u8)),
            None => unknown(seq),
        },
        (Some('>'), 'm') => {
            let mut params = inner.split(';');
            match (params.next(), params.next().and_then(number)) {
                (Some("4"), Some(level)) => {
                    Msg::KeyboardReport(KeyboardReport::ModifyOtherKeys(level.min(255) as u8))
                }
                _ => unknown(seq),
            }
        }
        (Some('<'), 'M' | 'm') => decode_sgr_mouse(seq, inner, final_byte == 'm'),
        (marker, 'y') if inner.ends_with('$') => {
            let mut params = inner[..inner.len() - 1].split(';');
            match (params.next().and_then(number), params.next().and_then(number)) {
                (Some(mode), Some(value)) => {
                    let mode = mode.min(u16::MAX as u32) as u16;
                    let mode = if marker == Some('?') {
                        Mode::dec(mode)
                    } else {
                        Mode::ansi(mode)
                    };
                    Msg::ModeReport {
                        mode,
                        setting: ModeSetting::from_report(value.min(255) as u8),
                    }
                }
                _ => unknown(seq),
            }
        }
        (None, 'I') if inner.is_empty() => Msg::Input(InputEvent::Focus),
        (None, 'O') if inner.is_empty() => Msg::Input(InputEvent::Blur),
        (None, 'R') => {
            let mut params = inner.split(';');
            match (params.next().and_then(number), params.next().and_then(number)) {
                (Some(row), Some(col)) => Msg::CursorPosition {
                    x: col.saturating_sub(1).min(u16::MAX as u32) as u16,
                    y: row.saturating_sub(1).min(u16::MAX as u32) as u16,
                },
                _ => unknown(seq),
            }
        }
        (None, 'u') => decode_kitty_key(seq, inner),
        (None, '~') => decode_tilde(seq, inner),
        (None, 'Z') => key(KeyCode::Tab, Modifiers::SHIFT),
        (None, 'A' | 'B' | 'C' | 'D' | 'H' | 'F' | 'P' | 'Q' | 'S') => {
            let modifiers = inner
                .split(';')
                .nth(1)
                .and_then(number)
                .map(Modifiers::from_param)
                .unwrap_or_default();
            match letter_key(final_byte) {
                Some(code) => key(code, modifiers),
                None => unknown(seq),
            }
        }
        _ => unknown(seq),
    }
}

fn letter_key(letter: char) -> Option<KeyCode> {
    Some(match letter {
        'A' => KeyCode::Up,
        'B' => KeyCode::Down,
        'C' => KeyCode::Right,
        'D' => KeyCode::Left,
        'H' => KeyCode::Home,
        'F' => KeyCode::End,
        'P' => KeyCode::F(1),
        'Q' => KeyCode::F(2),
        'R' => KeyCode::F(3),
        'S' => KeyCode::F(4),
        _ => return None,
    })
}

fn decode_ss3(seq: &str, body: &str) -> Msg {
    let mut chars = body.chars();
    match (chars.next().and_then(letter_key), chars.next()) {
        (Some(code), None) => key(code, Modifiers::NONE),
        _ => unknown(seq),
    }
}

fn decode_tilde(seq: &str, inner: &str) -> Msg {
    let params: Vec<&str> = inner.split(';').collect();
    // modifyOtherKeys: CSI 27 ; mods ; code ~
    if params.len() == 3 && params[0] == "27" {
        let (Some(mods), Some(code)) = (number(params[1]), number(params[2])) else {
            return unknown(seq);
        };
        return match codepoint_key(code) {
            Some(mut event) => {
                event.modifiers = event.modifiers | Modifiers::from_param(mods);
                Msg::Input(InputEvent::Key(event))
            }
            None => unknown(seq),
        };
    }

    let modifiers = params
        .get(1)
        .and_then(|value| number(value))
        .map(Modifiers::from_param)
        .unwrap_or_default();
    let code = match params.first().and_then(|value| number(value)) {
        Some(1 | 7) => KeyCode::Home,
        Some(2) => KeyCode::Insert,
        Some(3) => KeyCode::Delete,
        Some(4 | 8) => KeyCode::End,
        Some(5) => KeyCode::PageUp,
        Some(6) => KeyCode::PageDown,
        Some(n @ 11..=15) => KeyCode::F((n - 10) as u8),
        Some(n @ 17..=21) => KeyCode::F((n - 11) as u8),
        Some(n @ 23..=24) => KeyCode::F((n - 12) as u8),
        _ => return unknown(seq),
    };
    key(code, modifiers)
}

fn codepoint_key(code: u32) -> Option<KeyEvent> {
    let event = match code {
        13 => KeyEvent::new(KeyCode::Enter, Modifiers::NONE),
        9 => KeyEvent::new(KeyCode::Tab, Modifiers::NONE),
        27 => KeyEvent::new(KeyCode::Escape, Modifiers::NONE),
        8 | 127 => KeyEvent::new(KeyCode::Backspace, Modifiers::NONE),
        _ => KeyEvent::new(KeyCode::Char(char::from_u32(code)?), Modifiers::NONE),
    };
    Some(event)
}

// CSI code[:alternates] ; mods[:event] ; text u
fn decode_kitty_key(seq: &str, inner: &str) -> Msg {
    let mut params = inner.split(';');
    let Some(code) = params
        .next()
        .and_then(|value| value.split(':').next())
        .and_then(number)
    else {
        return unknown(seq);
    };
    let Some(mut event) = codepoint_key(code) else {
        return unknown(seq);
    };

    if let Some(mods) = params.next() {
        let mut parts = mods.split(':');
        event.modifiers = parts
            .next()
            .and_then(number)
            .map(Modifiers::from_param)
            .unwrap_or_default();
        event.kind = match parts.next().and_then(number) {
            Some(2) => KeyEventKind::Repeat,
            Some(3) => KeyEventKind::Release,
            _ => KeyEventKind::Press,
        };
    }

    if let Some(text) = params.next() {
        let text: String = text
            .split(':')
            .filter_map(number)
            .filter_map(char::from_u32)
            .collect();
        if !text.is_empty() {
            event.text = Some(text);
        }
    } else if let KeyCode::Char(ch) = event.code {
        if event.modifiers.is_empty() || event.modifiers == Modifiers::SHIFT {
            event.text = Some(ch.to_string());
        }
    }

    Msg::Input(InputEvent::Key(event))
}

// CSI < button ; x ; y (M|m)
fn decode_sgr_mouse(seq: &str, inner: &str, release: bool) -> Msg {
    let mut params = inner.split(';').map(number);
    let (Some(Some(code)), Some(Some(x)), Some(Some(y))) =
        (params.next(), params.next(), params.next())
    else {
        return unknown(seq);
    };

    let mut modifiers = Modifiers::NONE;
    if code & 4 != 0 {
        modifiers = modifiers | Modifiers::SHIFT;
    }
    if code & 8 != 0 {
        modifiers = modifiers | Modifiers::ALT;
    }
    if code & 16 != 0 {
        modifiers = modifiers | Modifiers::CTRL;
    }

    let motion = code & 32 != 0;
    let button = match (code & 0b1100_0011, motion) {
        (3, true) => MouseButton::None,
        (0, _) => MouseButton::Left,
        (1, _) => MouseButton::Middle,
        (2, _) => MouseButton::Right,
        (64, _) => MouseButton::WheelUp,
        (65, _) => MouseButton::WheelDown,
        (66, _) => MouseButton::WheelLeft,
        (67, _) => MouseButton::WheelRight,
        (other, _) => MouseButton::Other(other.min(255) as u8),
    };
    let action = if release {
        MouseAction::Release
    } else if motion {
        MouseAction::Motion
    } else {
        MouseAction::Press
    };

    Msg::Input(InputEvent::Mouse(MouseEvent {
        x: x.saturating_sub(1).min(u16::MAX as u32) as u16,
        y: y.saturating_sub(1).min(u16::MAX as u32) as u16,
        button,
        action,
        modifiers,
    }))
}

fn strip_string_terminator(body: &str) -> &str {
    body.strip_suffix('\x07')
        .or_else(|| body.strip_suffix("\x1b\\"))
        .unwrap_or(body)
}

fn decode_osc(seq: &str, body: &str) -> Msg {
    let body = strip_string_terminator(body);
    let Some((code, rest)) = body.split_once(';') else {
        return unknown(seq);
    };

    if code == "52" {
        let Some((selection, data)) = rest.split_once(';') else {
            return unknown(seq);
        };
        let selection = selection
            .chars()
            .next()
            .and_then(ClipboardSelection::from_code)
            .unwrap_or_default();
        return match BASE64.decode(data.as_bytes()) {
            Ok(bytes) => Msg::Clipboard {
                selection,
                content: String::from_utf8_lossy(&bytes).into_owned(),
            },
            Err(_) => unknown(seq),
        };
    }

    let target = code.parse().ok().and_then(ColorTarget::from_osc);
    match (target, Rgb::parse(rest)) {
        (Some(target), Some(color)) => Msg::Color { target, color },
        _ => unknown(seq),
    }
}

fn decode_hex(hex: &str) -> Option<String> {
    if hex.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}

fn decode_dcs(seq: &str, body: &str) -> Msg {
    let body = strip_string_terminator(body);

    if let Some(version) = body.strip_prefix(">|") {
        return Msg::TerminalVersion(version.to_string());
    }

    // XTGETTCAP success: DCS 1 + r name[=value] ST
    if let Some(payload) = body.strip_prefix("1+r") {
        let (name, value) = match payload.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (payload, None),
        };
        let Some(name) = decode_hex(name) else {
            return unknown(seq);
        };
        let value = match value {
            Some(value) => match decode_hex(value) {
                Some(value) => Some(value),
                None => return unknown(seq),
            },
            None => None,
        };
        return Msg::Capability { name, value };
    }

    unknown(seq)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{
        decode_sequence, InputEvent, KeyCode, KeyEvent, KeyEventKind, Modifiers, MouseAction,
        MouseButton,
    };
    use crate::core::color::Rgb;
    use crate::core::keyboard::KeyboardReport;
    use crate::core::message::Msg;
    use crate::core::modes::{Mode, ModeSetting};
    use crate::core::output::{ClipboardSelection, ColorTarget};

    fn key_of(seq: &str) -> KeyEvent {
        match decode_sequence(seq) {
            Some(Msg::Input(InputEvent::Key(event))) => event,
            other => panic!("expected key for {seq:?}, got {other:?}"),
        }
    }

    #[test]
    fn legacy_keys() {
        assert_eq!(key_of("a").to_string(), "a");
        assert_eq!(key_of("\x03").to_string(), "ctrl+c");
        assert_eq!(key_of("\r").code, KeyCode::Enter);
        assert_eq!(key_of("\x7f").code, KeyCode::Backspace);
        assert_eq!(key_of("\x1b").code, KeyCode::Escape);
        assert_eq!(key_of("\x1bx").to_string(), "alt+x");
        assert_eq!(key_of(" ").to_string(), "space");
    }

    #[test]
    fn cursor_and_function_keys() {
        assert_eq!(key_of("\x1b[A").code, KeyCode::Up);
        assert_eq!(key_of("\x1b[1;5C").to_string(), "ctrl+right");
        assert_eq!(key_of("\x1bOP").code, KeyCode::F(1));
        assert_eq!(key_of("\x1b[3~").code, KeyCode::Delete);
        assert_eq!(key_of("\x1b[15~").code, KeyCode::F(5));
        assert_eq!(key_of("\x1b[24;2~").to_string(), "shift+f12");
        assert_eq!(key_of("\x1b[Z").to_string(), "shift+tab");
    }

    #[test]
    fn kitty_keys_carry_event_kind_and_text() {
        let release = key_of("\x1b[97;1:3u");
        assert_eq!(release.code, KeyCode::Char('a'));
        assert_eq!(release.kind, KeyEventKind::Release);

        let ctrl = key_of("\x1b[99;5u");
        assert_eq!(ctrl.to_string(), "ctrl+c");
        assert!(ctrl.text.is_none());

        let shifted = key_of("\x1b[97;2;65u");
        assert_eq!(shifted.text.as_deref(), Some("A"));
    }

    #[test]
    fn modify_other_keys_encoding() {
        let event = key_of("\x1b[27;5;13~");
        assert_eq!(event.code, KeyCode::Enter);
        assert!(event.modifiers.contains(Modifiers::CTRL));
    }

    #[test]
    fn keyboard_enhancement_reports() {
        assert!(matches!(
            decode_sequence("\x1b[?3u"),
            Some(Msg::KeyboardReport(KeyboardReport::Kitty(3)))
        ));
        assert!(matches!(
            decode_sequence("\x1b[>4;2m"),
            Some(Msg::KeyboardReport(KeyboardReport::ModifyOtherKeys(2)))
        ));
    }

    #[test]
    fn mode_reports() {
        match decode_sequence("\x1b[?2027;1$y") {
            Some(Msg::ModeReport { mode, setting }) => {
                assert_eq!(mode, Mode::GRAPHEME_CLUSTERING);
                assert_eq!(setting, ModeSetting::Set);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn focus_cursor_and_mouse() {
        assert_eq!(
            decode_sequence("\x1b[I").and_then(|msg| msg.as_input().cloned()),
            Some(InputEvent::Focus)
        );
        assert!(matches!(
            decode_sequence("\x1b[12;40R"),
            Some(Msg::CursorPosition { x: 39, y: 11 })
        ));
        match decode_sequence("\x1b[<0;10;5m") {
            Some(Msg::Input(InputEvent::Mouse(mouse))) => {
                assert_eq!((mouse.x, mouse.y), (9, 4));
                assert_eq!(mouse.button, MouseButton::Left);
                assert_eq!(mouse.action, MouseAction::Release);
            }
            other => panic!("unexpected {other:?}"),
        }
        match decode_sequence("\x1b[<35;1;1M") {
            Some(Msg::Input(InputEvent::Mouse(mouse))) => {
                assert_eq!(mouse.button, MouseButton::None);
                assert_eq!(mouse.action, MouseAction::Motion);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn osc_and_dcs_responses() {
        match decode_sequence("\x1b]11;rgb:0000/0000/ffff\x1b\\") {
            Some(Msg::Color { target, color }) => {
                assert_eq!(target, ColorTarget::Background);
                assert_eq!(color, Rgb::new(0, 0, 255));
            }
            other => panic!("unexpected {other:?}"),
        }
        match decode_sequence("\x1b]52;c;aGk=\x07") {
            Some(Msg::Clipboard { selection, content }) => {
                assert_eq!(selection, ClipboardSelection::System);
                assert_eq!(content, "hi");
            }
            other => panic!("unexpected {other:?}"),
        }
        match decode_sequence("\x1bP1+r524742=38\x1b\\") {
            Some(Msg::Capability { name, value }) => {
                assert_eq!(name, "RGB");
                assert_eq!(value.as_deref(), Some("8"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match decode_sequence("\x1bP>|kitty(0.35.2)\x1b\\") {
            Some(Msg::TerminalVersion(version)) => assert_eq!(version, "kitty(0.35.2)"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unrecognized_sequences_are_kept_verbatim() {
        assert_eq!(
            decode_sequence("\x1b[99X").and_then(|msg| msg.as_input().cloned()),
            Some(InputEvent::Unknown("\x1b[99X".to_string()))
        );
        assert!(decode_sequence("").is_none());
    }
}
