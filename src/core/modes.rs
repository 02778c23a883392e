//! Terminal modes and the runtime's record of their last known state.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeKind {
    /// ANSI mode, set with `CSI n h`.
    Ansi,
    /// DEC private mode, set with `CSI ? n h`.
    Dec,
}

/// A terminal mode addressed by its number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mode {
    kind: ModeKind,
    number: u16,
}

impl Mode {
    pub const TEXT_CURSOR_ENABLE: Mode = Mode::dec(25);
    pub const BUTTON_EVENT_MOUSE: Mode = Mode::dec(1002);
    pub const ANY_EVENT_MOUSE: Mode = Mode::dec(1003);
    pub const FOCUS_EVENT: Mode = Mode::dec(1004);
    pub const SGR_EXT_MOUSE: Mode = Mode::dec(1006);
    pub const ALT_SCREEN_SAVE_CURSOR: Mode = Mode::dec(1049);
    pub const BRACKETED_PASTE: Mode = Mode::dec(2004);
    pub const GRAPHEME_CLUSTERING: Mode = Mode::dec(2027);

    pub const fn dec(number: u16) -> Self {
        Self {
            kind: ModeKind::Dec,
            number,
        }
    }

    pub const fn ansi(number: u16) -> Self {
        Self {
            kind: ModeKind::Ansi,
            number,
        }
    }

    pub fn kind(&self) -> ModeKind {
        self.kind
    }

    pub fn number(&self) -> u16 {
        self.number
    }

    fn prefix(&self) -> &'static str {
        match self.kind {
            ModeKind::Ansi => "",
            ModeKind::Dec => "?",
        }
    }

    /// `CSI [?] n h`
    pub fn set_sequence(&self) -> String {
        format!("\x1b[{}{}h", self.prefix(), self.number)
    }

    /// `CSI [?] n l`
    pub fn reset_sequence(&self) -> String {
        format!("\x1b[{}{}l", self.prefix(), self.number)
    }

    /// `CSI [?] n $ p` (DECRQM)
    pub fn request_sequence(&self) -> String {
        format!("\x1b[{}{}$p", self.prefix(), self.number)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix(), self.number)
    }
}

/// Mode state as reported by DECRPM (`CSI ? n ; v $ y`) or recorded by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeSetting {
    #[default]
    NotRecognized,
    Set,
    Reset,
    PermanentlySet,
    PermanentlyReset,
}

impl ModeSetting {
    pub fn from_report(value: u8) -> Self {
        match value {
            1 => ModeSetting::Set,
            2 => ModeSetting::Reset,
            3 => ModeSetting::PermanentlySet,
            4 => ModeSetting::PermanentlyReset,
            _ => ModeSetting::NotRecognized,
        }
    }

    pub fn is_set(self) -> bool {
        matches!(self, ModeSetting::Set | ModeSetting::PermanentlySet)
    }

    pub fn is_reset(self) -> bool {
        matches!(self, ModeSetting::Reset | ModeSetting::PermanentlyReset)
    }

    pub fn is_unknown(self) -> bool {
        self == ModeSetting::NotRecognized
    }
}

/// Last known state per mode. Absent modes are unknown.
#[derive(Debug, Clone, Default)]
pub struct ModeTable {
    modes: HashMap<Mode, ModeSetting>,
}

impl ModeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, mode: Mode) -> ModeSetting {
        self.modes.get(&mode).copied().unwrap_or_default()
    }

    pub fn set(&mut self, mode: Mode) {
        self.modes.insert(mode, ModeSetting::Set);
    }

    pub fn reset(&mut self, mode: Mode) {
        self.modes.insert(mode, ModeSetting::Reset);
    }

    pub fn record(&mut self, mode: Mode, setting: ModeSetting) {
        self.modes.insert(mode, setting);
    }

    pub fn is_set(&self, mode: Mode) -> bool {
        self.get(mode).is_set()
    }

    pub fn is_reset(&self, mode: Mode) -> bool {
        self.get(mode).is_reset()
    }

    /// Records `mode` as set. Returns `false` when it already was, in which case
    /// nothing should be written to the terminal.
    pub fn transition_on(&mut self, mode: Mode) -> bool {
        if self.is_set(mode) {
            return false;
        }
        self.set(mode);
        true
    }

    /// Records `mode` as reset. Returns `false` when it already was.
    pub fn transition_off(&mut self, mode: Mode) -> bool {
        if self.is_reset(mode) {
            return false;
        }
        self.reset(mode);
        true
    }

    pub fn clear(&mut self) {
        self.modes.clear();
    }
}
