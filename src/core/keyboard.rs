//! Keyboard enhancement protocols: kitty progressive enhancement flags and
//! xterm modifyOtherKeys.

/// Kitty progressive enhancement flags (`CSI > flags u`).
pub mod kitty {
    pub const DISAMBIGUATE_ESCAPE_CODES: u8 = 1;
    pub const REPORT_EVENT_TYPES: u8 = 2;
    pub const REPORT_ALTERNATE_KEYS: u8 = 4;
    pub const REPORT_ALL_KEYS_AS_ESCAPE_CODES: u8 = 8;
    pub const REPORT_ASSOCIATED_TEXT: u8 = 16;

    pub const ALL: u8 = DISAMBIGUATE_ESCAPE_CODES
        | REPORT_EVENT_TYPES
        | REPORT_ALTERNATE_KEYS
        | REPORT_ALL_KEYS_AS_ESCAPE_CODES
        | REPORT_ASSOCIATED_TEXT;
}

/// Highest modifyOtherKeys level.
pub const MODIFY_OTHER_KEYS_MAX: u8 = 2;

/// A keyboard enhancement set over both protocol channels.
///
/// Used both for what a program requested and for what the terminal reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KeyboardEnhancements {
    pub kitty_flags: u8,
    pub modify_other_keys: u8,
}

impl KeyboardEnhancements {
    pub fn new(kitty_flags: u8, modify_other_keys: u8) -> Self {
        Self {
            kitty_flags: kitty_flags & kitty::ALL,
            modify_other_keys: modify_other_keys.min(MODIFY_OTHER_KEYS_MAX),
        }
    }

    /// Every enhancement on both channels.
    pub fn full() -> Self {
        Self::new(kitty::ALL, MODIFY_OTHER_KEYS_MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.kitty_flags == 0 && self.modify_other_keys == 0
    }

    /// Flags are OR-merged, the modifyOtherKeys level takes the maximum.
    pub fn merge(&mut self, other: KeyboardEnhancements) {
        self.kitty_flags |= other.kitty_flags & kitty::ALL;
        self.modify_other_keys = self
            .modify_other_keys
            .max(other.modify_other_keys.min(MODIFY_OTHER_KEYS_MAX));
    }

    pub fn merged(mut self, other: KeyboardEnhancements) -> Self {
        self.merge(other);
        self
    }

    /// Disambiguation through kitty flag 1 or modifyOtherKeys level 1.
    pub fn with_key_disambiguation(mut self) -> Self {
        self.kitty_flags |= kitty::DISAMBIGUATE_ESCAPE_CODES;
        self.modify_other_keys = self.modify_other_keys.max(1);
        self
    }

    pub fn with_key_releases(mut self) -> Self {
        self.kitty_flags |= kitty::REPORT_EVENT_TYPES;
        self
    }

    pub fn with_uniform_key_layout(mut self) -> Self {
        self.kitty_flags |= kitty::REPORT_ALTERNATE_KEYS | kitty::REPORT_ALL_KEYS_AS_ESCAPE_CODES;
        self
    }

    pub fn supports_key_disambiguation(&self) -> bool {
        if cfg!(windows) {
            return true;
        }
        self.kitty_flags & kitty::DISAMBIGUATE_ESCAPE_CODES != 0 || self.modify_other_keys > 0
    }

    pub fn supports_key_releases(&self) -> bool {
        if cfg!(windows) {
            return true;
        }
        self.kitty_flags & kitty::REPORT_EVENT_TYPES != 0
    }

    pub fn supports_uniform_key_layout(&self) -> bool {
        if cfg!(windows) {
            return true;
        }
        self.kitty_flags & kitty::REPORT_ALTERNATE_KEYS != 0
            && self.kitty_flags & kitty::REPORT_ALL_KEYS_AS_ESCAPE_CODES != 0
    }

    /// Push kitty flags: `CSI > flags u`.
    pub fn kitty_push_sequence(&self) -> String {
        format!("\x1b[>{}u", self.kitty_flags)
    }

    /// Set modifyOtherKeys: `CSI > 4 ; level m`.
    pub fn modify_other_keys_sequence(&self) -> String {
        format!("\x1b[>4;{}m", self.modify_other_keys)
    }
}

/// One channel of a terminal's keyboard-enhancement response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardReport {
    /// `CSI ? flags u`
    Kitty(u8),
    /// `CSI > 4 ; level m`
    ModifyOtherKeys(u8),
}

impl KeyboardReport {
    pub fn apply_to(self, active: &mut KeyboardEnhancements) {
        match self {
            KeyboardReport::Kitty(flags) => active.kitty_flags = flags & kitty::ALL,
            KeyboardReport::ModifyOtherKeys(level) => {
                active.modify_other_keys = level.min(MODIFY_OTHER_KEYS_MAX)
            }
        }
    }
}

#[cfg(all(test, not(windows)))]
mod tests {
    use super::{kitty, KeyboardEnhancements, KeyboardReport};

    #[test]
    fn merge_ors_flags_and_keeps_highest_level() {
        let mut requested = KeyboardEnhancements::new(kitty::REPORT_EVENT_TYPES, 0);
        requested.merge(KeyboardEnhancements::new(kitty::DISAMBIGUATE_ESCAPE_CODES, 1));
        assert_eq!(requested, KeyboardEnhancements::new(3, 1));

        requested.merge(KeyboardEnhancements::new(0, 0));
        assert_eq!(requested, KeyboardEnhancements::new(3, 1));
    }

    #[test]
    fn values_outside_protocol_range_are_clamped() {
        let enh = KeyboardEnhancements::new(0xff, 9);
        assert_eq!(enh.kitty_flags, kitty::ALL);
        assert_eq!(enh.modify_other_keys, 2);
    }

    #[test]
    fn support_queries_follow_reported_flags() {
        let empty = KeyboardEnhancements::default();
        assert!(!empty.supports_key_disambiguation());
        assert!(!empty.supports_key_releases());
        assert!(!empty.supports_uniform_key_layout());

        let mok = KeyboardEnhancements::new(0, 1);
        assert!(mok.supports_key_disambiguation());
        assert!(!mok.supports_key_releases());

        let full = KeyboardEnhancements::default()
            .with_key_releases()
            .with_uniform_key_layout();
        assert!(full.supports_key_releases());
        assert!(full.supports_uniform_key_layout());
    }

    #[test]
    fn reports_update_only_their_channel() {
        let mut active = KeyboardEnhancements::new(1, 2);
        KeyboardReport::Kitty(3).apply_to(&mut active);
        assert_eq!(active, KeyboardEnhancements::new(3, 2));
        KeyboardReport::ModifyOtherKeys(0).apply_to(&mut active);
        assert_eq!(active, KeyboardEnhancements::new(3, 0));
    }

    #[test]
    fn sequences_encode_flags_and_level() {
        let enh = KeyboardEnhancements::new(3, 1);
        assert_eq!(enh.kitty_push_sequence(), "\x1b[>3u");
        assert_eq!(enh.modify_other_keys_sequence(), "\x1b[>4;1m");
    }
}
