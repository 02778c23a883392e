//! Colors and color profiles.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb`, `#rgb`, or the X11 form `rgb:rrrr/gggg/bbbb` used in
    /// OSC color responses (1 to 4 hex digits per channel).
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Some(hex) = value.strip_prefix('#') {
            return match hex.len() {
                6 => Some(Self::new(
                    u8::from_str_radix(&hex[0..2], 16).ok()?,
                    u8::from_str_radix(&hex[2..4], 16).ok()?,
                    u8::from_str_radix(&hex[4..6], 16).ok()?,
                )),
                3 => {
                    let digit = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok();
                    Some(Self::new(digit(0)? * 17, digit(1)? * 17, digit(2)? * 17))
                }
                _ => None,
            };
        }

        let channels = value.strip_prefix("rgb:")?;
        let mut parts = channels.split('/');
        let r = scale_x11_channel(parts.next()?)?;
        let g = scale_x11_channel(parts.next()?)?;
        let b = scale_x11_channel(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(r, g, b))
    }

    /// Rough perceived-brightness split used by programs choosing light or dark palettes.
    pub fn is_dark(&self) -> bool {
        let luma = 0.2126 * f32::from(self.r) + 0.7152 * f32::from(self.g) + 0.0722 * f32::from(self.b);
        luma < 128.0
    }
}

fn scale_x11_channel(digits: &str) -> Option<u8> {
    if digits.is_empty() || digits.len() > 4 {
        return None;
    }
    let value = u32::from_str_radix(digits, 16).ok()?;
    let max = (1u32 << (4 * digits.len() as u32)) - 1;
    Some(((value * 255 + max / 2) / max) as u8)
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// How many colors the output can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColorProfile {
    /// Output is not a terminal: no escape sequences at all.
    NoTty,
    /// Text attributes only, no colors.
    Ascii,
    /// 16 colors.
    Ansi,
    /// 256 colors.
    Ansi256,
    /// 24-bit colors.
    TrueColor,
}

impl ColorProfile {
    /// Best-effort guess from environment variables and whether output is a terminal.
    pub fn detect(environ: &[(String, String)], output_is_tty: bool) -> Self {
        let lookup = |key: &str| {
            environ
                .iter()
                .rev()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.as_str())
        };

        if !output_is_tty {
            return ColorProfile::NoTty;
        }
        if lookup("NO_COLOR").is_some_and(|value| !value.is_empty()) {
            return ColorProfile::Ascii;
        }

        let term = lookup("TERM").unwrap_or_default().to_ascii_lowercase();
        if term == "dumb" {
            return ColorProfile::Ascii;
        }

        let colorterm = lookup("COLORTERM").unwrap_or_default().to_ascii_lowercase();
        if colorterm == "truecolor" || colorterm == "24bit" || term.ends_with("direct") {
            return ColorProfile::TrueColor;
        }
        if term.contains("kitty") || term.contains("ghostty") || term.contains("wezterm") {
            return ColorProfile::TrueColor;
        }
        if term.contains("256color") {
            return ColorProfile::Ansi256;
        }
        ColorProfile::Ansi
    }
}

impl fmt::Display for ColorProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColorProfile::NoTty => "no tty",
            ColorProfile::Ascii => "ascii",
            ColorProfile::Ansi => "ansi",
            ColorProfile::Ansi256 => "ansi256",
            ColorProfile::TrueColor => "truecolor",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::{ColorProfile, Rgb};

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_hex_and_x11_forms() {
        assert_eq!(Rgb::parse("#1e1e2e"), Some(Rgb::new(0x1e, 0x1e, 0x2e)));
        assert_eq!(Rgb::parse("#fff"), Some(Rgb::new(255, 255, 255)));
        assert_eq!(Rgb::parse("rgb:ffff/0000/8080"), Some(Rgb::new(255, 0, 128)));
        assert_eq!(Rgb::parse("rgb:f/0/8"), Some(Rgb::new(255, 0, 136)));
        assert_eq!(Rgb::parse("rgb:ffff/0000"), None);
        assert_eq!(Rgb::parse("blue"), None);
    }

    #[test]
    fn display_round_trips_through_parse() {
        let color = Rgb::new(1, 2, 250);
        assert_eq!(color.to_string(), "#0102fa");
        assert_eq!(Rgb::parse(&color.to_string()), Some(color));
    }

    #[test]
    fn darkness_split() {
        assert!(Rgb::new(0x1e, 0x1e, 0x2e).is_dark());
        assert!(!Rgb::new(0xee, 0xee, 0xee).is_dark());
    }

    #[test]
    fn detect_profile_from_environment() {
        assert_eq!(ColorProfile::detect(&env(&[]), false), ColorProfile::NoTty);
        assert_eq!(
            ColorProfile::detect(&env(&[("TERM", "xterm-256color")]), true),
            ColorProfile::Ansi256
        );
        assert_eq!(
            ColorProfile::detect(
                &env(&[("TERM", "xterm-256color"), ("COLORTERM", "truecolor")]),
                true
            ),
            ColorProfile::TrueColor
        );
        assert_eq!(
            ColorProfile::detect(&env(&[("TERM", "xterm"), ("NO_COLOR", "1")]), true),
            ColorProfile::Ascii
        );
        assert_eq!(
            ColorProfile::detect(&env(&[("TERM", "xterm")]), true),
            ColorProfile::Ansi
        );
    }
}
