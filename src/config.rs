//! Program options and environment configuration.

use std::env;
use std::fmt;
use std::io::{Read, Write};

use crate::core::color::ColorProfile;
use crate::core::keyboard::KeyboardEnhancements;
use crate::error::ConfigError;
use crate::runtime::context::Context;

pub const DEFAULT_FPS: u32 = 60;
pub const MAX_FPS: u32 = 120;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MouseMode {
    #[default]
    None,
    /// Clicks, releases, wheel, and motion while a button is held.
    CellMotion,
    /// All motion events, with or without a button held.
    AllMotion,
}

/// Where input is read from.
#[derive(Default)]
pub enum InputSource {
    /// Standard input, falling back to `/dev/tty` when stdin is not a terminal.
    #[default]
    Stdin,
    /// Always open `/dev/tty`.
    Tty,
    Reader(Box<dyn Read + Send>),
    /// No input at all.
    None,
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Stdin => f.write_str("Stdin"),
            InputSource::Tty => f.write_str("Tty"),
            InputSource::Reader(_) => f.write_str("Reader(..)"),
            InputSource::None => f.write_str("None"),
        }
    }
}

#[derive(Default)]
pub enum OutputTarget {
    #[default]
    Stdout,
    Writer(Box<dyn Write + Send>),
}

impl fmt::Debug for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Stdout => f.write_str("Stdout"),
            OutputTarget::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

/// Startup options for a [`crate::Program`].
#[derive(Debug)]
pub struct ProgramConfig {
    pub alt_screen: bool,
    pub mouse: MouseMode,
    pub bracketed_paste: bool,
    pub report_focus: bool,
    pub grapheme_clustering: bool,
    pub keyboard_enhancements: Option<KeyboardEnhancements>,
    /// Recover from panics in the model and commands, restoring the terminal first.
    pub catch_panics: bool,
    /// Turn SIGINT/SIGTERM into `Interrupt`/`Quit` messages.
    pub signal_handler: bool,
    pub fps: u32,
    pub title: Option<String>,
    /// Initial size used when output is not a terminal.
    pub window_size: Option<(u16, u16)>,
    /// Skip detection and use this profile.
    pub color_profile: Option<ColorProfile>,
    /// Environment reported to the model and used for detection. Defaults to the process env.
    pub environ: Option<Vec<(String, String)>>,
    pub input: InputSource,
    pub output: OutputTarget,
    /// Parent context; cancelling it kills the program.
    pub context: Option<Context>,
    mouse_conflict: bool,
}

impl Default for ProgramConfig {
    fn default() -> Self {
        Self {
            alt_screen: false,
            mouse: MouseMode::None,
            bracketed_paste: true,
            report_focus: false,
            grapheme_clustering: false,
            keyboard_enhancements: None,
            catch_panics: true,
            signal_handler: true,
            fps: DEFAULT_FPS,
            title: None,
            window_size: None,
            color_profile: None,
            environ: None,
            input: InputSource::default(),
            output: OutputTarget::default(),
            context: None,
            mouse_conflict: false,
        }
    }
}

impl ProgramConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alt_screen(mut self) -> Self {
        self.alt_screen = true;
        self
    }

    pub fn with_mouse_cell_motion(mut self) -> Self {
        self.set_mouse(MouseMode::CellMotion);
        self
    }

    pub fn with_mouse_all_motion(mut self) -> Self {
        self.set_mouse(MouseMode::AllMotion);
        self
    }

    fn set_mouse(&mut self, mode: MouseMode) {
        if self.mouse != MouseMode::None && self.mouse != mode {
            self.mouse_conflict = true;
        }
        self.mouse = mode;
    }

    pub fn without_bracketed_paste(mut self) -> Self {
        self.bracketed_paste = false;
        self
    }

    pub fn with_report_focus(mut self) -> Self {
        self.report_focus = true;
        self
    }

    pub fn with_grapheme_clustering(mut self) -> Self {
        self.grapheme_clustering = true;
        self
    }

    /// Request keyboard enhancements at startup. Repeated calls merge.
    pub fn with_keyboard_enhancements(mut self, enhancements: KeyboardEnhancements) -> Self {
        let merged = self
            .keyboard_enhancements
            .unwrap_or_default()
            .merged(enhancements);
        self.keyboard_enhancements = Some(merged);
        self
    }

    pub fn without_catch_panics(mut self) -> Self {
        self.catch_panics = false;
        self
    }

    pub fn without_signal_handler(mut self) -> Self {
        self.signal_handler = false;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_window_size(mut self, width: u16, height: u16) -> Self {
        self.window_size = Some((width, height));
        self
    }

    pub fn with_color_profile(mut self, profile: ColorProfile) -> Self {
        self.color_profile = Some(profile);
        self
    }

    pub fn with_environ(mut self, environ: Vec<(String, String)>) -> Self {
        self.environ = Some(environ);
        self
    }

    pub fn with_input(mut self, input: InputSource) -> Self {
        self.input = input;
        self
    }

    pub fn with_output(mut self, output: impl Write + Send + 'static) -> Self {
        self.output = OutputTarget::Writer(Box::new(output));
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mouse_conflict {
            return Err(ConfigError::ConflictingMouseModes);
        }
        if let Some((width, height)) = self.window_size {
            if width == 0 || height == 0 {
                return Err(ConfigError::EmptyWindowSize { width, height });
            }
        }
        Ok(())
    }

    /// Frame rate clamped to the supported range.
    pub fn effective_fps(&self) -> u32 {
        self.fps.clamp(1, MAX_FPS)
    }

    pub(crate) fn environ_or_process(&self) -> Vec<(String, String)> {
        match &self.environ {
            Some(environ) => environ.clone(),
            None => env::vars().collect(),
        }
    }
}

/// Settings read from the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    /// `TAPE_TRACE`: write runtime logs to this file.
    pub trace_path: Option<String>,
    /// `TAPE_TRACE_OUTPUT=1`: log every sequence written to the terminal.
    pub trace_output: bool,
    /// `TAPE_TRACE_INPUT=1`: log every input sequence.
    pub trace_input: bool,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            trace_path: env_string_opt("TAPE_TRACE").filter(|value| !is_disabled(value)),
            trace_output: env_flag("TAPE_TRACE_OUTPUT"),
            trace_input: env_flag("TAPE_TRACE_INPUT"),
        }
    }
}

fn is_disabled(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "off"
    )
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
