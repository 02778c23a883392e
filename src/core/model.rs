//! The application contract.

use crate::core::color::Rgb;
use crate::core::command::Cmd;
use crate::core::message::Msg;

/// Application state driven by the event loop.
///
/// The model stays on the thread that called `Program::run`; only the loop touches it.
pub trait Model {
    /// Command to run once the program has started.
    fn init(&mut self) -> Option<Cmd> {
        None
    }

    /// Apply one message. Runs on the event loop and should not block.
    fn update(&mut self, msg: Msg) -> Option<Cmd>;

    /// Render the current state as text, one terminal line per `\n`.
    fn view(&self) -> String;

    /// Where to place the terminal cursor. `None` keeps it hidden.
    fn cursor(&self) -> Option<Cursor> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CursorShape {
    #[default]
    Block,
    Underline,
    Bar,
}

/// A visible cursor at a zero-based cell position inside the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub x: u16,
    pub y: u16,
    pub shape: CursorShape,
    pub blink: bool,
    pub color: Option<Rgb>,
}

impl Cursor {
    pub fn new(x: u16, y: u16) -> Self {
        Self {
            x,
            y,
            shape: CursorShape::default(),
            blink: true,
            color: None,
        }
    }

    pub fn with_shape(mut self, shape: CursorShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_color(mut self, color: Rgb) -> Self {
        self.color = Some(color);
        self
    }

    /// DECSCUSR parameter for this shape and blink setting.
    pub fn style_param(&self) -> u8 {
        let base = match self.shape {
            CursorShape::Block => 1,
            CursorShape::Underline => 3,
            CursorShape::Bar => 5,
        };
        if self.blink {
            base
        } else {
            base + 1
        }
    }
}
