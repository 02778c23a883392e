//! Line renderer: redraws the frame in place, inline or on the alternate screen.

use std::fmt::Write as _;
use std::io;

use crate::core::color::ColorProfile;
use crate::core::model::Cursor;
use crate::core::output::SharedOutput;
use crate::render::width::{strip_sgr, truncate_line};
use crate::render::Renderer;

const SYNC_START: &str = "\x1b[?2026h";
const SYNC_END: &str = "\x1b[?2026l";
const ERASE_LINE_RIGHT: &str = "\x1b[K";
const ERASE_BELOW: &str = "\x1b[J";
const SHOW_CURSOR: &str = "\x1b[?25h";
const HIDE_CURSOR: &str = "\x1b[?25l";
const ENTER_ALT_SCREEN: &str = "\x1b[?1049h\x1b[2J\x1b[H";
const EXIT_ALT_SCREEN: &str = "\x1b[?1049l";
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

pub struct StandardRenderer {
    output: SharedOutput,
    width: u16,
    height: u16,
    profile: ColorProfile,
    alt_screen: bool,
    /// Cursor visibility requested through `show_cursor`/`hide_cursor`.
    cursor_enabled: bool,
    /// Visibility last written to the terminal.
    cursor_visible: bool,
    view: String,
    cursor: Option<Cursor>,
    last_view: Option<String>,
    last_cursor: Option<Cursor>,
    lines_rendered: usize,
    /// Row of the terminal cursor relative to the top of the drawn frame.
    cursor_row: usize,
    queued_above: Vec<String>,
}

impl StandardRenderer {
    pub fn new(output: SharedOutput) -> Self {
        Self {
            output,
            width: 80,
            height: 24,
            profile: ColorProfile::TrueColor,
            alt_screen: false,
            cursor_enabled: false,
            cursor_visible: true,
            view: String::new(),
            cursor: None,
            last_view: None,
            last_cursor: None,
            lines_rendered: 0,
            cursor_row: 0,
            queued_above: Vec::new(),
        }
    }

    pub fn is_alt_screen(&self) -> bool {
        self.alt_screen
    }

    pub fn color_profile(&self) -> ColorProfile {
        self.profile
    }

    fn write(&self, data: &str) -> io::Result<()> {
        self.output.write_str(data)
    }

    fn write_best_effort(&self, data: &str) {
        if let Err(err) = self.write(data) {
            tracing::warn!(target: "tape_runtime::render", %err, "terminal write failed");
        }
    }

    fn frame_lines(&self) -> Vec<String> {
        let width = usize::from(self.width.max(1));
        let height = usize::from(self.height.max(1));
        let mut lines: Vec<&str> = self.view.split('\n').collect();
        if lines.len() > height {
            if self.alt_screen {
                lines.truncate(height);
            } else {
                lines.drain(..lines.len() - height);
            }
        }
        lines
            .into_iter()
            .map(|line| {
                let line = line.strip_suffix('\r').unwrap_or(line);
                let line = truncate_line(line, width);
                if self.profile <= ColorProfile::Ascii {
                    strip_sgr(&line)
                } else {
                    line
                }
            })
            .collect()
    }

    fn forget_frame(&mut self) {
        self.last_view = None;
        self.last_cursor = None;
        self.lines_rendered = 0;
        self.cursor_row = 0;
    }

    fn move_to_frame_top(&self, buf: &mut String) {
        if self.alt_screen {
            buf.push_str("\x1b[H");
            return;
        }
        if self.cursor_row > 0 {
            let _ = write!(buf, "\x1b[{}A", self.cursor_row);
        }
        buf.push('\r');
    }
}

impl Renderer for StandardRenderer {
    fn render(&mut self, view: &str, cursor: Option<Cursor>) {
        if self.view != view {
            self.view.clear();
            self.view.push_str(view);
        }
        self.cursor = cursor;
    }

    fn flush(&mut self) -> io::Result<()> {
        let unchanged = self.last_view.as_deref() == Some(self.view.as_str())
            && self.last_cursor == self.cursor;
        if unchanged && self.queued_above.is_empty() {
            return Ok(());
        }

        let lines = self.frame_lines();
        let mut buf = String::from(SYNC_START);
        self.move_to_frame_top(&mut buf);

        for text in self.queued_above.drain(..) {
            for line in text.split('\n') {
                buf.push_str(line);
                buf.push_str(ERASE_LINE_RIGHT);
                buf.push_str("\r\n");
            }
        }

        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                buf.push_str("\r\n");
            }
            buf.push_str(line);
            buf.push_str(ERASE_LINE_RIGHT);
        }
        buf.push_str(ERASE_BELOW);

        let last_row = lines.len().saturating_sub(1);
        let want_visible = self.cursor.is_some() || self.cursor_enabled;
        match self.cursor {
            Some(cursor) => {
                let row = usize::from(cursor.y).min(last_row);
                if last_row > row {
                    let _ = write!(buf, "\x1b[{}A", last_row - row);
                }
                buf.push('\r');
                if cursor.x > 0 {
                    let _ = write!(buf, "\x1b[{}C", cursor.x);
                }
                let _ = write!(buf, "\x1b[{} q", cursor.style_param());
                self.cursor_row = row;
            }
            None => self.cursor_row = last_row,
        }
        if want_visible != self.cursor_visible {
            buf.push_str(if want_visible { SHOW_CURSOR } else { HIDE_CURSOR });
            self.cursor_visible = want_visible;
        }
        buf.push_str(SYNC_END);

        self.lines_rendered = lines.len();
        self.last_view = Some(self.view.clone());
        self.last_cursor = self.cursor;
        self.write(&buf)
    }

    fn close(&mut self) -> io::Result<()> {
        if self.alt_screen || self.lines_rendered == 0 {
            return Ok(());
        }
        let mut buf = String::new();
        let below = self.lines_rendered.saturating_sub(1 + self.cursor_row);
        if below > 0 {
            let _ = write!(buf, "\x1b[{below}B");
        }
        buf.push_str("\r\n");
        self.forget_frame();
        self.write(&buf)
    }

    fn reset(&mut self) {
        self.forget_frame();
        self.cursor_visible = true;
        if self.alt_screen {
            self.write_best_effort(ENTER_ALT_SCREEN);
        }
    }

    fn resize(&mut self, width: u16, height: u16) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.repaint();
    }

    fn set_color_profile(&mut self, profile: ColorProfile) {
        if self.profile != profile {
            self.profile = profile;
            self.repaint();
        }
    }

    fn enter_alt_screen(&mut self) {
        if self.alt_screen {
            return;
        }
        self.alt_screen = true;
        self.forget_frame();
        self.write_best_effort(ENTER_ALT_SCREEN);
    }

    fn exit_alt_screen(&mut self) {
        if !self.alt_screen {
            return;
        }
        self.alt_screen = false;
        self.forget_frame();
        self.write_best_effort(EXIT_ALT_SCREEN);
    }

    fn show_cursor(&mut self) {
        self.cursor_enabled = true;
        self.cursor_visible = true;
        self.write_best_effort(SHOW_CURSOR);
    }

    fn hide_cursor(&mut self) {
        self.cursor_enabled = false;
        self.cursor_visible = false;
        self.write_best_effort(HIDE_CURSOR);
    }

    fn clear_screen(&mut self) {
        self.forget_frame();
        self.write_best_effort(CLEAR_SCREEN);
    }

    fn repaint(&mut self) {
        self.last_view = None;
    }

    fn insert_above(&mut self, text: &str) {
        if self.alt_screen {
            return;
        }
        self.queued_above.push(text.to_string());
    }
}
