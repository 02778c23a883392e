//! Rendering: the renderer capability consumed by the runtime, a default implementation,
//! and the scheduler that flushes it.

pub mod renderer;
pub mod scheduler;
pub mod width;

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::color::ColorProfile;
use crate::core::model::Cursor;

pub use renderer::StandardRenderer;
pub use scheduler::RenderScheduler;

/// What the runtime needs from a renderer.
///
/// `render` only records the latest frame; nothing reaches the terminal until `flush`,
/// which the render scheduler calls on every frame tick.
pub trait Renderer: Send {
    fn render(&mut self, view: &str, cursor: Option<Cursor>);
    fn flush(&mut self) -> io::Result<()>;
    /// Finish rendering and leave the terminal cursor below the last frame.
    fn close(&mut self) -> io::Result<()>;
    /// Forget everything about previously drawn frames, e.g. after the terminal was restored.
    fn reset(&mut self);
    fn resize(&mut self, width: u16, height: u16);
    fn set_color_profile(&mut self, profile: ColorProfile);
    fn enter_alt_screen(&mut self);
    fn exit_alt_screen(&mut self);
    fn show_cursor(&mut self);
    fn hide_cursor(&mut self);
    fn clear_screen(&mut self);
    /// Redraw the next frame in full even if it did not change.
    fn repaint(&mut self);
    /// Print text above the frame. Ignored on the alternate screen.
    fn insert_above(&mut self, text: &str);
}

/// Renderer shared between the event loop and the render scheduler thread.
pub type SharedRenderer = Arc<Mutex<Box<dyn Renderer>>>;

pub fn shared(renderer: Box<dyn Renderer>) -> SharedRenderer {
    Arc::new(Mutex::new(renderer))
}

pub fn lock(renderer: &SharedRenderer) -> MutexGuard<'_, Box<dyn Renderer>> {
    match renderer.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
