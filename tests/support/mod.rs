#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tape_runtime::{
    Cmd, ColorProfile, Cursor, InputSource, Model, Msg, ProgramConfig, Renderer,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Output sink that keeps everything written to it.
#[derive(Clone, Default)]
pub struct CapturedOutput {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().expect("lock captured output");
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .expect("lock captured output for write")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    EnterAltScreen,
    ExitAltScreen,
    InsertAbove(String),
    Close,
    Reset,
    Repaint,
    ClearScreen,
}

#[derive(Default)]
struct RendererState {
    events: Vec<RenderEvent>,
    last_view: Option<String>,
    flushed_view: Option<String>,
    size: Option<(u16, u16)>,
    alt_screen: bool,
}

/// Renderer double recording every call it receives.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    state: Arc<Mutex<RendererState>>,
}

impl RecordingRenderer {
    fn state(&self) -> std::sync::MutexGuard<'_, RendererState> {
        self.state.lock().expect("lock renderer state")
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        self.state().events.clone()
    }

    pub fn count(&self, event: &RenderEvent) -> usize {
        self.state().events.iter().filter(|seen| *seen == event).count()
    }

    pub fn alt_screen_transitions(&self) -> Vec<RenderEvent> {
        self.state()
            .events
            .iter()
            .filter(|event| {
                matches!(event, RenderEvent::EnterAltScreen | RenderEvent::ExitAltScreen)
            })
            .cloned()
            .collect()
    }

    pub fn flushed_view(&self) -> Option<String> {
        self.state().flushed_view.clone()
    }

    pub fn size(&self) -> Option<(u16, u16)> {
        self.state().size
    }
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, view: &str, _cursor: Option<Cursor>) {
        self.state().last_view = Some(view.to_string());
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.state();
        state.flushed_view = state.last_view.clone();
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.state().events.push(RenderEvent::Close);
        Ok(())
    }

    fn reset(&mut self) {
        self.state().events.push(RenderEvent::Reset);
    }

    fn resize(&mut self, width: u16, height: u16) {
        self.state().size = Some((width, height));
    }

    fn set_color_profile(&mut self, _profile: ColorProfile) {}

    fn enter_alt_screen(&mut self) {
        let mut state = self.state();
        if !state.alt_screen {
            state.alt_screen = true;
            state.events.push(RenderEvent::EnterAltScreen);
        }
    }

    fn exit_alt_screen(&mut self) {
        let mut state = self.state();
        if state.alt_screen {
            state.alt_screen = false;
            state.events.push(RenderEvent::ExitAltScreen);
        }
    }

    fn show_cursor(&mut self) {}

    fn hide_cursor(&mut self) {}

    fn clear_screen(&mut self) {
        self.state().events.push(RenderEvent::ClearScreen);
    }

    fn repaint(&mut self) {
        self.state().events.push(RenderEvent::Repaint);
    }

    fn insert_above(&mut self, text: &str) {
        self.state()
            .events
            .push(RenderEvent::InsertAbove(text.to_string()));
    }
}

/// Headless configuration: no input, captured output, no signal handling.
pub fn headless_config(output: &CapturedOutput) -> ProgramConfig {
    ProgramConfig::new()
        .with_input(InputSource::None)
        .with_output(output.clone())
        .without_signal_handler()
        .with_window_size(80, 24)
        .with_color_profile(ColorProfile::TrueColor)
        .with_environ(vec![("TERM".to_string(), "xterm-256color".to_string())])
}

/// Application message carrying a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag(pub u32);

pub fn tag(value: u32) -> Option<Cmd> {
    Some(Cmd::new(move || Some(Msg::custom(Tag(value)))))
}

type Reaction = Box<dyn FnMut(&Msg, &[u32]) -> Option<Cmd>>;

/// Model that records tags in arrival order and reacts to every message through a closure.
pub struct Recorder {
    pub tags: Vec<u32>,
    pub seen: Vec<String>,
    init: Option<Cmd>,
    react: Reaction,
}

impl Recorder {
    pub fn new<F>(init: Option<Cmd>, react: F) -> Self
    where
        F: FnMut(&Msg, &[u32]) -> Option<Cmd> + 'static,
    {
        Self {
            tags: Vec::new(),
            seen: Vec::new(),
            init,
            react: Box::new(react),
        }
    }

    /// Quits as soon as `count` tags have arrived.
    pub fn until_tags(init: Option<Cmd>, count: usize) -> Self {
        Self::new(init, move |_, tags| {
            (tags.len() == count).then(tape_runtime::command::quit)
        })
    }

    pub fn saw(&self, name: &str) -> bool {
        self.seen.iter().any(|seen| seen.starts_with(name))
    }
}

impl Model for Recorder {
    fn init(&mut self) -> Option<Cmd> {
        self.init.take()
    }

    fn update(&mut self, msg: Msg) -> Option<Cmd> {
        self.seen.push(format!("{msg:?}"));
        if let Some(Tag(value)) = msg.downcast_ref::<Tag>() {
            self.tags.push(*value);
        }
        (self.react)(&msg, &self.tags)
    }

    fn view(&self) -> String {
        format!("tags: {:?}", self.tags)
    }
}
