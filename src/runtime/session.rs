//! The terminal as one exclusively owned resource: raw mode, input, renderer, modes,
//! keyboard enhancements, and colors, with teardown and restore.

use std::fs::File;
use std::io;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::config::InputSource;
use crate::core::color::{ColorProfile, Rgb};
use crate::core::keyboard::KeyboardEnhancements;
use crate::core::message::Msg;
use crate::core::modes::{Mode, ModeSetting, ModeTable};
use crate::core::output::{ColorTarget, OutputGate, SharedOutput, TerminalCmd};
use crate::error::ProgramError;
use crate::platform::input_reader::{InputReader, ReaderSource, SharedReader};
use crate::platform::process_terminal::{
    self, enable_raw_mode, is_terminal, open_tty, restore_mode, RawFd, SavedTerminalState,
};
use crate::render::scheduler::{self, RenderScheduler, ThreadRunner};
use crate::render::{lock, Renderer, SharedRenderer};
use crate::runtime::bus::Bus;
use crate::runtime::negotiator::Negotiator;
use crate::runtime::program::Shared;
use crate::runtime::shutdown::Recovery;

/// Upper bound on waiting for the input thread to finish during a graceful stop.
const READ_LOOP_DRAIN: Duration = Duration::from_millis(500);

const MOUSE_MODES: [Mode; 2] = [Mode::BUTTON_EVENT_MOUSE, Mode::ANY_EVENT_MOUSE];

pub(crate) enum InputHandle {
    None,
    /// A terminal device. `_tty` keeps an opened `/dev/tty` alive.
    Terminal { fd: RawFd, _tty: Option<File> },
    Stream(SharedReader),
}

impl InputHandle {
    pub(crate) fn open(source: InputSource) -> io::Result<Self> {
        match source {
            InputSource::None => Ok(InputHandle::None),
            InputSource::Reader(reader) => Ok(InputHandle::Stream(Arc::new(Mutex::new(reader)))),
            InputSource::Tty => Self::open_tty(),
            InputSource::Stdin => {
                if is_terminal(process_terminal::STDIN_FD) {
                    Ok(InputHandle::Terminal {
                        fd: process_terminal::STDIN_FD,
                        _tty: None,
                    })
                } else {
                    // Input was piped or redirected; read keys from the controlling terminal.
                    Self::open_tty()
                }
            }
        }
    }

    fn open_tty() -> io::Result<Self> {
        let tty = open_tty()?;
        Ok(InputHandle::Terminal {
            fd: process_terminal::file_fd(&tty),
            _tty: Some(tty),
        })
    }

    fn reader_source(&self) -> io::Result<Option<ReaderSource>> {
        match self {
            InputHandle::None => Ok(None),
            InputHandle::Stream(reader) => Ok(Some(ReaderSource::Stream(Arc::clone(reader)))),
            #[cfg(unix)]
            InputHandle::Terminal { fd, .. } => Ok(Some(ReaderSource::Fd(*fd))),
            #[cfg(not(unix))]
            InputHandle::Terminal { _tty: tty, .. } => {
                let stream: Box<dyn io::Read + Send> = match tty {
                    Some(file) => Box::new(file.try_clone()?),
                    None => Box::new(io::stdin()),
                };
                Ok(Some(ReaderSource::Stream(Arc::new(Mutex::new(stream)))))
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Colors {
    foreground: Option<Rgb>,
    background: Option<Rgb>,
    cursor: Option<Rgb>,
}

impl Colors {
    fn slot(&mut self, target: ColorTarget) -> &mut Option<Rgb> {
        match target {
            ColorTarget::Foreground => &mut self.foreground,
            ColorTarget::Background => &mut self.background,
            ColorTarget::Cursor => &mut self.cursor,
        }
    }

    fn iter(&self) -> impl Iterator<Item = (ColorTarget, Rgb)> {
        [
            (ColorTarget::Foreground, self.foreground),
            (ColorTarget::Background, self.background),
            (ColorTarget::Cursor, self.cursor),
        ]
        .into_iter()
        .filter_map(|(target, color)| color.map(|color| (target, color)))
    }
}

pub(crate) struct Session {
    output: SharedOutput,
    output_fd: Option<RawFd>,
    input: InputHandle,
    saved: Option<SavedTerminalState>,
    renderer: Option<SharedRenderer>,
    reader: Option<InputReader>,
    scheduler: RenderScheduler,
    fps: u32,
    trace_input: bool,
    modes: ModeTable,
    keyboard: Negotiator,
    colors: Colors,
    profile: ColorProfile,
}

impl Session {
    pub(crate) fn new(
        output: SharedOutput,
        output_fd: Option<RawFd>,
        fps: u32,
        trace_input: bool,
    ) -> Self {
        Self {
            output,
            output_fd,
            input: InputHandle::None,
            saved: None,
            renderer: None,
            reader: None,
            scheduler: RenderScheduler::default(),
            fps,
            trace_input,
            modes: ModeTable::new(),
            keyboard: Negotiator::default(),
            colors: Colors::default(),
            profile: ColorProfile::TrueColor,
        }
    }

    pub(crate) fn output(&self) -> &SharedOutput {
        &self.output
    }

    pub(crate) fn output_fd(&self) -> Option<RawFd> {
        self.output_fd
    }

    pub(crate) fn renderer(&self) -> Option<SharedRenderer> {
        self.renderer.clone()
    }

    pub(crate) fn set_renderer(&mut self, renderer: Box<dyn Renderer>) {
        self.renderer = Some(crate::render::shared(renderer));
    }

    fn with_renderer(&self, f: impl FnOnce(&mut dyn Renderer)) {
        if let Some(renderer) = &self.renderer {
            f(lock(renderer).as_mut());
        }
    }

    pub(crate) fn execute(&self, cmd: TerminalCmd) {
        self.output.execute(&cmd);
    }

    pub(crate) fn write_raw(&self, data: &str) {
        if let Err(err) = self.output.write_str(data) {
            tracing::warn!(error = %err, "raw terminal write failed");
        }
    }

    pub(crate) fn set_input(&mut self, input: InputHandle) {
        self.input = input;
    }

    pub(crate) fn enter_raw_mode(&mut self) -> io::Result<()> {
        if self.saved.is_some() {
            return Ok(());
        }
        if let InputHandle::Terminal { fd, .. } = &self.input {
            self.saved = Some(enable_raw_mode(*fd)?);
            tracing::debug!(fd = *fd, "entered raw mode");
        }
        Ok(())
    }

    fn restore_raw_mode(&mut self) -> io::Result<()> {
        match self.saved.take() {
            Some(saved) => restore_mode(&saved),
            None => Ok(()),
        }
    }

    pub(crate) fn start_reader(&mut self, bus: &Bus, errs: &Sender<ProgramError>) -> io::Result<()> {
        let Some(source) = self.input.reader_source()? else {
            return Ok(());
        };
        let sink_bus = bus.clone();
        let errs = errs.clone();
        let reader = InputReader::spawn(
            source,
            self.trace_input,
            move |msg| sink_bus.send(msg),
            move |err| {
                let _ = errs.try_send(ProgramError::Input(err));
            },
        )?;
        self.reader = Some(reader);
        Ok(())
    }

    /// Stop the input thread, waiting a bounded time for it when `drain` is set.
    pub(crate) fn cancel_reader(&mut self, drain: bool) {
        let Some(reader) = self.reader.take() else {
            return;
        };
        if reader.cancel() && drain && !reader.wait(READ_LOOP_DRAIN) {
            tracing::debug!("input reader did not stop in time");
        }
    }

    pub(crate) fn start_scheduler(&mut self, runner: ThreadRunner) {
        if let Some(renderer) = self.renderer.clone() {
            self.scheduler.start(renderer, self.fps, runner);
        }
    }

    /// Stop flushing; flush the last frame unless killed, then close the renderer.
    pub(crate) fn stop_renderer(&mut self, kill: bool) {
        self.scheduler.stop();
        let Some(renderer) = self.renderer.clone() else {
            return;
        };
        if !kill {
            scheduler::flush(&renderer);
        }
        let closed = lock(&renderer).close();
        if let Err(err) = closed {
            tracing::warn!(error = %err, "renderer close failed");
        }
    }

    pub(crate) fn profile(&self) -> ColorProfile {
        self.profile
    }

    pub(crate) fn set_profile(&mut self, profile: ColorProfile) {
        self.profile = profile;
        self.with_renderer(|renderer| renderer.set_color_profile(profile));
    }

    pub(crate) fn resize(&mut self, width: u16, height: u16) {
        self.with_renderer(|renderer| renderer.resize(width, height));
    }

    pub(crate) fn renderer_do(&self, f: impl FnOnce(&mut dyn Renderer)) {
        self.with_renderer(f);
    }

    pub(crate) fn modes(&self) -> &ModeTable {
        &self.modes
    }

    /// Turn `mode` on. Does nothing if it is already on.
    pub(crate) fn enable_mode(&mut self, mode: Mode) {
        if self.modes.is_set(mode) {
            return;
        }
        tracing::debug!(?mode, "enable mode");
        match mode {
            Mode::ALT_SCREEN_SAVE_CURSOR => {
                self.with_renderer(|renderer| renderer.enter_alt_screen())
            }
            Mode::TEXT_CURSOR_ENABLE => self.with_renderer(|renderer| renderer.show_cursor()),
            Mode::GRAPHEME_CLUSTERING => {
                let mut gate = OutputGate::new();
                gate.push(TerminalCmd::SetMode(mode));
                gate.push(TerminalCmd::RequestMode(mode));
                gate.flush(&self.output);
            }
            _ => self.execute(TerminalCmd::SetMode(mode)),
        }
        self.modes.set(mode);
    }

    /// Turn `mode` off. Does nothing if it is already off.
    pub(crate) fn disable_mode(&mut self, mode: Mode) {
        if !self.modes.transition_off(mode) {
            return;
        }
        tracing::debug!(?mode, "disable mode");
        match mode {
            Mode::ALT_SCREEN_SAVE_CURSOR => {
                self.with_renderer(|renderer| renderer.exit_alt_screen())
            }
            Mode::TEXT_CURSOR_ENABLE => self.with_renderer(|renderer| renderer.hide_cursor()),
            _ => self.execute(TerminalCmd::ResetMode(mode)),
        }
    }

    pub(crate) fn record_mode_report(&mut self, mode: Mode, setting: ModeSetting) {
        if mode == Mode::GRAPHEME_CLUSTERING {
            self.modes.record(mode, setting);
        }
    }

    pub(crate) fn enable_mouse(&mut self, mode: Mode) {
        self.enable_mode(mode);
        self.enable_mode(Mode::SGR_EXT_MOUSE);
    }

    pub(crate) fn request_keyboard(&mut self, enhancements: KeyboardEnhancements, bus: &Bus) {
        let mut gate = OutputGate::new();
        gate.extend(self.keyboard.request(enhancements));
        gate.flush(&self.output);
        self.keyboard.await_report(bus);
    }

    pub(crate) fn disable_keyboard(&mut self) {
        let mut gate = OutputGate::new();
        gate.extend(self.keyboard.disable());
        gate.flush(&self.output);
    }

    pub(crate) fn keyboard(&mut self) -> &mut Negotiator {
        &mut self.keyboard
    }

    /// Set or reset a terminal color and remember it for teardown and restore.
    pub(crate) fn set_color(&mut self, target: ColorTarget, color: Option<Rgb>) {
        match color {
            Some(color) => self.execute(TerminalCmd::SetColor(target, color)),
            None => self.execute(TerminalCmd::ResetColor(target)),
        }
        *self.colors.slot(target) = color;
    }

    /// Apply the cursor color requested by the view, if it changed.
    pub(crate) fn sync_cursor_color(&mut self, color: Option<Rgb>) {
        if color.is_some() && color != self.colors.cursor {
            self.set_color(ColorTarget::Cursor, color);
        }
    }

    /// Undo every terminal change, keeping the records needed to reapply them.
    pub(crate) fn restore_terminal_state(&mut self) -> io::Result<()> {
        let mut gate = OutputGate::new();
        if self.modes.is_set(Mode::BRACKETED_PASTE) {
            gate.push(TerminalCmd::ResetMode(Mode::BRACKETED_PASTE));
        }
        if self.modes.is_reset(Mode::TEXT_CURSOR_ENABLE) {
            gate.push(TerminalCmd::SetMode(Mode::TEXT_CURSOR_ENABLE));
        }
        if MOUSE_MODES.iter().any(|mode| self.modes.is_set(*mode)) {
            gate.push(TerminalCmd::ResetMode(Mode::BUTTON_EVENT_MOUSE));
            gate.push(TerminalCmd::ResetMode(Mode::ANY_EVENT_MOUSE));
            gate.push(TerminalCmd::ResetMode(Mode::SGR_EXT_MOUSE));
        }
        if self.modes.is_set(Mode::FOCUS_EVENT) {
            gate.push(TerminalCmd::ResetMode(Mode::FOCUS_EVENT));
        }
        if self.modes.is_set(Mode::GRAPHEME_CLUSTERING) {
            gate.push(TerminalCmd::ResetMode(Mode::GRAPHEME_CLUSTERING));
        }
        gate.extend(self.keyboard.teardown_commands());
        if self.modes.is_set(Mode::ALT_SCREEN_SAVE_CURSOR) {
            gate.push(TerminalCmd::EraseScreenAndHome);
            gate.push(TerminalCmd::ResetMode(Mode::ALT_SCREEN_SAVE_CURSOR));
        }
        for (target, _) in self.colors.iter() {
            gate.push(TerminalCmd::ResetColor(target));
        }
        gate.flush(&self.output);
        self.restore_raw_mode()
    }

    /// Write back every mode, keyboard enhancement, and color recorded before a release.
    fn reapply_terminal_state(&mut self) {
        let mut gate = OutputGate::new();
        if self.modes.is_set(Mode::BRACKETED_PASTE) {
            gate.push(TerminalCmd::SetMode(Mode::BRACKETED_PASTE));
        }
        let active = self.keyboard.active();
        if active.modify_other_keys > 0 {
            gate.push(TerminalCmd::SetModifyOtherKeys(active.modify_other_keys));
        }
        if active.kitty_flags > 0 {
            gate.push(TerminalCmd::PushKittyKeyboard(active.kitty_flags));
        }
        if self.modes.is_set(Mode::FOCUS_EVENT) {
            gate.push(TerminalCmd::SetMode(Mode::FOCUS_EVENT));
        }
        for mode in MOUSE_MODES {
            if self.modes.is_set(mode) {
                gate.push(TerminalCmd::SetMode(mode));
                gate.push(TerminalCmd::SetMode(Mode::SGR_EXT_MOUSE));
            }
        }
        if self.modes.is_set(Mode::GRAPHEME_CLUSTERING) {
            gate.push(TerminalCmd::SetMode(Mode::GRAPHEME_CLUSTERING));
        }
        for (target, color) in self.colors.iter() {
            gate.push(TerminalCmd::SetColor(target, color));
        }
        gate.flush(&self.output);
    }
}

/// Hand the terminal to another foreground process. Signals are ignored until restored.
pub(crate) fn release_terminal(shared: &Shared) -> io::Result<()> {
    shared.ignore_signals.store(true, Ordering::SeqCst);
    let mut session = shared.session();
    session.cancel_reader(true);
    session.stop_renderer(false);
    tracing::debug!("terminal released");
    session.restore_terminal_state()
}

/// Take the terminal back after [`release_terminal`].
pub(crate) fn restore_terminal(shared: &Arc<Shared>) -> io::Result<()> {
    shared.ignore_signals.store(false, Ordering::SeqCst);
    let output_fd = {
        let mut session = shared.session();
        session.enter_raw_mode()?;
        session.start_reader(&shared.bus, &shared.errs_tx)?;
        session.renderer_do(|renderer| renderer.reset());
        if !session.modes().is_set(Mode::ALT_SCREEN_SAVE_CURSOR) {
            // Entering the alternate screen already redraws everything.
            shared.bus.send_detached(Msg::Repaint);
        }
        session.start_scheduler(Recovery::new(shared).runner());
        session.reapply_terminal_state();
        session.output_fd()
    };
    tracing::debug!("terminal restored");

    // The window may have changed size while another process had the terminal.
    let bus = shared.bus.clone();
    std::thread::spawn(move || check_resize(&bus, output_fd));
    Ok(())
}

/// Read the output terminal's size and report it to the loop.
pub(crate) fn check_resize(bus: &Bus, output_fd: Option<RawFd>) {
    let Some(fd) = output_fd else {
        return;
    };
    match process_terminal::window_size(fd) {
        Ok((width, height)) => {
            bus.send(Msg::WindowSize { width, height });
        }
        Err(err) => tracing::debug!(error = %err, "failed to read window size"),
    }
}
