//! `Program`: startup, the run lifecycle, and the thread-safe handle.

use std::fmt;
use std::io;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::config::{EnvConfig, MouseMode, OutputTarget, ProgramConfig};
use crate::core::color::ColorProfile;
use crate::core::command::Cmd;
use crate::core::message::Msg;
use crate::core::model::Model;
use crate::core::modes::Mode;
use crate::core::output::{SharedOutput, TerminalCmd};
use crate::error::{ConfigError, KillReason, ProgramError};
use crate::logging::{self, LogGuard};
use crate::platform::panic_hook;
use crate::platform::process_terminal::{self, is_terminal, RawFd, STDOUT_FD};
use crate::platform::{SignalKind, SignalStream};
use crate::render::{Renderer, StandardRenderer};
use crate::runtime::bus::Bus;
use crate::runtime::context::{lock, Context, Latch, TaskHandles};
use crate::runtime::event_loop::{EventLoop, Filter};
use crate::runtime::executor;
use crate::runtime::session::{self, check_resize, InputHandle, Session};
use crate::runtime::shutdown::{recover_from_panic, shutdown, Recovery, ShutdownGate};

/// State shared by the loop, runtime threads, and every [`ProgramHandle`].
pub(crate) struct Shared {
    pub(crate) ctx: Context,
    pub(crate) bus: Bus,
    pub(crate) msgs_rx: Receiver<Msg>,
    pub(crate) errs_tx: Sender<ProgramError>,
    pub(crate) errs_rx: Receiver<ProgramError>,
    pub(crate) cmds_tx: Sender<Cmd>,
    pub(crate) cmds_rx: Receiver<Cmd>,
    pub(crate) handles: TaskHandles,
    /// Released after a graceful shutdown.
    pub(crate) finished: Latch,
    pub(crate) gate: ShutdownGate,
    pub(crate) ignore_signals: Arc<AtomicBool>,
    pub(crate) catch_panics: bool,
    session: Mutex<Session>,
}

impl Shared {
    fn new(session: Session, catch_panics: bool) -> Self {
        let ctx = Context::new();
        let (msgs_tx, msgs_rx) = bounded(0);
        let (errs_tx, errs_rx) = bounded(1);
        let (cmds_tx, cmds_rx) = bounded(0);
        Self {
            bus: Bus::new(msgs_tx, ctx.clone()),
            ctx,
            msgs_rx,
            errs_tx,
            errs_rx,
            cmds_tx,
            cmds_rx,
            handles: TaskHandles::default(),
            finished: Latch::new(),
            gate: ShutdownGate::default(),
            ignore_signals: Arc::new(AtomicBool::new(false)),
            catch_panics,
            session: Mutex::new(session),
        }
    }

    pub(crate) fn session(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Arc<Self> {
        let output = SharedOutput::new(Box::new(io::sink()));
        Arc::new(Self::new(Session::new(output, None, 60, false), true))
    }
}

/// Final model and how the run ended.
pub struct RunOutcome<M> {
    pub model: M,
    pub result: Result<(), ProgramError>,
}

impl<M> RunOutcome<M> {
    pub fn into_result(self) -> Result<M, ProgramError> {
        self.result.map(|()| self.model)
    }
}

impl<M: fmt::Debug> fmt::Debug for RunOutcome<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOutcome")
            .field("model", &self.model)
            .field("result", &self.result)
            .finish()
    }
}

/// A terminal program driving a [`Model`].
///
/// ```no_run
/// use tape_runtime::{Cmd, Model, Msg, Program};
///
/// struct Hello;
///
/// impl Model for Hello {
///     fn update(&mut self, msg: Msg) -> Option<Cmd> {
///         msg.as_input().map(|_| tape_runtime::command::quit())
///     }
///
///     fn view(&self) -> String {
///         "Hello! Press any key to exit.".to_string()
///     }
/// }
///
/// let outcome = Program::new(Hello).run();
/// outcome.result.expect("program failed");
/// ```
pub struct Program<M: Model> {
    model: M,
    config: ProgramConfig,
    filter: Option<Filter<M>>,
    renderer: Option<Box<dyn Renderer>>,
    shared: Arc<Shared>,
    _log: Option<LogGuard>,
}

impl<M: Model> Program<M> {
    pub fn new(model: M) -> Self {
        Self::build(model, ProgramConfig::default())
    }

    pub fn with_config(model: M, config: ProgramConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(model, config))
    }

    fn build(model: M, mut config: ProgramConfig) -> Self {
        let env = EnvConfig::from_env();
        let log = env
            .trace_path
            .as_ref()
            .and_then(|path| logging::log_to_file(path, "tape ").ok());

        let (output, output_fd): (SharedOutput, Option<RawFd>) =
            match mem::take(&mut config.output) {
                OutputTarget::Stdout => (
                    SharedOutput::new(Box::new(io::stdout())),
                    is_terminal(STDOUT_FD).then_some(STDOUT_FD),
                ),
                OutputTarget::Writer(writer) => (SharedOutput::new(writer), None),
            };
        output.set_trace(env.trace_output);

        let session = Session::new(output, output_fd, config.effective_fps(), env.trace_input);
        let shared = Arc::new(Shared::new(session, config.catch_panics));
        Self {
            model,
            config,
            filter: None,
            renderer: None,
            shared,
            _log: log,
        }
    }

    /// Inspect, replace, or drop (`None`) every message before the runtime and model see it.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: FnMut(&M, Msg) -> Option<Msg> + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Use a custom renderer instead of [`StandardRenderer`].
    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    pub fn handle(&self) -> ProgramHandle {
        ProgramHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Run until the model quits or the program is interrupted or killed.
    ///
    /// The terminal is restored before this returns, whatever the outcome.
    pub fn run(mut self) -> RunOutcome<M> {
        let shared = Arc::clone(&self.shared);
        let _hook = shared.catch_panics.then(panic_hook::install);

        let result = if shared.catch_panics {
            match panic_hook::catch(|| self.run_inner()) {
                Ok(result) => result,
                Err(report) => {
                    recover_from_panic(&shared, report);
                    Err(ProgramError::Killed(KillReason::Panic))
                }
            }
        } else {
            self.run_inner()
        };

        if let Err(err) = &result {
            tracing::debug!(error = %err, "program finished with error");
        }
        RunOutcome {
            model: self.model,
            result,
        }
    }

    fn run_inner(&mut self) -> Result<(), ProgramError> {
        let shared = Arc::clone(&self.shared);
        if shared.ctx.is_cancelled() {
            return Err(killed_error(&shared));
        }
        if let Err(err) = self.start() {
            tracing::error!(error = %err, "program startup failed");
            shutdown(&shared, true);
            return Err(err);
        }

        let mut filter = self.filter.take();
        let result = EventLoop::new(&shared, &mut self.model, filter.as_mut()).run();
        self.filter = filter;

        let killed = shared.ctx.is_cancelled() || result.is_err();
        let result = match result {
            Ok(()) if killed => Err(killed_error(&shared)),
            other => other,
        };
        if !killed {
            EventLoop::new(&shared, &mut self.model, None).render();
        }
        shutdown(&shared, killed);
        result
    }

    fn start(&mut self) -> Result<(), ProgramError> {
        let shared = Arc::clone(&self.shared);
        let config = &mut self.config;

        let input =
            InputHandle::open(mem::take(&mut config.input)).map_err(ProgramError::TerminalInit)?;
        shared.session().set_input(input);

        if config.signal_handler {
            spawn_signal_handler(&shared);
        }
        if let Some(parent) = config.context.take() {
            spawn_context_watcher(&shared, parent);
        }

        let environ = config.environ_or_process();
        {
            let mut session = shared.session();
            if shared.ctx.is_cancelled() {
                // Killed during startup; the teardown already ran or is waiting for this lock.
                return Err(killed_error(&shared));
            }
            session
                .enter_raw_mode()
                .map_err(ProgramError::TerminalInit)?;

            let renderer = self
                .renderer
                .take()
                .unwrap_or_else(|| Box::new(StandardRenderer::new(session.output().clone())));
            session.set_renderer(renderer);

            let output_fd = session.output_fd();
            let profile = config
                .color_profile
                .unwrap_or_else(|| ColorProfile::detect(&environ, output_fd.is_some()));
            session.set_profile(profile);
            shared.bus.send_detached(Msg::ColorProfile(profile));

            let size = match output_fd {
                Some(fd) => {
                    Some(process_terminal::window_size(fd).map_err(ProgramError::TerminalInit)?)
                }
                None => config.window_size,
            };
            if let Some((width, height)) = size {
                session.resize(width, height);
                shared.bus.send_detached(Msg::WindowSize { width, height });
            }
            shared.bus.send_detached(Msg::Env(environ));

            session
                .start_reader(&shared.bus, &shared.errs_tx)
                .map_err(ProgramError::TerminalInit)?;

            session.disable_mode(Mode::TEXT_CURSOR_ENABLE);
            if let Some(title) = &config.title {
                session.execute(TerminalCmd::SetWindowTitle(title.clone()));
            }
            if config.alt_screen {
                session.enable_mode(Mode::ALT_SCREEN_SAVE_CURSOR);
            }
            if config.bracketed_paste {
                session.enable_mode(Mode::BRACKETED_PASTE);
            }
            if config.grapheme_clustering {
                session.enable_mode(Mode::GRAPHEME_CLUSTERING);
            }
            match config.mouse {
                MouseMode::CellMotion => session.enable_mouse(Mode::BUTTON_EVENT_MOUSE),
                MouseMode::AllMotion => session.enable_mouse(Mode::ANY_EVENT_MOUSE),
                MouseMode::None => {}
            }
            if config.report_focus {
                session.enable_mode(Mode::FOCUS_EVENT);
            }
            if let Some(enhancements) = config.keyboard_enhancements {
                session.request_keyboard(enhancements, &shared.bus);
            }

            session.start_scheduler(Recovery::new(&shared).runner());
        }
        tracing::debug!("program started");

        if let Some(cmd) = self.model.init() {
            let cmds = shared.cmds_tx.clone();
            let ctx = shared.ctx.clone();
            shared.handles.spawn("init", move || {
                select! {
                    send(cmds, cmd) -> _ => {}
                    recv(ctx.done()) -> _ => {}
                }
            });
        }

        EventLoop::new(&shared, &mut self.model, None).render();
        spawn_resize_watcher(&shared);
        executor::spawn_dispatcher(&shared);
        Ok(())
    }
}

fn killed_error(shared: &Shared) -> ProgramError {
    ProgramError::Killed(shared.ctx.reason().unwrap_or(KillReason::Killed))
}

/// SIGINT becomes `Interrupt`, SIGTERM becomes `Quit`. Only the first delivered signal
/// is forwarded.
fn spawn_signal_handler(shared: &Shared) {
    let stream = match SignalStream::new(&[SignalKind::Interrupt, SignalKind::Terminate]) {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(error = %err, "failed to install signal handler");
            return;
        }
    };
    let closer = stream.closer();
    shared.ctx.on_cancel(move || closer.close());

    let bus = shared.bus.clone();
    let ignore = Arc::clone(&shared.ignore_signals);
    shared.handles.spawn("signals", move || {
        stream.for_each(|kind| {
            if ignore.load(Ordering::SeqCst) {
                return true;
            }
            let msg = match kind {
                SignalKind::Interrupt => Msg::Interrupt,
                SignalKind::Terminate => Msg::Quit,
                _ => return true,
            };
            tracing::debug!(?kind, "signal received");
            bus.send(msg);
            false
        });
    });
}

fn spawn_resize_watcher(shared: &Shared) {
    let Some(output_fd) = shared.session().output_fd() else {
        return;
    };
    let stream = match SignalStream::new(&[SignalKind::WindowChange]) {
        Ok(stream) => stream,
        Err(err) => {
            tracing::debug!(error = %err, "window size changes will not be reported");
            return;
        }
    };
    let closer = stream.closer();
    shared.ctx.on_cancel(move || closer.close());

    let bus = shared.bus.clone();
    shared.handles.spawn("resize", move || {
        stream.for_each(|_| {
            check_resize(&bus, Some(output_fd));
            true
        });
    });
}

fn spawn_context_watcher(shared: &Shared, parent: Context) {
    let ctx = shared.ctx.clone();
    shared.handles.spawn("context", move || {
        select! {
            recv(parent.done()) -> _ => {
                tracing::debug!("parent context cancelled");
                ctx.cancel_with(KillReason::ContextCancelled);
            }
            recv(ctx.done()) -> _ => {}
        }
    });
}

/// Thread-safe control over a running [`Program`].
#[derive(Clone)]
pub struct ProgramHandle {
    shared: Arc<Shared>,
}

impl fmt::Debug for ProgramHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramHandle")
            .field("context", &self.shared.ctx)
            .finish()
    }
}

impl ProgramHandle {
    /// Deliver `msg` to the event loop, blocking until it is taken.
    /// Does nothing once the program has stopped.
    pub fn send(&self, msg: Msg) {
        self.shared.bus.send(msg);
    }

    /// Ask the program to exit gracefully.
    pub fn quit(&self) {
        self.send(Msg::Quit);
    }

    /// Stop immediately: no final render, and `run` returns `Killed`.
    pub fn kill(&self) {
        self.shared.ctx.cancel_with(KillReason::Killed);
        shutdown(&self.shared, true);
    }

    /// Block until the program has shut down gracefully. Never returns after a kill.
    pub fn wait(&self) {
        self.shared.finished.wait();
    }

    /// Print a line above the program's output. Ignored on the alternate screen.
    pub fn println(&self, text: impl Into<String>) {
        self.send(Msg::Println(text.into()));
    }

    pub fn printf(&self, args: fmt::Arguments<'_>) {
        self.println(args.to_string());
    }

    /// Give the terminal back temporarily, e.g. to run an editor.
    pub fn release_terminal(&self) -> io::Result<()> {
        session::release_terminal(&self.shared)
    }

    /// Take the terminal back after [`ProgramHandle::release_terminal`].
    pub fn restore_terminal(&self) -> io::Result<()> {
        session::restore_terminal(&self.shared)
    }
}
