//! The serialized message loop: filter, runtime interception, update, render.

use std::mem;
use std::sync::Arc;

use crossbeam_channel::select;

use crate::core::color::ColorProfile;
use crate::core::command::Cmd;
use crate::core::message::{ExecCallback, ExecCommand, Msg};
use crate::core::model::Model;
use crate::core::output::TerminalCmd;
use crate::error::ProgramError;
use crate::platform::process_terminal;
use crate::render::lock;
use crate::runtime::executor;
use crate::runtime::program::Shared;
use crate::runtime::session::{self, check_resize};

/// Rewrites or drops messages before the model sees them.
pub type Filter<M> = Box<dyn FnMut(&M, Msg) -> Option<Msg>>;

/// What the runtime did with a message.
enum Handled {
    /// Pass it on to the model.
    Forward(Msg),
    /// Fully handled; skip update and render.
    Consumed,
    /// Leave the loop.
    Exit(Result<(), ProgramError>),
}

pub(crate) struct EventLoop<'a, M: Model> {
    shared: &'a Arc<Shared>,
    model: &'a mut M,
    filter: Option<&'a mut Filter<M>>,
}

impl<'a, M: Model> EventLoop<'a, M> {
    pub(crate) fn new(
        shared: &'a Arc<Shared>,
        model: &'a mut M,
        filter: Option<&'a mut Filter<M>>,
    ) -> Self {
        Self {
            shared,
            model,
            filter,
        }
    }

    /// Process messages until the model quits, an error arrives, or the program is cancelled.
    pub(crate) fn run(&mut self) -> Result<(), ProgramError> {
        let shared = Arc::clone(self.shared);
        loop {
            select! {
                recv(shared.ctx.done()) -> _ => return Ok(()),
                recv(shared.errs_rx) -> err => {
                    if let Ok(err) = err {
                        tracing::debug!(error = %err, "event loop stopped by error");
                        return Err(err);
                    }
                }
                recv(shared.msgs_rx) -> msg => {
                    let Ok(msg) = msg else {
                        return Ok(());
                    };
                    if let Some(result) = self.dispatch(msg) {
                        return result;
                    }
                }
            }
        }
    }

    fn dispatch(&mut self, msg: Msg) -> Option<Result<(), ProgramError>> {
        let msg = match self.filter.as_deref_mut() {
            Some(filter) => filter(&*self.model, msg)?,
            None => msg,
        };
        tracing::trace!(?msg, "dispatch");

        let msg = match self.handle(msg) {
            Handled::Forward(msg) => msg,
            Handled::Consumed => return None,
            Handled::Exit(result) => return Some(result),
        };

        if let Some(cmd) = self.model.update(msg) {
            if !self.forward(cmd) {
                return Some(Ok(()));
            }
        }
        self.render();
        None
    }

    /// Hand a command to the executor. Returns `false` if the program stopped first.
    fn forward(&self, cmd: Cmd) -> bool {
        select! {
            send(self.shared.cmds_tx, cmd) -> sent => sent.is_ok(),
            recv(self.shared.ctx.done()) -> _ => false,
        }
    }

    pub(crate) fn render(&mut self) {
        let view = self.model.view();
        let cursor = self.model.cursor();
        let renderer = {
            let mut session = self.shared.session();
            session.sync_cursor_color(cursor.and_then(|cursor| cursor.color));
            session.renderer()
        };
        if let Some(renderer) = renderer {
            lock(&renderer).render(&view, cursor);
        }
    }

    fn execute(&self, cmd: TerminalCmd) {
        self.shared.session().execute(cmd);
    }

    fn handle(&mut self, mut msg: Msg) -> Handled {
        let shared = self.shared;
        match msg {
            Msg::Quit => return Handled::Exit(Ok(())),
            Msg::Interrupt => return Handled::Exit(Err(ProgramError::Interrupted)),
            Msg::Suspend => {
                if process_terminal::suspend_supported() {
                    self.suspend();
                }
                return Handled::Forward(Msg::Suspend);
            }

            Msg::Batch(cmds) => {
                for cmd in cmds {
                    if !self.forward(cmd) {
                        return Handled::Exit(Ok(()));
                    }
                }
                return Handled::Consumed;
            }
            Msg::Sequence(ref mut cmds) => executor::spawn_sequence(shared, mem::take(cmds)),
            Msg::Exec(ref mut request) => {
                if let Some((command, callback)) = request.take() {
                    self.exec(command, callback);
                }
            }

            Msg::Capability { ref name, .. } if name == "RGB" || name == "Tc" => {
                if shared.session().profile() != ColorProfile::TrueColor {
                    shared
                        .bus
                        .send_detached(Msg::ColorProfile(ColorProfile::TrueColor));
                }
            }
            Msg::ColorProfile(profile) => shared.session().set_profile(profile),
            Msg::ModeReport { mode, setting } => {
                shared.session().record_mode_report(mode, setting)
            }
            Msg::EnableMode(mode) => shared.session().enable_mode(mode),
            Msg::DisableMode(mode) => shared.session().disable_mode(mode),
            Msg::RequestMode(mode) => self.execute(TerminalCmd::RequestMode(mode)),

            Msg::EnableKeyboardEnhancements(enhancements) => shared
                .session()
                .request_keyboard(enhancements, &shared.bus),
            Msg::DisableKeyboardEnhancements => shared.session().disable_keyboard(),
            Msg::KeyboardReport(report) => {
                let active = shared.session().keyboard().apply_report(report);
                return Handled::Forward(Msg::KeyboardEnhancements(active));
            }
            Msg::KeyboardEnhancements(enhancements) => {
                shared.session().keyboard().set_active(enhancements)
            }

            Msg::SetWindowTitle(ref title) => {
                self.execute(TerminalCmd::SetWindowTitle(title.clone()))
            }
            Msg::Println(ref text) => {
                shared
                    .session()
                    .renderer_do(|renderer| renderer.insert_above(text));
            }
            Msg::Raw(ref data) => shared.session().write_raw(data),
            Msg::SetClipboard {
                selection,
                ref content,
            } => self.execute(TerminalCmd::SetClipboard(selection, content.clone())),
            Msg::ReadClipboard(selection) => {
                self.execute(TerminalCmd::RequestClipboard(selection))
            }
            Msg::SetColor { target, color } => shared.session().set_color(target, color),
            Msg::RequestColor(target) => self.execute(TerminalCmd::RequestColor(target)),
            Msg::RequestCursorPosition => self.execute(TerminalCmd::RequestCursorPosition),
            Msg::RequestTerminalVersion => self.execute(TerminalCmd::RequestTerminalVersion),
            Msg::RequestCapability(ref name) => {
                self.execute(TerminalCmd::RequestCapability(name.clone()))
            }

            Msg::WindowSize { width, height } => shared.session().resize(width, height),
            Msg::RequestWindowSize => {
                let bus = shared.bus.clone();
                let output_fd = shared.session().output_fd();
                std::thread::spawn(move || check_resize(&bus, output_fd));
            }
            Msg::ClearScreen => shared
                .session()
                .renderer_do(|renderer| renderer.clear_screen()),
            Msg::Repaint => shared.session().renderer_do(|renderer| renderer.repaint()),

            _ => {}
        }
        Handled::Forward(msg)
    }

    fn suspend(&mut self) {
        let shared = self.shared;
        if let Err(err) = session::release_terminal(shared) {
            tracing::warn!(error = %err, "failed to release terminal for suspend");
            return;
        }
        tracing::debug!("suspending");
        if let Err(err) = process_terminal::suspend_process() {
            tracing::warn!(error = %err, "failed to suspend process");
        }
        if let Err(err) = session::restore_terminal(shared) {
            tracing::warn!(error = %err, "failed to restore terminal after resume");
        }
        shared.bus.send_detached(Msg::Resume);
    }

    fn exec(&mut self, mut command: Box<dyn ExecCommand>, callback: Option<ExecCallback>) {
        let shared = self.shared;
        let notify = |result| {
            if let Some(msg) = callback.and_then(|callback| callback(result)) {
                shared.bus.send_detached(msg);
            }
        };

        if let Err(err) = session::release_terminal(shared) {
            notify(Err(err));
            return;
        }
        let result = command.run();
        if let Err(err) = session::restore_terminal(shared) {
            notify(Err(err));
            return;
        }
        notify(result);
    }
}
