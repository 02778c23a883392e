//! Runs commands off the event loop and feeds their messages back through the bus.

use std::sync::Arc;

use crossbeam_channel::{bounded, select};

use crate::core::command::Cmd;
use crate::core::message::Msg;
use crate::runtime::bus::Bus;
use crate::runtime::program::Shared;
use crate::runtime::shutdown::Recovery;

/// Start the dispatcher: every command received on the command channel runs on its own
/// thread until the program stops.
pub(crate) fn spawn_dispatcher(shared: &Arc<Shared>) {
    let cmds = shared.cmds_rx.clone();
    let ctx = shared.ctx.clone();
    let bus = shared.bus.clone();
    let recovery = Recovery::new(shared);
    shared.handles.spawn("commands", move || loop {
        select! {
            recv(ctx.done()) -> _ => return,
            recv(cmds) -> cmd => match cmd {
                Ok(cmd) => spawn_command(&recovery, &bus, cmd),
                Err(_) => return,
            },
        }
    });
}

/// Run one command concurrently. The thread is not tracked by shutdown.
pub(crate) fn spawn_command(recovery: &Recovery, bus: &Bus, cmd: Cmd) {
    let bus = bus.clone();
    recovery.spawn("cmd", move || {
        if let Some(msg) = cmd.run() {
            bus.send(msg);
        }
    });
}

/// Run `cmds` one after another on a separate thread, delivering each result before the
/// next command starts.
pub(crate) fn spawn_sequence(shared: &Arc<Shared>, cmds: Vec<Cmd>) {
    let recovery = Recovery::new(shared);
    let bus = shared.bus.clone();
    let inner = recovery.clone();
    recovery.spawn("sequence", move || run_sequence(&inner, &bus, cmds));
}

fn run_sequence(recovery: &Recovery, bus: &Bus, cmds: Vec<Cmd>) {
    for cmd in cmds {
        if bus.context().is_cancelled() {
            return;
        }
        match cmd.run() {
            None => {}
            Some(Msg::Sequence(nested)) => run_sequence(recovery, bus, nested),
            Some(Msg::Batch(batch)) => run_batch_and_wait(recovery, bus, batch),
            Some(msg) => {
                if !bus.send(msg) {
                    return;
                }
            }
        }
    }
}

/// A batch inside a sequence finishes completely before the sequence moves on.
fn run_batch_and_wait(recovery: &Recovery, bus: &Bus, batch: Vec<Cmd>) {
    let (done_tx, done_rx) = bounded::<()>(0);
    for cmd in batch {
        let bus = bus.clone();
        let done = done_tx.clone();
        recovery.spawn("cmd", move || {
            let _done = done;
            if let Some(msg) = cmd.run() {
                bus.send(msg);
            }
        });
    }
    drop(done_tx);
    // Disconnects once every batch thread has dropped its sender.
    let _ = done_rx.recv();
}
