//! The message bus: an unbuffered handoff to the event loop that gives up on cancellation.

use std::thread;

use crossbeam_channel::{select, Sender};

use crate::core::message::Msg;
use crate::runtime::context::Context;

#[derive(Clone)]
pub(crate) struct Bus {
    msgs: Sender<Msg>,
    ctx: Context,
}

impl Bus {
    pub(crate) fn new(msgs: Sender<Msg>, ctx: Context) -> Self {
        Self { msgs, ctx }
    }

    pub(crate) fn context(&self) -> &Context {
        &self.ctx
    }

    /// Block until the loop takes `msg`. Returns `false` if the program stopped first.
    pub(crate) fn send(&self, msg: Msg) -> bool {
        if self.ctx.is_cancelled() {
            return false;
        }
        select! {
            send(self.msgs, msg) -> sent => sent.is_ok(),
            recv(self.ctx.done()) -> _ => false,
        }
    }

    /// Deliver from a separate thread so the caller (usually the loop itself) never blocks.
    pub(crate) fn send_detached(&self, msg: Msg) {
        let bus = self.clone();
        let spawned = thread::Builder::new()
            .name("tape-send".to_string())
            .spawn(move || {
                bus.send(msg);
            });
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "failed to spawn message sender");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use crossbeam_channel::bounded;

    use super::Bus;
    use crate::core::message::Msg;
    use crate::runtime::context::Context;

    #[test]
    fn send_hands_off_to_receiver() {
        let (tx, rx) = bounded(0);
        let bus = Bus::new(tx, Context::new());
        bus.send_detached(Msg::Quit);
        let msg = rx.recv_timeout(Duration::from_secs(2)).expect("message");
        assert!(matches!(msg, Msg::Quit));
    }

    #[test]
    fn send_after_cancel_returns_immediately() {
        let (tx, _rx) = bounded(0);
        let ctx = Context::new();
        let bus = Bus::new(tx, ctx.clone());
        ctx.cancel();
        let start = Instant::now();
        assert!(!bus.send(Msg::Quit));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn blocked_send_is_released_by_cancel() {
        let (tx, _rx) = bounded(0);
        let ctx = Context::new();
        let bus = Bus::new(tx, ctx.clone());
        let sender = std::thread::spawn(move || bus.send(Msg::Quit));
        std::thread::sleep(Duration::from_millis(20));
        ctx.cancel();
        assert!(!sender.join().expect("sender"));
    }
}
