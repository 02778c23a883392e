//! Keyboard enhancement negotiation over the kitty and modifyOtherKeys protocols.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{after, select};

use crate::core::keyboard::{KeyboardEnhancements, KeyboardReport};
use crate::core::message::Msg;
use crate::core::output::TerminalCmd;
use crate::runtime::bus::Bus;
use crate::runtime::context::Latch;

/// How long to wait for the terminal to answer an enhancement query.
pub(crate) const NEGOTIATION_TIMEOUT: Duration = Duration::from_millis(100);

/// Requested and terminal-confirmed enhancement sets.
///
/// Owned by the terminal session and only touched from the event loop.
#[derive(Default)]
pub(crate) struct Negotiator {
    requested: KeyboardEnhancements,
    active: KeyboardEnhancements,
    /// Released when the terminal answers the most recent query.
    pending: Option<Arc<Latch>>,
}

impl Negotiator {
    pub(crate) fn requested(&self) -> KeyboardEnhancements {
        self.requested
    }

    pub(crate) fn active(&self) -> KeyboardEnhancements {
        self.active
    }

    /// Merge `enhancements` into the requested set and return what to write.
    pub(crate) fn request(&mut self, enhancements: KeyboardEnhancements) -> Vec<TerminalCmd> {
        self.requested.merge(enhancements);
        tracing::debug!(
            kitty_flags = self.requested.kitty_flags,
            modify_other_keys = self.requested.modify_other_keys,
            "requesting keyboard enhancements"
        );
        self.request_commands()
    }

    /// Enable and query sequences for the whole requested set.
    pub(crate) fn request_commands(&self) -> Vec<TerminalCmd> {
        if cfg!(windows) {
            return Vec::new();
        }
        let mut cmds = Vec::new();
        if self.requested.modify_other_keys > 0 {
            cmds.push(TerminalCmd::SetModifyOtherKeys(self.requested.modify_other_keys));
            cmds.push(TerminalCmd::RequestModifyOtherKeys);
        }
        if self.requested.kitty_flags > 0 {
            cmds.push(TerminalCmd::PushKittyKeyboard(self.requested.kitty_flags));
            cmds.push(TerminalCmd::RequestKittyKeyboard);
        }
        cmds
    }

    /// Start waiting for the terminal's answer. Without one in time the model receives
    /// an empty enhancement set.
    pub(crate) fn await_report(&mut self, bus: &Bus) {
        if cfg!(windows) {
            bus.send_detached(Msg::KeyboardEnhancements(KeyboardEnhancements::full()));
            return;
        }

        let ack = Arc::new(Latch::new());
        if let Some(previous) = self.pending.replace(Arc::clone(&ack)) {
            // A newer query supersedes it; its waiter exits quietly.
            previous.release();
        }
        let bus = bus.clone();
        let spawned = thread::Builder::new()
            .name("tape-keyboard".to_string())
            .spawn(move || {
                select! {
                    recv(ack.receiver()) -> _ => {}
                    recv(bus.context().done()) -> _ => {}
                    recv(after(NEGOTIATION_TIMEOUT)) -> _ => {
                        if !ack.is_released() {
                            tracing::debug!("keyboard enhancement query timed out");
                            bus.send(Msg::KeyboardEnhancements(KeyboardEnhancements::default()));
                        }
                    }
                }
            });
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "failed to start keyboard negotiation timer");
        }
    }

    fn acknowledge(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.release();
        }
    }

    /// Fold one protocol response into the active set.
    pub(crate) fn apply_report(&mut self, report: KeyboardReport) -> KeyboardEnhancements {
        report.apply_to(&mut self.active);
        self.acknowledge();
        tracing::debug!(?report, active = ?self.active, "keyboard enhancement report");
        self.active
    }

    /// Replace the active set, e.g. after a negotiation timeout.
    pub(crate) fn set_active(&mut self, enhancements: KeyboardEnhancements) {
        self.active = enhancements;
        self.acknowledge();
    }

    /// Reset both channels. Only active channels are written to.
    pub(crate) fn disable(&mut self) -> Vec<TerminalCmd> {
        let mut cmds = Vec::new();
        if self.active.modify_other_keys > 0 {
            cmds.push(TerminalCmd::ResetModifyOtherKeys);
        }
        if self.active.kitty_flags > 0 {
            cmds.push(TerminalCmd::DisableKittyKeyboard);
        }
        self.active = KeyboardEnhancements::default();
        self.requested = KeyboardEnhancements::default();
        cmds
    }

    /// Sequences that undo anything requested or confirmed, for terminal teardown.
    pub(crate) fn teardown_commands(&self) -> Vec<TerminalCmd> {
        let mut cmds = Vec::new();
        if self.active.modify_other_keys > 0 || self.requested.modify_other_keys > 0 {
            cmds.push(TerminalCmd::ResetModifyOtherKeys);
        }
        if self.active.kitty_flags > 0 || self.requested.kitty_flags > 0 {
            cmds.push(TerminalCmd::DisableKittyKeyboard);
        }
        cmds
    }
}

#[cfg(all(test, not(windows)))]
mod tests {
    use std::time::{Duration, Instant};

    use crossbeam_channel::bounded;
    use pretty_assertions::assert_eq;

    use super::{Negotiator, NEGOTIATION_TIMEOUT};
    use crate::core::keyboard::{kitty, KeyboardEnhancements, KeyboardReport};
    use crate::core::message::Msg;
    use crate::core::output::TerminalCmd;
    use crate::runtime::bus::Bus;
    use crate::runtime::context::Context;

    #[test]
    fn requests_merge_before_sequences_are_written() {
        let mut negotiator = Negotiator::default();
        negotiator.request(KeyboardEnhancements::new(kitty::REPORT_EVENT_TYPES, 0));
        let cmds = negotiator.request(KeyboardEnhancements::new(
            kitty::DISAMBIGUATE_ESCAPE_CODES,
            1,
        ));
        assert_eq!(negotiator.requested(), KeyboardEnhancements::new(3, 1));
        assert_eq!(
            cmds,
            vec![
                TerminalCmd::SetModifyOtherKeys(1),
                TerminalCmd::RequestModifyOtherKeys,
                TerminalCmd::PushKittyKeyboard(3),
                TerminalCmd::RequestKittyKeyboard,
            ]
        );
    }

    #[test]
    fn reports_update_one_channel_each() {
        let mut negotiator = Negotiator::default();
        negotiator.apply_report(KeyboardReport::Kitty(3));
        let active = negotiator.apply_report(KeyboardReport::ModifyOtherKeys(1));
        assert_eq!(active, KeyboardEnhancements::new(3, 1));
    }

    #[test]
    fn disable_only_resets_active_channels() {
        let mut negotiator = Negotiator::default();
        negotiator.request(KeyboardEnhancements::new(kitty::DISAMBIGUATE_ESCAPE_CODES, 2));
        negotiator.apply_report(KeyboardReport::Kitty(1));

        assert_eq!(negotiator.disable(), vec![TerminalCmd::DisableKittyKeyboard]);
        assert_eq!(negotiator.requested(), KeyboardEnhancements::default());
        assert_eq!(negotiator.active(), KeyboardEnhancements::default());
        assert_eq!(negotiator.disable(), Vec::new());
    }

    #[test]
    fn teardown_covers_unconfirmed_requests() {
        let mut negotiator = Negotiator::default();
        negotiator.request(KeyboardEnhancements::new(kitty::DISAMBIGUATE_ESCAPE_CODES, 0));
        assert_eq!(
            negotiator.teardown_commands(),
            vec![TerminalCmd::DisableKittyKeyboard]
        );
    }

    #[test]
    fn silence_resolves_to_empty_set() {
        let (tx, rx) = bounded(0);
        let bus = Bus::new(tx, Context::new());
        let mut negotiator = Negotiator::default();
        negotiator.request(KeyboardEnhancements::full());

        let start = Instant::now();
        negotiator.await_report(&bus);
        let msg = rx.recv_timeout(Duration::from_secs(2)).expect("timeout report");
        assert!(start.elapsed() >= NEGOTIATION_TIMEOUT);
        match msg {
            Msg::KeyboardEnhancements(enhancements) => assert!(enhancements.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn report_cancels_timeout() {
        let (tx, rx) = bounded(0);
        let bus = Bus::new(tx, Context::new());
        let mut negotiator = Negotiator::default();
        negotiator.request(KeyboardEnhancements::full());
        negotiator.await_report(&bus);
        negotiator.apply_report(KeyboardReport::Kitty(kitty::ALL));

        assert!(rx
            .recv_timeout(NEGOTIATION_TIMEOUT + Duration::from_millis(150))
            .is_err());
    }
}
