//! Online/offline mode reconciliation
//!
//! The only writer of the mode flag. Handles are cheap clones of one shared
//! cell so in-flight authority tasks can report failures the moment they
//! resolve, and every reader sees the same answer on the next check.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::Unreachable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Online,
    Offline,
}

/// What caused a mode change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeTrigger {
    AuthorityUnreachable,
    ChannelError,
    ChannelClosed,
    ChannelOpened,
    ProbeSucceeded,
    ProbeFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub to: Mode,
    pub trigger: ModeTrigger,
}

#[derive(Debug)]
struct Inner {
    mode: Mode,
    pending: Vec<Transition>,
    offline_flips: u64,
    online_flips: u64,
}

#[derive(Debug, Clone)]
pub struct ModeReconciler {
    inner: Rc<RefCell<Inner>>,
}

impl ModeReconciler {
    /// The engine starts `Online` and lets the start-up probe correct it
    pub fn new(initial: Mode) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                mode: initial,
                pending: Vec::new(),
                offline_flips: 0,
                online_flips: 0,
            })),
        }
    }

    pub fn mode(&self) -> Mode {
        self.inner.borrow().mode
    }

    pub fn is_online(&self) -> bool {
        self.mode() == Mode::Online
    }

    fn transition(&self, to: Mode, trigger: ModeTrigger) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.mode == to {
            return false;
        }
        inner.mode = to;
        match to {
            Mode::Offline => inner.offline_flips += 1,
            Mode::Online => inner.online_flips += 1,
        }
        inner.pending.push(Transition { to, trigger });
        log::info!("Mode -> {:?} ({:?})", to, trigger);
        true
    }

    /// An authority call failed
    pub fn report_unreachable(&self, err: &Unreachable) -> bool {
        log::warn!("Authority unreachable: {err}");
        self.transition(Mode::Offline, ModeTrigger::AuthorityUnreachable)
    }

    pub fn channel_opened(&self) -> bool {
        self.transition(Mode::Online, ModeTrigger::ChannelOpened)
    }

    pub fn channel_closed(&self) -> bool {
        self.transition(Mode::Offline, ModeTrigger::ChannelClosed)
    }

    pub fn channel_error(&self) -> bool {
        self.transition(Mode::Offline, ModeTrigger::ChannelError)
    }

    pub fn probe_succeeded(&self) -> bool {
        self.transition(Mode::Online, ModeTrigger::ProbeSucceeded)
    }

    pub fn probe_failed(&self) -> bool {
        self.transition(Mode::Offline, ModeTrigger::ProbeFailed)
    }

    /// Transitions since the last call, oldest first
    pub fn take_transitions(&self) -> Vec<Transition> {
        std::mem::take(&mut self.inner.borrow_mut().pending)
    }

    pub fn offline_flips(&self) -> u64 {
        self.inner.borrow().offline_flips
    }

    pub fn online_flips(&self) -> u64 {
        self.inner.borrow().online_flips
    }
}
