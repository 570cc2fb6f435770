//! Operator control: the pause gate, unattended mode and the one pending
//! continuation.
//!
//! The handle is cloneable. The driver thread blocks in
//! [`OperatorHandle::wait_while_paused`] while an operator thread (a CLI, a
//! signal handler, a test) calls [`OperatorHandle::resume`]. The continuation
//! is never part of any snapshot or persisted state.

#![allow(missing_docs)]

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Work deferred until the operator resumes.
pub type Continuation = Box<dyn FnOnce() + Send + 'static>;

struct ControlState {
    paused: bool,
    unattended: bool,
    continuation: Option<Continuation>,
}

struct Shared {
    state: Mutex<ControlState>,
    resumed: Condvar,
}

#[derive(Clone)]
pub struct OperatorHandle {
    shared: Arc<Shared>,
}

impl fmt::Debug for OperatorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("OperatorHandle")
            .field("paused", &state.paused)
            .field("unattended", &state.unattended)
            .field("has_continuation", &state.continuation.is_some())
            .finish()
    }
}

impl Default for OperatorHandle {
    fn default() -> Self {
        Self::new(false)
    }
}

impl OperatorHandle {
    pub fn new(unattended: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ControlState {
                    paused: false,
                    unattended,
                    continuation: None,
                }),
                resumed: Condvar::new(),
            }),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    pub fn is_unattended(&self) -> bool {
        self.shared.state.lock().unattended
    }

    /// Enter the paused state. Returns `false` if already paused.
    pub fn pause(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.paused {
            return false;
        }
        state.paused = true;
        true
    }

    /// Store the continuation to run on resume.
    ///
    /// A second park overwrites the first. When not paused the continuation
    /// runs immediately.
    pub fn park(&self, continuation: Continuation) {
        let mut state = self.shared.state.lock();
        if !state.paused {
            drop(state);
            continuation();
            return;
        }
        if state.continuation.is_some() {
            eprintln!("[SEN-MONITOR] WARNING: replacing a pending continuation that never ran");
        }
        state.continuation = Some(continuation);
    }

    pub fn has_continuation(&self) -> bool {
        self.shared.state.lock().continuation.is_some()
    }

    /// Clear the pause and fire the pending continuation exactly once.
    ///
    /// Returns `false` (and does nothing) when not paused.
    pub fn resume(&self) -> bool {
        let continuation = {
            let mut state = self.shared.state.lock();
            if !state.paused {
                return false;
            }
            state.paused = false;
            self.shared.resumed.notify_all();
            state.continuation.take()
        };
        if let Some(continuation) = continuation {
            continuation();
        }
        true
    }

    /// Block until not paused.
    pub fn wait_while_paused(&self) {
        let mut state = self.shared.state.lock();
        while state.paused {
            self.shared.resumed.wait(&mut state);
        }
    }

    /// Block until not paused or `timeout` elapses. Returns `true` if no
    /// longer paused.
    pub fn wait_while_paused_for(&self, timeout: Duration) -> bool {
        let mut state = self.shared.state.lock();
        if state.paused {
            let _ = self.shared.resumed.wait_for(&mut state, timeout);
        }
        !state.paused
    }

    /// Switch to unattended mode; a current pause is released.
    pub fn enable_unattended_mode(&self) {
        self.shared.state.lock().unattended = true;
        self.resume();
    }

    pub fn disable_unattended_mode(&self) {
        self.shared.state.lock().unattended = false;
    }
}
