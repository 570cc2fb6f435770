//! Cooperative stop/resume flags for the session loop.
//!
//! OS signals set the same flags via `signal-hook` (feature `signals`):
//! SIGTERM/SIGINT request a stop, SIGUSR1 requests a resume. The loop polls
//! the flags between steps rather than blocking on signals.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Poll interval while sleeping or waiting on a pause.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Default)]
pub struct SessionControl {
    stop: Arc<AtomicBool>,
    resume: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<String>>>,
}

impl SessionControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self, reason: impl Into<String>) {
        let mut current = self.reason.lock();
        if current.is_none() {
            *current = Some(reason.into());
        }
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Why the stop was requested; signal-initiated stops report `"signal"`.
    pub fn stop_reason(&self) -> Option<String> {
        if let Some(reason) = self.reason.lock().clone() {
            return Some(reason);
        }
        self.should_stop().then(|| "signal".to_string())
    }

    pub fn request_resume(&self) {
        self.resume.store(true, Ordering::Relaxed);
    }

    /// Check (and clear) a pending resume request.
    pub fn take_resume_request(&self) -> bool {
        self.resume.swap(false, Ordering::Relaxed)
    }

    /// Flag for `signal_hook::flag::register`.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn resume_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.resume)
    }

    /// Sleep for `duration` unless a stop arrives. Returns `false` if stopped.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.should_stop() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(POLL_INTERVAL));
        }
    }

    /// Route SIGTERM/SIGINT to stop and SIGUSR1 to resume.
    ///
    /// Registration is best-effort; failures are logged to stderr.
    #[cfg(feature = "signals")]
    pub fn register_signals(&self) {
        use signal_hook::consts::{SIGINT, SIGTERM};

        if let Err(e) = signal_hook::flag::register(SIGTERM, self.stop_flag()) {
            eprintln!("[SEN-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, self.stop_flag()) {
            eprintln!("[SEN-SIGNAL] failed to register SIGINT: {e}");
        }
        #[cfg(unix)]
        {
            use signal_hook::consts::SIGUSR1;
            if let Err(e) = signal_hook::flag::register(SIGUSR1, self.resume_flag()) {
                eprintln!("[SEN-SIGNAL] failed to register SIGUSR1: {e}");
            }
        }
    }
}
