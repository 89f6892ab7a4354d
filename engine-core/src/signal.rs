//! Process-wide interrupt flag and the service that installs the `SIGINT` handler.
//!
//! Every runner's loop polls [`is_interrupted`] once per iteration; there is exactly one
//! flag for the whole process; a runner started after `SIGINT` has already fired sees it
//! immediately rather than waiting for a fresh signal.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::error::{EngineError, EngineResult};
use crate::runner::RunnerContext;
use crate::service::{kind, Service, ServiceKind};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_signum: i32) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install the process-wide `SIGINT` handler. Safe to call more than once (the last
/// registration wins, matching plain `signal(2)` semantics).
pub fn install() -> EngineResult<()> {
    let action = SigAction::new(SigHandler::Handler(on_sigint), SaFlags::empty(), SigSet::empty());
    // SAFETY: `on_sigint` only stores to an `AtomicBool`, which is async-signal-safe.
    unsafe { signal::sigaction(Signal::SIGINT, &action) }
        .map_err(|errno| EngineError::os_error(errno as i32, "sigaction(SIGINT)"))?;
    Ok(())
}

/// Restore the platform default `SIGINT` disposition.
pub fn uninstall() -> EngineResult<()> {
    let action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    // SAFETY: installing the default disposition runs no handler at all.
    unsafe { signal::sigaction(Signal::SIGINT, &action) }
        .map_err(|errno| EngineError::os_error(errno as i32, "sigaction(SIGINT)"))?;
    Ok(())
}

#[must_use]
pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Test-only: clear the flag so unrelated tests in the same process don't observe a
/// `SIGINT` raised by an earlier one.
#[cfg(any(test, feature = "test-util"))]
pub fn reset_for_test() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// The built-in service that installs the handler during `OnCreate`. Every runner that
/// wants its loop to observe `SIGINT` registers one of these; registering it on more
/// than one runner is harmless since the flag is process-wide.
#[derive(Default)]
pub struct SignalService;

impl SignalService {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Service for SignalService {
    fn kind(&self) -> ServiceKind {
        kind::SIGNAL
    }

    fn on_create(&mut self, _ctx: &mut RunnerContext) -> EngineResult<()> {
        install()
    }

    fn on_destroy(&mut self, _ctx: &mut RunnerContext) {
        let _ = uninstall();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uninterrupted() {
        reset_for_test();
        assert!(!is_interrupted());
    }

    #[test]
    fn handler_sets_flag() {
        reset_for_test();
        on_sigint(Signal::SIGINT as i32);
        assert!(is_interrupted());
        reset_for_test();
    }

    #[test]
    fn uninstall_restores_default_disposition() {
        let probe = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());

        install().unwrap();
        // SAFETY: swapping in a probe disposition only to read back the previous one.
        let before = unsafe { signal::sigaction(Signal::SIGINT, &probe) }.unwrap();
        assert!(matches!(before.handler(), SigHandler::Handler(_)));

        uninstall().unwrap();
        // SAFETY: same probe, read back what `uninstall` left in place.
        let after = unsafe { signal::sigaction(Signal::SIGINT, &probe) }.unwrap();
        assert!(matches!(after.handler(), SigHandler::SigDfl));

        // SAFETY: restoring a harmless disposition after the assertions above.
        unsafe {
            signal::sigaction(Signal::SIGINT, &SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty())).unwrap();
        }
    }
}
