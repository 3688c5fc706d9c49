//! SIGINT/SIGTERM handling for the proxy: handlers only set a flag; the main
//! thread polls it.
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(unix)]
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

static GOT_TERM: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn handle_term(_sig: i32) {
    GOT_TERM.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
pub fn install_termination_handlers() {
    let act = SigAction::new(
        SigHandler::Handler(handle_term),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // The handler only touches an atomic.
    unsafe {
        let _ = signal::sigaction(Signal::SIGINT, &act);
        let _ = signal::sigaction(Signal::SIGTERM, &act);
    }
}

#[cfg(not(unix))]
pub fn install_termination_handlers() {}

pub fn termination_requested() -> bool {
    GOT_TERM.load(Ordering::SeqCst)
}
