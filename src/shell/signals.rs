use log::debug;
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::unistd::{getpgrp, tcsetpgrp};

/// Puts the shell's process group in the terminal foreground. Best-effort:
/// when stdin is not a terminal (scripted runs, tests) this fails with
/// ENOTTY and the shell carries on.
pub fn claim_foreground() {
    match tcsetpgrp(std::io::stdin(), getpgrp()) {
        Ok(()) => debug!("claimed terminal foreground"),
        Err(err) => debug!("cannot claim terminal foreground: {}", err),
    }
}

/// Ignores SIGTTOU, which would otherwise stop the shell when it touches
/// the terminal after being put in the background.
pub fn ignore_sigttou() {
    if let Err(err) = unsafe { signal(Signal::SIGTTOU, SigHandler::SigIgn) } {
        debug!("cannot ignore SIGTTOU: {}", err);
    }
}
