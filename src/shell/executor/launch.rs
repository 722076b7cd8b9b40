use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use log::debug;
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{chdir, dup2, execvp, fork, pipe, ForkResult, Pid};

use crate::shell::parser::{Command, ControlOp};

/// What `launch` did for one command.
pub enum Spawned {
    /// A child process was created; its pid is recorded on the node.
    Child(Pid),
    /// The command ran inside the shell process (`cd`); no child exists.
    Builtin { ok: bool },
}

/// Terminate the current process immediately, without unwinding, flushing,
/// or running any cleanup that belongs to the parent shell. This is the
/// only way out of the child branch of a fork; everything else must return
/// normally to the caller.
pub fn exit_now(status: i32) -> ! {
    unsafe { libc::_exit(status) }
}

/// Launches a single command.
///
/// If the command is tagged `Pipe`, a fresh pipe is created here; the write
/// end becomes the child's default stdout and the read end is handed back to
/// the caller for the next stage. `upstream` is the read end of the previous
/// stage's pipe, if any; it becomes the child's default stdin. Explicit
/// redirections are applied in the child after the pipe ends, so they
/// override pipe-supplied defaults on the same stream.
///
/// Returns only in the parent. The parent's copies of the write end and the
/// consumed upstream read end are closed before returning; a leaked write
/// end would keep the downstream reader from ever seeing end-of-input.
pub fn launch(
    cmd: &mut Command,
    upstream: Option<OwnedFd>,
) -> nix::Result<(Spawned, Option<OwnedFd>)> {
    debug_assert!(!cmd.args.is_empty());
    debug_assert!(cmd.pid.is_none());

    // `cd` must change the shell's own working directory, so it never
    // forks. Any upstream fd is dropped (closed) on return.
    if cmd.program() == "cd" {
        let ok = builtin_cd(&cmd.args);
        return Ok((Spawned::Builtin { ok }, None));
    }

    let (pipe_read, pipe_write) = if cmd.op == ControlOp::Pipe {
        let (r, w) = pipe()?;
        (Some(r), Some(w))
    } else {
        (None, None)
    };

    match unsafe { fork() }? {
        ForkResult::Child => child_exec(cmd, upstream, pipe_read, pipe_write),
        ForkResult::Parent { child } => {
            drop(pipe_write);
            drop(upstream);
            cmd.pid = Some(child.as_raw());
            debug!("launched `{}` as pid {}", cmd.program(), child);
            Ok((Spawned::Child(child), pipe_read))
        }
    }
}

/// Child-side entry point: wires file descriptors, then replaces the
/// process image. Never returns; every failure path ends in `exit_now`.
fn child_exec(
    cmd: &Command,
    upstream: Option<OwnedFd>,
    pipe_read: Option<OwnedFd>,
    pipe_write: Option<OwnedFd>,
) -> ! {
    // Pipe ends first, explicit redirections after, so a `>` on a pipeline
    // stage wins over the pipe's write end.
    if let Some(w) = &pipe_write {
        if dup2(w.as_raw_fd(), libc::STDOUT_FILENO).is_err() {
            fail("cannot set up pipe");
        }
    }
    // This child is neither the reader of its own output pipe nor a user
    // of the raw ends once stdout points at the write end.
    drop(pipe_write);
    drop(pipe_read);

    if let Some(r) = &upstream {
        if dup2(r.as_raw_fd(), libc::STDIN_FILENO).is_err() {
            fail("cannot set up pipe");
        }
    }
    drop(upstream);

    if let Some(path) = &cmd.redirections.stdin {
        redirect(path, OFlag::O_RDONLY, libc::STDIN_FILENO);
    }
    if let Some(path) = &cmd.redirections.stdout {
        redirect(
            path,
            OFlag::O_CREAT | OFlag::O_WRONLY | OFlag::O_TRUNC,
            libc::STDOUT_FILENO,
        );
    }
    if let Some(path) = &cmd.redirections.stderr {
        redirect(
            path,
            OFlag::O_CREAT | OFlag::O_WRONLY | OFlag::O_TRUNC,
            libc::STDERR_FILENO,
        );
    }

    let args: Vec<CString> = match cmd
        .args
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect()
    {
        Ok(args) => args,
        Err(_) => fail("argument contains a NUL byte"),
    };

    // Only reachable if exec itself failed.
    let err = match execvp(&args[0], &args) {
        Err(err) => err,
        Ok(infallible) => match infallible {},
    };
    eprintln!("sh61: {}: {}", cmd.program(), err);
    exit_now(1)
}

/// Opens `path` and installs it as `target_fd`. Child-side only; an open
/// failure is the command's own failure, reported on stderr and turned
/// into exit status 1, never seen by the shell as anything else.
fn redirect(path: &str, flags: OFlag, target_fd: RawFd) {
    let fd = match open(path, flags, Mode::S_IRWXU) {
        Ok(fd) => fd,
        Err(_) => {
            eprintln!("No such file or directory");
            exit_now(1);
        }
    };
    if dup2(fd, target_fd).is_err() {
        fail("cannot redirect");
    }
    let _ = nix::unistd::close(fd);
}

fn fail(msg: &str) -> ! {
    eprintln!("sh61: {}", msg);
    exit_now(1)
}

/// The `cd` builtin. Runs in the shell's own process and reports success
/// or failure locally instead of spawning anything.
fn builtin_cd(args: &[String]) -> bool {
    let Some(target) = args.get(1) else {
        eprintln!("sh61: cd: missing argument");
        return false;
    };
    let path = shellexpand::tilde(target);
    match chdir(path.as_ref()) {
        Ok(()) => true,
        Err(err) => {
            eprintln!("sh61: cd: {}: {}", target, err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cd_without_argument_fails() {
        assert!(!builtin_cd(&["cd".to_string()]));
    }

    #[test]
    fn test_cd_to_missing_directory_fails() {
        assert!(!builtin_cd(&[
            "cd".to_string(),
            "/nonexistent-sh61-test-dir".to_string()
        ]));
    }
}
