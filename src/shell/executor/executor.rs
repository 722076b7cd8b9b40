use std::os::fd::OwnedFd;

use log::{debug, error};
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use super::launch::{exit_now, launch, Spawned};
use crate::shell::parser::{CommandList, ControlOp};

/// Result of running one pipeline. `NotLaunched` means no process was ever
/// created (a builtin-only pipeline); it is distinct from every real exit
/// status and never counts as a successful exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    NotLaunched,
    Exited(i32),
    Signaled(i32),
}

impl ExitStatus {
    pub fn is_success(self) -> bool {
        self == ExitStatus::Exited(0)
    }
}

pub struct Executor;

impl Executor {
    pub fn new() -> Self {
        Self
    }

    /// Runs one full input line: splits it into `;`/`&`-terminated jobs and
    /// runs each in order. A `;` job runs synchronously; an `&` job runs in
    /// a forked duplicate of the shell, which the parent never waits for.
    /// Finished background children from earlier lines are reaped at the end.
    pub fn run_line(&self, list: &mut CommandList) {
        let mut head = 0;
        while head < list.len() {
            let end = job_end(list, head);
            if list.commands[end].op == ControlOp::Background {
                match unsafe { fork() } {
                    Ok(ForkResult::Child) => {
                        // Child branch: run the chain and terminate.
                        // Control must never reach the parent's loop.
                        self.run_chain(list, head);
                        exit_now(0);
                    }
                    Ok(ForkResult::Parent { child }) => {
                        debug!("job in background as pid {}", child);
                    }
                    Err(err) => {
                        error!("cannot fork background job: {}", err);
                        eprintln!("sh61: cannot fork: {}", err);
                    }
                }
            } else {
                self.run_chain(list, head);
            }
            head = end + 1;
        }
        reap_children();
    }

    /// Runs a conditional chain starting at `head`: pipelines connected by
    /// `&&`/`||`. After each pipeline the status decides whether the next
    /// one runs; a skipped pipeline leaves the status untouched, so the
    /// following operator is evaluated against the last status actually
    /// observed (`a && b || c` runs `c` on `a`'s failure even though `b`
    /// never ran).
    fn run_chain(&self, list: &mut CommandList, head: usize) {
        let mut head = head;
        loop {
            let status = self.run_pipeline(list, head);

            // Walk to the operator closing this pipeline, then keep
            // skipping pipelines until one is allowed to run.
            let mut scan = head;
            loop {
                while list.commands[scan].op == ControlOp::Pipe {
                    scan += 1;
                }
                let op = list.commands[scan].op;
                if matches!(op, ControlOp::Sequence | ControlOp::Background) {
                    return;
                }
                // The next command exists: a well-formed list never ends
                // on an `&&`/`||` tag.
                scan += 1;
                let resume = match op {
                    ControlOp::And => status.is_success(),
                    _ => !status.is_success(),
                };
                if resume {
                    head = scan;
                    break;
                }
                debug!("skipping pipeline at {} (stale status {:?})", scan, status);
            }
        }
    }

    /// Runs one pipeline starting at `head`. Every stage is launched before
    /// any wait happens, so all stages execute concurrently; the pipe read
    /// end produced by each launch is threaded into the next one. Only the
    /// last stage's pid is retained and waited on; its status is the
    /// pipeline's status.
    fn run_pipeline(&self, list: &mut CommandList, head: usize) -> ExitStatus {
        let mut idx = head;
        let mut upstream: Option<OwnedFd> = None;
        let mut last: Option<Pid> = None;

        loop {
            let cmd = &mut list.commands[idx];
            let is_pipe = cmd.op == ControlOp::Pipe;
            match launch(cmd, upstream.take()) {
                Ok((spawned, downstream)) => {
                    upstream = downstream;
                    last = match spawned {
                        Spawned::Child(pid) => Some(pid),
                        Spawned::Builtin { ok } => {
                            debug!("builtin `{}` -> ok={}", cmd.program(), ok);
                            None
                        }
                    };
                }
                Err(err) => {
                    // Pipe or fork creation failed. Report and keep the
                    // shell alive; the stage counts as never launched.
                    error!("cannot launch `{}`: {}", cmd.program(), err);
                    eprintln!("sh61: {}: {}", cmd.program(), err);
                    last = None;
                }
            }
            if !is_pipe {
                break;
            }
            idx += 1;
        }

        match last {
            Some(pid) => wait_for(pid),
            None => ExitStatus::NotLaunched,
        }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

/// Index of the command carrying this job's `;`/`&` terminator tag. The
/// scan passes straight through pipeline and conditional tags.
fn job_end(list: &CommandList, head: usize) -> usize {
    let mut idx = head;
    while !matches!(
        list.commands[idx].op,
        ControlOp::Sequence | ControlOp::Background
    ) {
        idx += 1;
    }
    idx
}

/// Blocks until `pid` terminates and maps the raw wait status.
fn wait_for(pid: Pid) -> ExitStatus {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return ExitStatus::Exited(code),
            Ok(WaitStatus::Signaled(_, sig, _)) => return ExitStatus::Signaled(sig as i32),
            Ok(other) => {
                debug!("waitpid({}): transient status {:?}", pid, other);
            }
            Err(Errno::EINTR) => continue,
            Err(err) => {
                error!("waitpid({}) failed: {}", pid, err);
                return ExitStatus::Exited(1);
            }
        }
    }
}

/// Collects any finished children without blocking, so background jobs do
/// not linger as zombies.
fn reap_children() {
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(status) => debug!("reaped stray child: {:?}", status),
            Err(_) => break,
        }
    }
}
