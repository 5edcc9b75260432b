use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, pipe, ForkResult, Pid};
use tracing::warn;

use crate::error::{Result, ScanError};

/// Probes whether a process id still refers to a live process, the way the
/// supervisor decides whether a queue entry's handler is still running.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// `kill(pid, 0)` liveness probe: no signal is delivered, only existence and
/// permission are checked.
#[derive(Debug, Default)]
pub struct UnixProcessProbe;

impl ProcessProbe for UnixProcessProbe {
    fn is_alive(&self, pid: u32) -> bool {
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }
}

/// Sends `SIGTERM`. Used by callers that choose to terminate a handler
/// directly rather than wait for it to reach a terminal state on its own —
/// the supervisor itself never does this (see design notes), but operational
/// tooling built on this crate may.
pub fn terminate(pid: u32) -> Result<()> {
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|e| ScanError::Internal(format!("failed to signal pid {pid}: {e}")))
}

/// Outcome of a successful two-layer fork: the grandchild's pid, to be
/// recorded as the queue entry's handler pid.
pub struct ForkedHandler {
    pub grandchild_pid: u32,
}

/// Forks a handler process via the required two-layer scheme: supervisor
/// forks an intermediate child, which forks the grandchild and immediately
/// exits after writing the grandchild's pid back through a pipe. The
/// grandchild is thereby reparented to init, so supervisor tick latency never
/// depends on handler lifetime; the supervisor only blocks on reaping the
/// short-lived intermediate child.
///
/// `body` runs in the grandchild and must not return — it calls
/// `std::process::exit` itself via [`grandchild_bootstrap`] and the caller's
/// closure.
pub fn spawn_handler<F>(body: F) -> Result<ForkedHandler>
where
    F: FnOnce() -> i32,
{
    let (read_fd, write_fd) = pipe().map_err(|e| ScanError::ForkFailed(e.into()))?;

    // SAFETY: fork() is async-signal-unsafe in general, but the intermediate
    // child below only calls async-signal-safe operations (write, exit) before
    // it either forks again or exits, matching the double-fork idiom.
    match unsafe { fork() }.map_err(|e| ScanError::ForkFailed(e.into()))? {
        ForkResult::Parent { child } => {
            drop(write_fd);
            let mut file = std::fs::File::from(read_fd);
            let grandchild_pid = read_pid_from_pipe(&mut file);

            match waitpid(child, None) {
                Ok(WaitStatus::Exited(_, 0)) => {}
                Ok(status) => {
                    warn!(?status, "intermediate fork child exited non-zero");
                    return Err(ScanError::ForkFailed(std::io::Error::other(
                        "intermediate child reported failure",
                    )));
                }
                Err(e) => return Err(ScanError::ForkFailed(e.into())),
            }

            match grandchild_pid {
                Some(pid) => Ok(ForkedHandler {
                    grandchild_pid: pid,
                }),
                None => Err(ScanError::ForkFailed(std::io::Error::other(
                    "short or failed pid pipe write",
                ))),
            }
        }
        ForkResult::Child => {
            drop(read_fd);
            // SAFETY: second fork, same constraints as above.
            match unsafe { fork() } {
                Ok(ForkResult::Parent { child }) => {
                    let mut file = std::fs::File::from(write_fd);
                    let ok = write_pid_to_pipe(&mut file, child.as_raw() as u32);
                    std::process::exit(if ok { 0 } else { 1 });
                }
                Ok(ForkResult::Child) => {
                    drop(write_fd);
                    grandchild_bootstrap();
                    std::process::exit(body());
                }
                Err(_) => std::process::exit(1),
            }
        }
    }
}

fn write_pid_to_pipe(file: &mut std::fs::File, pid: u32) -> bool {
    use std::io::Write;
    let bytes = pid.to_ne_bytes();
    file.write_all(&bytes).is_ok()
}

fn read_pid_from_pipe(file: &mut std::fs::File) -> Option<u32> {
    use std::io::Read;
    let mut bytes = [0u8; 4];
    file.read_exact(&mut bytes).ok()?;
    Some(u32::from_ne_bytes(bytes))
}

/// Grandchild bootstrap: re-initializes process-local state that does not
/// survive `fork()` cleanly (the global tracing dispatcher) and resets
/// disposition for `SIGCHLD` to default since the grandchild, now reparented
/// to init, is responsible for reaping its own children.
fn grandchild_bootstrap() {
    let _ = tracing_subscriber::fmt::try_init();
    // SAFETY: restoring the default disposition for a signal this process owns.
    unsafe {
        let _ = nix::sys::signal::signal(Signal::SIGCHLD, nix::sys::signal::SigHandler::SigDfl);
    }
}
