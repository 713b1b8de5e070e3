//! Unix signal delivery for tunnel process teardown

#[cfg(unix)]
mod unix_impl {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    use tracing::{debug, warn};
    use tunnelhub_core::{SignalOutcome, Terminator};

    /// Signals the child's process group first, falling back to the single
    /// process when the group is already gone. Tunnel processes are spawned
    /// into their own group, so this also reaches forked helpers.
    pub struct UnixTerminator;

    impl Terminator for UnixTerminator {
        fn terminate(&self, pid: u32) -> SignalOutcome {
            deliver(pid, Signal::SIGTERM)
        }

        fn kill(&self, pid: u32) -> SignalOutcome {
            deliver(pid, Signal::SIGKILL)
        }
    }

    fn deliver(pid: u32, sig: Signal) -> SignalOutcome {
        let target = NixPid::from_raw(pid as i32);

        match signal::killpg(target, sig) {
            Ok(()) => {
                debug!(pid, signal = %sig, "sent signal to process group");
                return SignalOutcome::Delivered;
            }
            Err(Errno::ESRCH) => {
                // group already gone, try the process itself below
            }
            Err(Errno::EPERM) => {
                warn!(pid, signal = %sig, "permission denied signalling process group");
                return SignalOutcome::Failed("permission denied".to_string());
            }
            Err(e) => {
                warn!(pid, signal = %sig, error = %e, "failed to signal process group");
                return SignalOutcome::Failed(e.to_string());
            }
        }

        match signal::kill(target, sig) {
            Ok(()) => {
                debug!(pid, signal = %sig, "sent signal to process");
                SignalOutcome::Delivered
            }
            Err(Errno::ESRCH) => SignalOutcome::NotFound,
            Err(Errno::EPERM) => {
                warn!(pid, signal = %sig, "permission denied signalling process");
                SignalOutcome::Failed("permission denied".to_string())
            }
            Err(e) => {
                warn!(pid, signal = %sig, error = %e, "failed to signal process");
                SignalOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(unix)]
pub use unix_impl::UnixTerminator;

// Stub for non-Unix targets so the workspace still builds everywhere
#[cfg(not(unix))]
pub struct UnixTerminator;
