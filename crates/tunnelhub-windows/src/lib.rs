//! Windows signal delivery for tunnel process teardown

#[cfg(windows)]
mod windows_impl {
    use std::process::Command;
    use tracing::{debug, warn};
    use tunnelhub_core::{SignalOutcome, Terminator};

    /// Terminates via `taskkill`, taking the whole process tree with `/T`
    /// since tunnel clients routinely spawn helpers.
    pub struct WindowsTerminator;

    impl Terminator for WindowsTerminator {
        fn terminate(&self, pid: u32) -> SignalOutcome {
            run_taskkill(pid, false)
        }

        fn kill(&self, pid: u32) -> SignalOutcome {
            run_taskkill(pid, true)
        }
    }

    fn run_taskkill(pid: u32, force: bool) -> SignalOutcome {
        let mut cmd = Command::new("taskkill");
        cmd.args(["/T", "/PID", &pid.to_string()]);
        if force {
            cmd.arg("/F");
        }

        match cmd.output() {
            Ok(output) if output.status.success() => {
                debug!(pid, force, "taskkill delivered");
                SignalOutcome::Delivered
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                // taskkill exit code 128 means the process was not found
                if output.status.code() == Some(128) {
                    SignalOutcome::NotFound
                } else {
                    warn!(pid, force, %stderr, "taskkill failed");
                    SignalOutcome::Failed(stderr.trim().to_string())
                }
            }
            Err(e) => {
                warn!(pid, force, error = %e, "failed to run taskkill");
                SignalOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(windows)]
pub use windows_impl::WindowsTerminator;

// Stub for non-Windows targets so the workspace still builds everywhere
#[cfg(not(windows))]
pub struct WindowsTerminator;
