use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use tunnelhub_core::{
    DiscoveredUrl, OrchestratorConfig, ProcessRunner, Terminator, TunnelSpec, match_line,
};

/// One worker per tunnel: waits for the local service, spawns the tunnel
/// client, scans its output for the public URL, and mirrors every line to a
/// per-tunnel log file.
pub(crate) struct TunnelRunner {
    pub(crate) spec: TunnelSpec,
    pub(crate) config: OrchestratorConfig,
    pub(crate) urls: Arc<Mutex<Vec<DiscoveredUrl>>>,
    pub(crate) pids: Arc<Mutex<Vec<u32>>>,
    pub(crate) cancel: CancellationToken,
    pub(crate) terminator: Arc<dyn Terminator>,
}

impl TunnelRunner {
    /// Runs to completion. Never propagates errors: a tunnel that fails to
    /// spawn or crashes simply never reports a URL, and its siblings keep
    /// running.
    pub(crate) async fn run(self) {
        let name = self.spec.name.clone();

        if self.config.check_local_port && !self.wait_for_local_port().await {
            debug!(tunnel = %name, "stopped before local port opened");
            return;
        }

        let command = self.spec.render_command(self.config.port);
        let mut handle = match ProcessRunner::spawn(&command) {
            Ok(handle) => handle,
            Err(e) => {
                error!(tunnel = %name, %command, error = %format!("{e:#}"), "failed to start tunnel process");
                return;
            }
        };

        let pid = handle.pid();
        if let Some(pid) = pid {
            self.pids.lock().unwrap().push(pid);
        }

        let mut log_file = self.open_log_file(&name).await;
        let mut url_found = false;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                line = handle.next_line() => {
                    let Some(line) = line else { break };
                    if !url_found {
                        url_found = self.process_line(&line);
                    }
                    if let Some(file) = log_file.as_mut() {
                        let _ = file.write_all(line.as_bytes()).await;
                        let _ = file.write_all(b"\n").await;
                    }
                }
            }
        }

        handle
            .terminate_then_kill(
                self.terminator.as_ref(),
                self.config.grace_period(),
                self.config.kill_grace(),
            )
            .await;

        if let Some(pid) = pid {
            self.pids.lock().unwrap().retain(|p| *p != pid);
        }
        if let Some(mut file) = log_file.take() {
            let _ = file.flush().await;
        }
        debug!(tunnel = %name, "tunnel worker finished");
    }

    /// Match the line against this tunnel's pattern; on the first hit,
    /// record the URL and invoke the spec callback with panics isolated.
    fn process_line(&self, line: &str) -> bool {
        let Some((_, url)) = match_line(line, std::slice::from_ref(&self.spec)) else {
            return false;
        };

        self.urls.lock().unwrap().push(DiscoveredUrl {
            url: url.clone(),
            note: self.spec.note.clone(),
            name: self.spec.name.clone(),
        });

        if let Some(callback) = &self.spec.callback {
            let invoke = AssertUnwindSafe(|| {
                callback(&url, self.spec.note.as_deref(), &self.spec.name)
            });
            if catch_unwind(invoke).is_err() {
                error!(tunnel = %self.spec.name, "tunnel URL callback panicked");
            }
        }
        true
    }

    /// Cooperatively wait for the local service port to accept connections.
    /// Returns false when the stop signal fired first.
    async fn wait_for_local_port(&self) -> bool {
        let addr = ("127.0.0.1", self.config.port);
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            if let Ok(Ok(_)) = timeout(Duration::from_secs(1), TcpStream::connect(addr)).await {
                return true;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }
    }

    /// Truncating create of `tunnel_<name>.log` in the configured log dir.
    /// Failure to open the log is not fatal to the tunnel.
    async fn open_log_file(&self, name: &str) -> Option<File> {
        let dir = self
            .config
            .log_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let path = dir.join(format!("tunnel_{name}.log"));
        match File::create(&path).await {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(tunnel = %name, path = %path.display(), error = %e, "could not open tunnel log file");
                None
            }
        }
    }
}
