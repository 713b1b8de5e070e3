use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tunnelhub_core::{
    DiscoveredUrl, OrchestratorConfig, SummaryCallback, Terminator, TunnelError, TunnelSpec,
};

use crate::platform::platform_terminator;
use crate::runner::TunnelRunner;

/// Manages the full set of tunnel workers concurrently: one task per
/// registered tunnel plus a status printer, a shared mutex-guarded list of
/// discovered URLs, and a start/stop lifecycle with guaranteed process and
/// task cleanup.
///
/// State machine: IDLE -> RUNNING (`activate`/`start`) -> IDLE (`stop`).
/// Re-entrant `start` while running and `stop` while idle are errors.
pub struct TunnelOrchestrator {
    config: OrchestratorConfig,
    terminator: Arc<dyn Terminator>,
    tunnels: Vec<TunnelSpec>,
    urls: Arc<Mutex<Vec<DiscoveredUrl>>>,
    pids: Arc<Mutex<Vec<u32>>>,
    tasks: JoinSet<()>,
    cancel: CancellationToken,
    printed_tx: watch::Sender<bool>,
    printed_rx: watch::Receiver<bool>,
    summary_callback: Option<SummaryCallback>,
    running: bool,
}

impl TunnelOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Result<Self, TunnelError> {
        config
            .validate()
            .map_err(|e| TunnelError::Configuration(e.to_string()))?;

        let (printed_tx, printed_rx) = watch::channel(false);
        Ok(Self {
            config,
            terminator: platform_terminator(),
            tunnels: Vec::new(),
            urls: Arc::new(Mutex::new(Vec::new())),
            pids: Arc::new(Mutex::new(Vec::new())),
            tasks: JoinSet::new(),
            cancel: CancellationToken::new(),
            printed_tx,
            printed_rx,
            summary_callback: None,
            running: false,
        })
    }

    /// Install an aggregate callback invoked with every discovered URL once
    /// the summary has been assembled
    pub fn with_summary_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[DiscoveredUrl]) + Send + Sync + 'static,
    {
        self.summary_callback = Some(Arc::new(callback));
        self
    }

    /// Register a tunnel. The registry is frozen once the orchestrator is
    /// running.
    pub fn add_tunnel(&mut self, spec: TunnelSpec) -> Result<(), TunnelError> {
        if self.running {
            return Err(TunnelError::AlreadyRunning);
        }
        if self.tunnels.iter().any(|t| t.name == spec.name) {
            return Err(TunnelError::DuplicateName(spec.name));
        }
        debug!(tunnel = %spec.name, command = %spec.command, "registered tunnel");
        self.tunnels.push(spec);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Snapshot of the URLs discovered so far
    pub fn urls(&self) -> Vec<DiscoveredUrl> {
        self.urls.lock().unwrap().clone()
    }

    /// Non-blocking start: spawn one worker per tunnel plus the status
    /// printer and mark the orchestrator running.
    pub fn activate(&mut self) -> Result<(), TunnelError> {
        if self.running {
            return Err(TunnelError::AlreadyRunning);
        }
        if self.tunnels.is_empty() {
            return Err(TunnelError::NoTunnels);
        }

        self.tasks.spawn(print_when_ready(
            self.tunnels.len(),
            self.urls.clone(),
            self.cancel.clone(),
            self.printed_tx.clone(),
            self.config.wait_timeout(),
            self.config.poll_interval(),
            self.summary_callback.clone(),
        ));

        for spec in &self.tunnels {
            let runner = TunnelRunner {
                spec: spec.clone(),
                config: self.config.clone(),
                urls: self.urls.clone(),
                pids: self.pids.clone(),
                cancel: self.cancel.clone(),
                terminator: self.terminator.clone(),
            };
            self.tasks.spawn(runner.run());
        }

        self.running = true;
        info!(count = self.tunnels.len(), port = self.config.port, "tunnels starting");
        Ok(())
    }

    /// Start and block until every tunnel has reported its URL or the
    /// aggregate timeout elapsed (whichever the printer saw first), then
    /// return the discovered URLs. An interrupt during the wait triggers an
    /// orderly `stop` instead.
    pub async fn start(&mut self) -> Result<Vec<DiscoveredUrl>, TunnelError> {
        self.activate()?;

        let mut printed = self.printed_rx.clone();
        tokio::select! {
            _ = printed.wait_for(|done| *done) => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupt received, stopping tunnels");
                self.stop().await?;
                return Ok(Vec::new());
            }
        }
        Ok(self.urls())
    }

    /// Scoped run: activate, await the caller's future, then always stop.
    /// The `stop` happens even when the future resolves to an error, so no
    /// subprocess outlives the scope.
    pub async fn run_scoped<F, T>(&mut self, fut: F) -> Result<T, TunnelError>
    where
        F: Future<Output = T>,
    {
        self.activate()?;
        let out = fut.await;
        self.stop().await?;
        Ok(out)
    }

    /// Signal every worker to stop, wait for them to terminate their
    /// subprocesses and finish, then reset transient state so the instance
    /// can be started again.
    pub async fn stop(&mut self) -> Result<(), TunnelError> {
        if !self.running {
            return Err(TunnelError::NotRunning);
        }

        let names: Vec<&str> = self.tunnels.iter().map(|t| t.name.as_str()).collect();
        info!(tunnels = %names.join(", "), "stopping tunnels");

        self.cancel.cancel();
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    error!(error = %e, "tunnel worker panicked");
                }
            }
        }

        self.reset();
        Ok(())
    }

    /// Clear URLs, PID tracking, and signals; ready for the next run
    fn reset(&mut self) {
        self.urls.lock().unwrap().clear();
        self.pids.lock().unwrap().clear();
        self.cancel = CancellationToken::new();
        let (printed_tx, printed_rx) = watch::channel(false);
        self.printed_tx = printed_tx;
        self.printed_rx = printed_rx;
        self.running = false;
    }
}

impl Drop for TunnelOrchestrator {
    fn drop(&mut self) {
        let pids: Vec<u32> = match self.pids.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => return,
        };
        if pids.is_empty() {
            return;
        }

        // best-effort emergency cleanup; the normal path is stop()
        warn!(
            count = pids.len(),
            "orchestrator dropped with live tunnel processes, sending termination"
        );
        for pid in pids {
            self.terminator.terminate(pid);
        }
    }
}

/// Status printer: wait (bounded by the aggregate timeout) for every tunnel
/// to report or for the stop signal, then print the discovered URLs in one
/// block, invoke the aggregate callback, and set the printed signal.
async fn print_when_ready(
    tunnel_count: usize,
    urls: Arc<Mutex<Vec<DiscoveredUrl>>>,
    cancel: CancellationToken,
    printed: watch::Sender<bool>,
    wait_timeout: Duration,
    poll_interval: Duration,
    summary_callback: Option<SummaryCallback>,
) {
    let deadline = Instant::now() + wait_timeout;
    loop {
        if urls.lock().unwrap().len() >= tunnel_count {
            break;
        }
        if Instant::now() >= deadline {
            warn!("timed out waiting for tunnel URLs, printing the ones available");
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    if cancel.is_cancelled() {
        return;
    }

    let snapshot = urls.lock().unwrap().clone();
    println!();
    for entry in &snapshot {
        match &entry.note {
            Some(note) => println!(" 🔗 Tunnel {} URL: {} {}", entry.name, entry.url, note),
            None => println!(" 🔗 Tunnel {} URL: {}", entry.name, entry.url),
        }
    }
    println!();

    if let Some(callback) = summary_callback {
        if catch_unwind(AssertUnwindSafe(|| callback(&snapshot))).is_err() {
            error!("aggregate URL callback panicked");
        }
    }

    let _ = printed.send(true);
}
