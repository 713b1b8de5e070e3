use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant, timeout};
use tracing::{debug, info};
use tunnelhub_core::{ProbeConfig, ProcessRunner, Terminator, TunnelError, TunnelSpec};

use crate::platform::platform_terminator;

const PROBE_STOP_GRACE: Duration = Duration::from_secs(2);
const PROBE_KILL_GRACE: Duration = Duration::from_secs(1);

/// One excluded candidate with its truncated diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeFailure {
    pub name: String,
    pub reason: String,
}

/// Result of probing a batch of candidates
#[derive(Debug)]
pub struct ProbeOutcome {
    /// Candidates whose dry run produced a matching URL, in candidate order
    pub viable: Vec<TunnelSpec>,
    /// Excluded candidates with their diagnostics, in candidate order
    pub failures: Vec<ProbeFailure>,
}

impl ProbeOutcome {
    pub fn total(&self) -> usize {
        self.viable.len() + self.failures.len()
    }
}

/// Pre-registration filter: dry-runs each candidate tunnel command for a
/// bounded window and keeps only the ones whose output matches the expected
/// URL pattern. Failures are recorded, never raised.
pub struct CandidateProbe {
    config: ProbeConfig,
    terminator: Arc<dyn Terminator>,
}

impl CandidateProbe {
    pub fn new(config: ProbeConfig) -> Result<Self, TunnelError> {
        config
            .validate()
            .map_err(|e| TunnelError::Configuration(e.to_string()))?;
        Ok(Self {
            config,
            terminator: platform_terminator(),
        })
    }

    /// Probe all candidates concurrently, bounding total latency to roughly
    /// one probe window rather than one per candidate.
    pub async fn probe_all(&self, candidates: Vec<TunnelSpec>, port: u16) -> ProbeOutcome {
        let mut set = JoinSet::new();
        for (index, spec) in candidates.into_iter().enumerate() {
            let config = self.config.clone();
            let terminator = self.terminator.clone();
            set.spawn(async move {
                let result = probe_one(&spec, port, &config, terminator.as_ref()).await;
                (index, spec, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            if let Ok(entry) = joined {
                results.push(entry);
            }
        }
        results.sort_by_key(|(index, _, _)| *index);

        let mut outcome = ProbeOutcome {
            viable: Vec::new(),
            failures: Vec::new(),
        };
        for (_, spec, result) in results {
            match result {
                None => outcome.viable.push(spec),
                Some(reason) => {
                    debug!(tunnel = %spec.name, %reason, "candidate excluded");
                    outcome.failures.push(ProbeFailure {
                        name: spec.name,
                        reason,
                    });
                }
            }
        }
        outcome
    }
}

/// Dry-run one candidate. Returns `None` when the URL pattern appeared in
/// the output within the probe window, otherwise the failure diagnostic.
async fn probe_one(
    spec: &TunnelSpec,
    port: u16,
    config: &ProbeConfig,
    terminator: &dyn Terminator,
) -> Option<String> {
    info!(tunnel = %spec.name, "checking tunnel candidate");

    let command = spec.render_command(port);
    let mut handle = match ProcessRunner::spawn(&command) {
        Ok(handle) => handle,
        Err(e) => return Some(truncate(&format!("process error: {e:#}"), config)),
    };

    let deadline = Instant::now() + config.timeout();
    let mut tail: VecDeque<String> = VecDeque::new();
    let mut found = false;

    while Instant::now() < deadline {
        match timeout(config.check_interval(), handle.next_line()).await {
            Ok(Some(line)) => {
                let matched = spec.pattern.is_match(&line);
                if tail.len() == config.diagnostic_lines {
                    tail.pop_front();
                }
                tail.push_back(line);
                if matched {
                    found = true;
                    break;
                }
            }
            // EOF: the process died without producing a match
            Ok(None) => break,
            // interval elapsed with no output, re-check the deadline
            Err(_) => {}
        }
    }

    handle
        .terminate_then_kill(terminator, PROBE_STOP_GRACE, PROBE_KILL_GRACE)
        .await;

    if found {
        return None;
    }

    let output: Vec<String> = tail.into_iter().collect();
    let diagnostic = if output.is_empty() {
        "no output received".to_string()
    } else {
        output.join("\n")
    };
    Some(truncate(&diagnostic, config))
}

fn truncate(text: &str, config: &ProbeConfig) -> String {
    if text.chars().count() <= config.diagnostic_max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(config.diagnostic_max_chars).collect();
    format!("{cut}...")
}
