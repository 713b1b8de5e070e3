use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one orchestrator run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(setter(into, strip_option))]
pub struct OrchestratorConfig {
    /// Local TCP port the tunnels forward to
    pub port: u16,

    /// Whether to wait for the local port to accept connections before
    /// spawning each tunnel process
    #[serde(default = "default_check_local_port")]
    #[builder(default = "true")]
    pub check_local_port: bool,

    /// Aggregate wait for all tunnels to report a URL (in seconds)
    #[serde(default = "default_wait_timeout_secs")]
    #[builder(default = "default_wait_timeout_secs()")]
    pub wait_timeout_secs: u64,

    /// Interval between cooperative checks of shared state (in milliseconds).
    /// Bounds shutdown latency, so it must stay at or below one second.
    #[serde(default = "default_poll_interval_ms")]
    #[builder(default = "default_poll_interval_ms()")]
    pub poll_interval_ms: u64,

    /// How long a process gets to exit after the graceful signal before
    /// being killed (in seconds)
    #[serde(default = "default_grace_period_secs")]
    #[builder(default = "default_grace_period_secs()")]
    pub grace_period_secs: u64,

    /// Bounded wait for the forceful kill to be reaped (in seconds)
    #[serde(default = "default_kill_grace_secs")]
    #[builder(default = "default_kill_grace_secs()")]
    pub kill_grace_secs: u64,

    /// Directory for per-tunnel log files. Current directory when absent.
    #[serde(default)]
    #[builder(default)]
    pub log_dir: Option<PathBuf>,
}

impl OrchestratorConfig {
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            return Err(anyhow::anyhow!("port must be non-zero"));
        }

        if self.wait_timeout_secs == 0 {
            return Err(anyhow::anyhow!("wait_timeout_secs must be at least 1"));
        }

        if self.poll_interval_ms == 0 || self.poll_interval_ms > 1_000 {
            return Err(anyhow::anyhow!(
                "poll_interval_ms must be between 1 and 1000 to keep shutdown responsive"
            ));
        }

        Ok(())
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.kill_grace_secs)
    }
}

/// Configuration for the pre-registration candidate probe
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(setter(into))]
pub struct ProbeConfig {
    /// Window each candidate gets to produce a matching URL (in seconds)
    #[serde(default = "default_probe_timeout_secs")]
    #[builder(default = "default_probe_timeout_secs()")]
    pub timeout_secs: u64,

    /// Interval between output checks while probing (in milliseconds)
    #[serde(default = "default_check_interval_ms")]
    #[builder(default = "default_check_interval_ms()")]
    pub check_interval_ms: u64,

    /// How many trailing output lines to keep for the failure diagnostic
    #[serde(default = "default_diagnostic_lines")]
    #[builder(default = "default_diagnostic_lines()")]
    pub diagnostic_lines: usize,

    /// Character cap applied to the failure diagnostic
    #[serde(default = "default_diagnostic_max_chars")]
    #[builder(default = "default_diagnostic_max_chars()")]
    pub diagnostic_max_chars: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_probe_timeout_secs(),
            check_interval_ms: default_check_interval_ms(),
            diagnostic_lines: default_diagnostic_lines(),
            diagnostic_max_chars: default_diagnostic_max_chars(),
        }
    }
}

impl ProbeConfig {
    pub fn builder() -> ProbeConfigBuilder {
        ProbeConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_secs == 0 {
            return Err(anyhow::anyhow!("timeout_secs must be at least 1"));
        }

        if self.check_interval_ms == 0 {
            return Err(anyhow::anyhow!("check_interval_ms must be non-zero"));
        }

        if self.diagnostic_max_chars == 0 {
            return Err(anyhow::anyhow!("diagnostic_max_chars must be non-zero"));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

// Default value functions for serde
fn default_check_local_port() -> bool {
    true
}
fn default_wait_timeout_secs() -> u64 {
    30
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_grace_period_secs() -> u64 {
    15
}
fn default_kill_grace_secs() -> u64 {
    2
}
fn default_probe_timeout_secs() -> u64 {
    10
}
fn default_check_interval_ms() -> u64 {
    500
}
fn default_diagnostic_lines() -> usize {
    3
}
fn default_diagnostic_max_chars() -> usize {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_orchestrator_config() {
        let config = OrchestratorConfig::builder().port(7860u16).build().unwrap();
        assert!(config.validate().is_ok());
        assert!(config.check_local_port);
        assert_eq!(config.wait_timeout(), Duration::from_secs(30));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.grace_period(), Duration::from_secs(15));
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn test_invalid_orchestrator_config() {
        let mut config = OrchestratorConfig::builder().port(7860u16).build().unwrap();
        config.port = 0;
        assert!(config.validate().is_err());

        config.port = 7860;
        config.poll_interval_ms = 5_000;
        assert!(config.validate().is_err());

        config.poll_interval_ms = 1_000;
        config.wait_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_probe_config() {
        let config = ProbeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.check_interval(), Duration::from_millis(500));
        assert_eq!(config.diagnostic_lines, 3);
        assert_eq!(config.diagnostic_max_chars, 300);
    }

    #[test]
    fn test_serialization() {
        let config = OrchestratorConfig::builder()
            .port(8188u16)
            .wait_timeout_secs(60u64)
            .build()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: OrchestratorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_serde_defaults_fill_missing_fields() {
        let config: OrchestratorConfig = serde_json::from_str(r#"{"port": 7860}"#).unwrap();
        assert_eq!(config.wait_timeout_secs, 30);
        assert_eq!(config.grace_period_secs, 15);
        assert_eq!(config.kill_grace_secs, 2);
        assert!(config.check_local_port);
    }
}
