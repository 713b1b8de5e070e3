use thiserror::Error;

/// Core error types for tunnel operations
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Tunnel hub is already running")]
    AlreadyRunning,

    #[error("Tunnel hub is not running")]
    NotRunning,

    #[error("No tunnels registered")]
    NoTunnels,

    #[error("Tunnel name already registered: {0}")]
    DuplicateName(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl TunnelError {
    /// Check if this error is caller misuse (invalid state transition or
    /// bad configuration) rather than a runtime failure
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            TunnelError::AlreadyRunning
                | TunnelError::NotRunning
                | TunnelError::NoTunnels
                | TunnelError::DuplicateName(_)
                | TunnelError::Configuration(_)
        )
    }
}
