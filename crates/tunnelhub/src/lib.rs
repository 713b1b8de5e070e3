//! Tunnelhub - concurrent tunnel orchestration for locally hosted web UIs
//!
//! Exposes one local TCP port through several third-party tunnel relay
//! services at once (cloudflared, localtunnel, pinggy, serveo, zrok, ngrok,
//! ssh relays). Each provider's client binary runs as a managed subprocess;
//! its output is scanned for the public URL, and discovered URLs are
//! collected and printed once every tunnel reports or a timeout elapses.
//!
//! ```rust,no_run
//! use tunnelhub::{services, OrchestratorConfig, TunnelOrchestrator};
//!
//! # async fn example() -> Result<(), tunnelhub::TunnelError> {
//! let config = OrchestratorConfig::builder().port(7860u16).build().unwrap();
//! let mut hub = TunnelOrchestrator::new(config)?;
//! hub.add_tunnel(services::cloudflared())?;
//! let urls = hub.start().await?;
//! println!("{} tunnels up", urls.len());
//! hub.stop().await?;
//! # Ok(())
//! # }
//! ```

mod orchestrator;
mod platform;
mod probe;
mod runner;
pub mod services;
pub mod settings;

pub use orchestrator::TunnelOrchestrator;
pub use platform::{platform_name, platform_terminator};
pub use probe::{CandidateProbe, ProbeFailure, ProbeOutcome};
pub use settings::SettingsStore;

// Re-export core functionality
pub use tunnelhub_core::*;
