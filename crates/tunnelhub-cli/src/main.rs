//! `tunnelhub` - probe the available tunnel providers, register the viable
//! ones, and serve the local web UI port through all of them until
//! interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tunnelhub::{
    CandidateProbe, OrchestratorConfig, ProbeConfig, SettingsStore, TunnelOrchestrator, services,
    settings,
};

#[derive(Parser, Debug)]
#[command(name = "tunnelhub", about = "Expose a local web UI port through multiple tunnel providers")]
struct Args {
    /// Local port the tunnels forward to
    #[arg(short, long, default_value_t = 7860)]
    port: u16,

    /// Show failed tunnel details
    #[arg(short = 'l', long)]
    log: bool,

    /// Settings file (defaults to ~/.config/tunnelhub/settings.json)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Aggregate wait for all tunnels to report a URL, in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Window each candidate gets during the pre-flight probe, in seconds
    #[arg(long, default_value_t = 10)]
    probe_timeout: u64,

    /// Skip waiting for the local port to open before tunnelling
    #[arg(long)]
    no_port_check: bool,

    /// Directory for per-tunnel log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Zrok token (overrides the one in the settings file)
    #[arg(long, env = "ZROK_TOKEN")]
    zrok_token: Option<String>,

    /// Ngrok authtoken (overrides the one in the settings file)
    #[arg(long, env = "NGROK_TOKEN")]
    ngrok_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let home = dirs::home_dir().context("could not determine the home directory")?;
    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(|| home.join(".config/tunnelhub/settings.json"));
    let store = SettingsStore::new(settings_path);

    let public_ip = settings::cached_public_ip(&store).await;
    info!(%public_ip, "public IP resolved");

    // credential-free providers first, token-gated ones only when a token
    // is available (rotating stored credentials as needed)
    let ip_note = (public_ip != "N/A").then_some(public_ip.as_str());
    let mut candidates = services::default_candidates(ip_note);

    let zrok_token = args
        .zrok_token
        .clone()
        .or_else(|| store.read_str("TOKENS.zrok_token"));
    if let Some(token) = zrok_token {
        match services::ensure_zrok_token(&home, &token).await {
            Ok(()) => candidates.push(services::zrok()),
            Err(e) => warn!(error = %format!("{e:#}"), "skipping zrok"),
        }
    }

    let ngrok_token = args
        .ngrok_token
        .clone()
        .or_else(|| store.read_str("TOKENS.ngrok_token"));
    if let Some(token) = ngrok_token {
        match services::ensure_ngrok_token(&home, &token).await {
            Ok(()) => candidates.push(services::ngrok()),
            Err(e) => warn!(error = %format!("{e:#}"), "skipping ngrok"),
        }
    }

    println!("Checking tunnels:");
    let probe = CandidateProbe::new(
        ProbeConfig::builder()
            .timeout_secs(args.probe_timeout)
            .build()
            .context("invalid probe configuration")?,
    )?;
    let outcome = probe.probe_all(candidates, args.port).await;

    println!(
        "\n>> Total Tunnels: {} | Success: {} | Errors: {}\n",
        outcome.total(),
        outcome.viable.len(),
        outcome.failures.len()
    );
    if args.log && !outcome.failures.is_empty() {
        println!(">> Failed Tunnels:");
        for failure in &outcome.failures {
            println!("  - {}: {}", failure.name, failure.reason);
        }
        println!();
    }

    if outcome.viable.is_empty() {
        anyhow::bail!("no usable tunnel providers in this session");
    }

    let config = OrchestratorConfig::builder()
        .port(args.port)
        .check_local_port(!args.no_port_check)
        .wait_timeout_secs(args.timeout)
        .log_dir(args.log_dir.clone().unwrap_or_else(|| PathBuf::from(".")))
        .build()
        .context("invalid orchestrator configuration")?;

    let mut hub = TunnelOrchestrator::new(config)?;
    for spec in outcome.viable {
        hub.add_tunnel(spec)?;
    }

    // blocks until every tunnel reported or the timeout elapsed; an
    // interrupt during this wait already performs the orderly stop
    hub.start().await?;

    if hub.is_running() {
        info!("tunnels up, press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        hub.stop().await?;
    }

    Ok(())
}
