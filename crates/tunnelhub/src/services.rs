//! Built-in tunnel provider catalog and provider token rotation.
//!
//! Command templates carry a `{port}` placeholder substituted at launch
//! time, so one spec serves any local port.

use anyhow::{Context, Result};
use regex_lite::Regex;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};
use tunnelhub_core::TunnelSpec;

fn provider(name: &str, command: &str, pattern: &str) -> TunnelSpec {
    TunnelSpec {
        command: command.to_string(),
        pattern: Regex::new(pattern).expect("provider pattern is valid"),
        name: name.to_string(),
        note: None,
        callback: None,
    }
}

/// Serveo ssh relay
pub fn serveo() -> TunnelSpec {
    provider(
        "Serveo",
        "ssh -o StrictHostKeyChecking=no -R 80:localhost:{port} serveo.net",
        r"[\w-]+\.serveo\.net",
    )
}

/// Pinggy ssh relay
pub fn pinggy() -> TunnelSpec {
    provider(
        "Pinggy",
        "ssh -o StrictHostKeyChecking=no -p 80 -R0:localhost:{port} a.pinggy.io",
        r"[\w-]+\.a\.free\.pinggy\.link",
    )
}

/// Cloudflare quick tunnel
pub fn cloudflared() -> TunnelSpec {
    provider(
        "Cloudflared",
        "cloudflared tunnel --url localhost:{port}",
        r"[\w-]+\.trycloudflare\.com",
    )
}

/// Localtunnel. The service gates visitors behind the host's public IP,
/// so the note carries it as a password hint when known.
pub fn localtunnel(public_ip: Option<&str>) -> TunnelSpec {
    let mut spec = provider("Localtunnel", "lt --port {port}", r"[\w-]+\.loca\.lt");
    if let Some(ip) = public_ip {
        spec.note = Some(format!("Password: {ip}"));
    }
    spec
}

/// Zrok public share; requires an enabled zrok environment
pub fn zrok() -> TunnelSpec {
    provider(
        "Zrok",
        "zrok share public http://localhost:{port}/ --headless",
        r"[\w-]+\.share\.zrok\.io",
    )
}

/// Ngrok http tunnel; requires a configured authtoken
pub fn ngrok() -> TunnelSpec {
    provider(
        "Ngrok",
        "ngrok http http://localhost:{port} --log stdout",
        r"https://[\w-]+\.ngrok-free\.app",
    )
}

/// The providers that work without any stored credentials
pub fn default_candidates(public_ip: Option<&str>) -> Vec<TunnelSpec> {
    vec![serveo(), pinggy(), cloudflared(), localtunnel(public_ip)]
}

/// Token recorded in zrok's environment file, if any
pub fn stored_zrok_token(home: &Path) -> Option<String> {
    let path = home.join(".zrok/environment.json");
    let text = std::fs::read_to_string(path).ok()?;
    let value: serde_json::Value = serde_json::from_str(&text).ok()?;
    value.get("zrok_token")?.as_str().map(str::to_string)
}

/// Authtoken recorded in ngrok's YAML config, if any
pub fn stored_ngrok_token(home: &Path) -> Option<String> {
    let path = home.join(".config/ngrok/ngrok.yml");
    let text = std::fs::read_to_string(path).ok()?;
    let value: serde_yaml::Value = serde_yaml::from_str(&text).ok()?;
    value
        .get("agent")?
        .get("authtoken")?
        .as_str()
        .map(str::to_string)
}

/// Re-enable zrok under the desired token, but only when the stored token
/// differs; a matching token skips the re-auth round-trip entirely.
pub async fn ensure_zrok_token(home: &Path, token: &str) -> Result<()> {
    if stored_zrok_token(home).as_deref() == Some(token) {
        debug!("zrok token unchanged, skipping re-auth");
        return Ok(());
    }

    info!("rotating zrok token");
    // disable may fail when no environment was enabled yet
    let _ = run_quiet("zrok", &["disable"]).await;
    run_quiet("zrok", &["enable", token])
        .await
        .context("zrok enable failed")?;
    Ok(())
}

/// Write the desired ngrok authtoken, but only when the stored one differs
pub async fn ensure_ngrok_token(home: &Path, token: &str) -> Result<()> {
    if stored_ngrok_token(home).as_deref() == Some(token) {
        debug!("ngrok token unchanged, skipping re-auth");
        return Ok(());
    }

    info!("updating ngrok authtoken");
    run_quiet("ngrok", &["config", "add-authtoken", token])
        .await
        .context("ngrok config add-authtoken failed")?;
    Ok(())
}

/// Run a provider CLI with its output discarded
async fn run_quiet(program: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .with_context(|| format!("failed to run {program}"))?;

    if !status.success() {
        warn!(%program, ?args, %status, "provider command failed");
        anyhow::bail!("{program} exited with {status}");
    }
    Ok(())
}
