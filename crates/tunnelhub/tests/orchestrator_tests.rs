use regex_lite::Regex;
use std::time::{Duration, Instant};
use tunnelhub::{OrchestratorConfig, TunnelError, TunnelOrchestrator, TunnelSpec};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tunnelhub=debug")
        .with_target(false)
        .try_init();
}

fn echo_tunnel(name: &str, host: &str) -> TunnelSpec {
    let domain = host.split_once('.').unwrap().1.replace('.', r"\.");
    TunnelSpec::builder()
        .command(format!("echo https://{host}"))
        .pattern(Regex::new(&format!(r"[\w-]+\.{domain}")).unwrap())
        .name(name)
        .build()
        .unwrap()
}

fn quick_config(log_dir: &std::path::Path) -> OrchestratorConfig {
    OrchestratorConfig::builder()
        .port(7860u16)
        .check_local_port(false)
        .wait_timeout_secs(5u64)
        .poll_interval_ms(100u64)
        .grace_period_secs(1u64)
        .kill_grace_secs(1u64)
        .log_dir(log_dir.to_path_buf())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_discovers_url_from_echoed_output() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut hub = TunnelOrchestrator::new(quick_config(dir.path())).unwrap();

    hub.add_tunnel(
        TunnelSpec::builder()
            .command("echo https://abc123.trycloudflare.com")
            .pattern(Regex::new(r"[\w-]+\.trycloudflare\.com").unwrap())
            .name("Cloudflared")
            .build()
            .unwrap(),
    )
    .unwrap();

    let urls = hub.start().await.unwrap();
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].url, "http://abc123.trycloudflare.com");
    assert_eq!(urls[0].name, "Cloudflared");
    assert!(urls[0].note.is_none());

    hub.stop().await.unwrap();
}

#[tokio::test]
async fn test_state_machine_misuse_errors() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut hub = TunnelOrchestrator::new(quick_config(dir.path())).unwrap();

    // start with an empty registry
    assert!(matches!(hub.start().await, Err(TunnelError::NoTunnels)));

    // stop while idle
    assert!(matches!(hub.stop().await, Err(TunnelError::NotRunning)));

    hub.add_tunnel(echo_tunnel("A", "a.serveo.net")).unwrap();

    // duplicate names are rejected
    let dup = hub.add_tunnel(echo_tunnel("A", "a2.serveo.net"));
    assert!(matches!(dup, Err(TunnelError::DuplicateName(name)) if name == "A"));

    hub.activate().unwrap();

    // re-entrant start while running
    assert!(matches!(hub.activate(), Err(TunnelError::AlreadyRunning)));
    assert!(matches!(hub.start().await, Err(TunnelError::AlreadyRunning)));

    // registry frozen while running
    let frozen = hub.add_tunnel(echo_tunnel("B", "b.serveo.net"));
    assert!(matches!(frozen, Err(TunnelError::AlreadyRunning)));

    hub.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_resets_state_and_allows_restart() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut hub = TunnelOrchestrator::new(quick_config(dir.path())).unwrap();
    hub.add_tunnel(echo_tunnel("A", "first.serveo.net")).unwrap();

    let urls = hub.start().await.unwrap();
    assert_eq!(urls.len(), 1);

    hub.stop().await.unwrap();
    assert!(!hub.is_running());
    assert!(hub.urls().is_empty());

    // a second run with the same registry is independent of the first
    let urls = hub.start().await.unwrap();
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].url, "http://first.serveo.net");
    hub.stop().await.unwrap();
    assert!(hub.urls().is_empty());
}

#[tokio::test]
async fn test_partial_results_on_timeout() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut config = quick_config(dir.path());
    config.wait_timeout_secs = 2;
    let mut hub = TunnelOrchestrator::new(config).unwrap();

    hub.add_tunnel(echo_tunnel("A", "a.serveo.net")).unwrap();
    // B produces no output and never matches within the timeout
    hub.add_tunnel(
        TunnelSpec::builder()
            .command("sleep 30")
            .pattern(Regex::new(r"[\w-]+\.loca\.lt").unwrap())
            .name("B")
            .build()
            .unwrap(),
    )
    .unwrap();
    hub.add_tunnel(echo_tunnel("C", "c.serveo.net")).unwrap();

    let started = Instant::now();
    let urls = hub.start().await.unwrap();
    let elapsed = started.elapsed();

    // exactly the two reporting tunnels, within timeout plus one poll
    let mut names: Vec<&str> = urls.iter().map(|u| u.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["A", "C"]);
    assert!(elapsed >= Duration::from_secs(2), "returned too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "overran the timeout: {elapsed:?}");

    hub.stop().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_stop_kills_term_ignoring_process_within_grace() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    // a process that ignores the graceful signal forces the kill escalation
    // the loop keeps the shell itself alive; short-lived sleep children dying
    // to SIGTERM must not let the graceful stage pass
    let script = dir.path().join("stubborn.sh");
    std::fs::write(
        &script,
        "#!/bin/sh\ntrap '' TERM\necho up\nwhile :; do sleep 1; done\n",
    )
    .unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let mut config = quick_config(dir.path());
    config.wait_timeout_secs = 1;
    let mut hub = TunnelOrchestrator::new(config).unwrap();
    hub.add_tunnel(
        TunnelSpec::builder()
            .command(script.display().to_string())
            .pattern(Regex::new(r"[\w-]+\.loca\.lt").unwrap())
            .name("Stubborn")
            .build()
            .unwrap(),
    )
    .unwrap();

    hub.start().await.unwrap();

    let started = Instant::now();
    hub.stop().await.unwrap();
    let elapsed = started.elapsed();

    // grace (1s) + kill grace (1s) + scheduling slack
    assert!(elapsed < Duration::from_secs(4), "stop hung: {elapsed:?}");
}

#[tokio::test]
async fn test_run_scoped_stops_on_error_paths() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut hub = TunnelOrchestrator::new(quick_config(dir.path())).unwrap();
    hub.add_tunnel(echo_tunnel("A", "a.serveo.net")).unwrap();

    let out: Result<(), anyhow::Error> = hub
        .run_scoped(async { Err(anyhow::anyhow!("launcher blew up")) })
        .await
        .unwrap();

    assert!(out.is_err());
    // the scope guaranteed teardown despite the error
    assert!(!hub.is_running());
    assert!(hub.urls().is_empty());
}

#[tokio::test]
async fn test_waits_for_local_port_before_spawning() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    // bind first so the port is open before the runner polls it
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut config = quick_config(dir.path());
    config.port = port;
    config.check_local_port = true;

    let mut hub = TunnelOrchestrator::new(config).unwrap();
    hub.add_tunnel(echo_tunnel("A", "a.serveo.net")).unwrap();

    let urls = hub.start().await.unwrap();
    assert_eq!(urls.len(), 1);
    hub.stop().await.unwrap();
}

#[tokio::test]
async fn test_summary_callback_receives_all_urls() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = std::sync::mpsc::channel();

    let mut hub = TunnelOrchestrator::new(quick_config(dir.path()))
        .unwrap()
        .with_summary_callback(move |urls| {
            let _ = tx.send(urls.len());
        });
    hub.add_tunnel(echo_tunnel("A", "a.serveo.net")).unwrap();
    hub.add_tunnel(echo_tunnel("B", "b.serveo.net")).unwrap();

    hub.start().await.unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 2);
    hub.stop().await.unwrap();
}
