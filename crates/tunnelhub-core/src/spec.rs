use derive_builder::Builder;
use regex_lite::Regex;
use std::fmt;
use std::sync::Arc;

/// Per-tunnel callback invoked once with `(url, note, name)` when the
/// tunnel's public URL is first discovered
pub type UrlCallback = Arc<dyn Fn(&str, Option<&str>, &str) + Send + Sync>;

/// Aggregate callback invoked once with every discovered URL after the
/// summary has been assembled
pub type SummaryCallback = Arc<dyn Fn(&[DiscoveredUrl]) + Send + Sync>;

/// Static configuration for one tunnel
#[derive(Clone, Builder)]
#[builder(setter(into, strip_option))]
pub struct TunnelSpec {
    /// Shell command line for the tunnel client. May contain a `{port}`
    /// placeholder substituted at launch time.
    pub command: String,

    /// Pattern used to find the public URL in the process output
    pub pattern: Regex,

    /// Human-readable identifier, unique within one orchestrator run
    pub name: String,

    /// Free-text annotation shown alongside the discovered URL
    #[builder(default)]
    pub note: Option<String>,

    /// Invoked with `(url, note, name)` on first URL discovery
    #[builder(default)]
    #[builder(setter(custom))]
    pub callback: Option<UrlCallback>,
}

impl TunnelSpec {
    pub fn builder() -> TunnelSpecBuilder {
        TunnelSpecBuilder::default()
    }

    /// Substitute the `{port}` placeholder into the command template
    pub fn render_command(&self, port: u16) -> String {
        self.command.replace("{port}", &port.to_string())
    }
}

impl TunnelSpecBuilder {
    pub fn callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&str, Option<&str>, &str) + Send + Sync + 'static,
    {
        self.callback = Some(Some(Arc::new(callback)));
        self
    }
}

impl fmt::Debug for TunnelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelSpec")
            .field("command", &self.command)
            .field("pattern", &self.pattern.as_str())
            .field("name", &self.name)
            .field("note", &self.note)
            .field("callback", &self.callback.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// One public URL extracted from a tunnel's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredUrl {
    pub url: String,
    pub note: Option<String>,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_command_substitutes_port() {
        let spec = TunnelSpec::builder()
            .command("cloudflared tunnel --url localhost:{port}")
            .pattern(Regex::new(r"[\w-]+\.trycloudflare\.com").unwrap())
            .name("Cloudflared")
            .build()
            .unwrap();

        assert_eq!(
            spec.render_command(7860),
            "cloudflared tunnel --url localhost:7860"
        );
    }

    #[test]
    fn test_render_command_without_placeholder() {
        let spec = TunnelSpec::builder()
            .command("echo https://example.trycloudflare.com")
            .pattern(Regex::new(r"[\w-]+\.trycloudflare\.com").unwrap())
            .name("Echo")
            .build()
            .unwrap();

        assert_eq!(
            spec.render_command(7860),
            "echo https://example.trycloudflare.com"
        );
    }

    #[test]
    fn test_builder_defaults() {
        let spec = TunnelSpec::builder()
            .command("lt --port {port}")
            .pattern(Regex::new(r"[\w-]+\.loca\.lt").unwrap())
            .name("Localtunnel")
            .build()
            .unwrap();

        assert!(spec.note.is_none());
        assert!(spec.callback.is_none());
    }

    #[test]
    fn test_builder_with_callback() {
        let spec = TunnelSpec::builder()
            .command("lt --port {port}")
            .pattern(Regex::new(r"[\w-]+\.loca\.lt").unwrap())
            .name("Localtunnel")
            .note("Password: 1.2.3.4")
            .callback(|_url, _note, _name| {})
            .build()
            .unwrap();

        assert!(spec.callback.is_some());
        assert_eq!(spec.note.as_deref(), Some("Password: 1.2.3.4"));
        let debug = format!("{spec:?}");
        assert!(debug.contains("Localtunnel"));
        assert!(debug.contains("<fn>"));
    }

    #[test]
    fn test_builder_missing_required_field() {
        let result = TunnelSpec::builder().name("Incomplete").build();
        assert!(result.is_err());
    }
}
