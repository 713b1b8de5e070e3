//! Nested-key JSON settings store shared with the surrounding launch
//! tooling, plus the cached public-IP lookup used for tunnel notes.

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const IP_ECHO_URL: &str = "https://api64.ipify.org?format=json&ipv4=true";
const IP_ECHO_TIMEOUT: Duration = Duration::from_secs(5);

/// JSON settings file addressed with dotted keys, e.g.
/// `ENVIRONMENT.public_ip`. A missing file reads as empty; a corrupt file
/// is logged and likewise reads as empty.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value under the dotted key, if present
    pub fn read(&self, key: &str) -> Option<Value> {
        let mut current = self.load();
        for part in key.split('.') {
            current = current.get(part)?.clone();
        }
        Some(current)
    }

    /// String value under the dotted key, if present
    pub fn read_str(&self, key: &str) -> Option<String> {
        self.read(key)?.as_str().map(str::to_string)
    }

    /// Set the value under the dotted key, creating intermediate objects
    pub fn save(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let mut root = self.load();
        set_nested(&mut root, key, value.into());
        self.write(&root)
    }

    /// Overwrite the value under an existing dotted key; unknown keys are
    /// logged and left untouched
    pub fn update(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        if !self.key_exists(key) {
            warn!(%key, "settings key does not exist, no update performed");
            return Ok(());
        }
        self.save(key, value)
    }

    pub fn key_exists(&self, key: &str) -> bool {
        self.read(key).is_some()
    }

    /// Remove the dotted key, if present
    pub fn delete_key(&self, key: &str) -> Result<()> {
        let mut root = self.load();
        let mut parts = key.split('.').collect::<Vec<_>>();
        let last = match parts.pop() {
            Some(last) => last,
            None => return Ok(()),
        };

        let mut current = &mut root;
        for part in parts {
            match current.get_mut(part) {
                Some(next) => current = next,
                None => return Ok(()),
            }
        }
        if let Some(map) = current.as_object_mut() {
            map.remove(last);
        }
        self.write(&root)
    }

    fn load(&self) -> Value {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(_) => return json!({}),
        };
        match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not parse settings file");
                json!({})
            }
        }
    }

    fn write(&self, root: &Value) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(root)?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("writing {}", self.path.display()))
    }
}

fn set_nested(root: &mut Value, key: &str, value: Value) {
    let mut parts = key.split('.').collect::<Vec<_>>();
    let last = match parts.pop() {
        Some(last) => last,
        None => return,
    };

    let mut current = root;
    for part in parts {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Some(map) = current.as_object_mut() else {
            return;
        };
        current = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(last.to_string(), value);
    }
}

/// Public IPv4 address, cached under `ENVIRONMENT.public_ip` so repeat
/// launches skip the lookup. Failure degrades to `"N/A"` and is logged.
pub async fn cached_public_ip(store: &SettingsStore) -> String {
    if let Some(ip) = store.read_str("ENVIRONMENT.public_ip") {
        return ip;
    }

    match fetch_public_ip().await {
        Ok(ip) => {
            if let Err(e) = store.save("ENVIRONMENT.public_ip", ip.clone()) {
                warn!(error = %format!("{e:#}"), "could not cache public IP");
            }
            ip
        }
        Err(e) => {
            warn!(error = %format!("{e:#}"), "could not determine public IP");
            "N/A".to_string()
        }
    }
}

async fn fetch_public_ip() -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(IP_ECHO_TIMEOUT)
        .build()?;
    let value: Value = client
        .get(IP_ECHO_URL)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    value
        .get("ip")
        .and_then(Value::as_str)
        .map(str::to_string)
        .context("IP echo response had no ip field")
}
