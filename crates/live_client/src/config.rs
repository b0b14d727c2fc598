use std::{fs, io, path::Path, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::connection::{ConnectionOptions, ReconnectPolicy, DEFAULT_RECONNECT_DELAY};

pub const DEFAULT_CONFIG_FILE: &str = "live-client.toml";
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8000/ws/investigations";
const DEFAULT_MAX_RECONNECT_DELAY_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server_url: String,
    pub reconnect_delay_ms: u64,
    pub reconnect_max_delay_ms: Option<u64>,
    pub reconnect_max_attempts: Option<u32>,
    pub heartbeat_interval_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.into(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            reconnect_max_delay_ms: None,
            reconnect_max_attempts: None,
            heartbeat_interval_secs: None,
        }
    }
}

impl Settings {
    /// Endpoint to dial. `http(s)://` is rewritten to `ws(s)://`.
    pub fn websocket_url(&self) -> Result<Url> {
        let raw = self.server_url.trim();
        let rewritten = if let Some(rest) = raw.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = raw.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            raw.to_string()
        };
        let url = Url::parse(&rewritten).with_context(|| format!("invalid server url '{raw}'"))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(anyhow!(
                "server url must use ws://, wss://, http:// or https:// (got '{other}')"
            )),
        }
    }

    /// Fixed delay unless a ceiling or an attempt limit is configured.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let initial = Duration::from_millis(self.reconnect_delay_ms);
        if self.reconnect_max_delay_ms.is_none() && self.reconnect_max_attempts.is_none() {
            return ReconnectPolicy::Fixed { delay: initial };
        }
        let max = self
            .reconnect_max_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_MAX_RECONNECT_DELAY_MS))
            .max(initial);
        ReconnectPolicy::Exponential {
            initial,
            max,
            max_attempts: self.reconnect_max_attempts,
        }
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn connection_options(&self) -> Result<ConnectionOptions> {
        let mut options = ConnectionOptions::new(self.websocket_url()?);
        options.reconnect = self.reconnect_policy();
        options.heartbeat = self.heartbeat_interval();
        Ok(options)
    }
}

/// Defaults, then the TOML file, then environment overrides. Without an
/// explicit `path` a missing `live-client.toml` is not an error.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let (path, required) = match path {
        Some(path) => (path, true),
        None => (Path::new(DEFAULT_CONFIG_FILE), false),
    };
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => parse_settings(&raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound && !required => Settings::default(),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    };
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

pub fn parse_settings(raw: &str) -> Result<Settings> {
    Ok(toml::from_str(raw)?)
}

pub fn apply_env_overrides<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("INVESTIGATION_WS_URL") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("APP__SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = parsed(&lookup, "APP__RECONNECT_DELAY_MS") {
        settings.reconnect_delay_ms = v;
    }
    if let Some(v) = parsed(&lookup, "APP__RECONNECT_MAX_DELAY_MS") {
        settings.reconnect_max_delay_ms = Some(v);
    }
    if let Some(v) = parsed(&lookup, "APP__RECONNECT_MAX_ATTEMPTS") {
        settings.reconnect_max_attempts = Some(v);
    }
    if let Some(v) = parsed(&lookup, "APP__HEARTBEAT_INTERVAL_SECS") {
        settings.heartbeat_interval_secs = Some(v);
    }
}

fn parsed<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "live_client: ignoring unparsable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_local_investigation_feed() {
        let settings = Settings::default();
        assert_eq!(
            settings.websocket_url().expect("url").as_str(),
            DEFAULT_SERVER_URL
        );
        assert_eq!(settings.reconnect_policy(), ReconnectPolicy::default());
        assert_eq!(settings.heartbeat_interval(), None);
    }

    #[test]
    fn http_urls_are_rewritten_to_websocket_schemes() {
        let mut settings = Settings {
            server_url: "https://fraud.example.com/ws/investigations".into(),
            ..Settings::default()
        };
        assert_eq!(settings.websocket_url().expect("url").scheme(), "wss");

        settings.server_url = "http://127.0.0.1:8000/ws/investigations".into();
        assert_eq!(
            settings.websocket_url().expect("url").as_str(),
            "ws://127.0.0.1:8000/ws/investigations"
        );

        settings.server_url = "ftp://example.com".into();
        assert!(settings.websocket_url().is_err());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let settings = parse_settings(
            r#"
server_url = "ws://risk-desk:9000/ws/investigations"
reconnect_max_attempts = 5
"#,
        )
        .expect("settings");
        assert_eq!(settings.server_url, "ws://risk-desk:9000/ws/investigations");
        assert_eq!(settings.reconnect_delay_ms, 3000);
        assert_eq!(
            settings.reconnect_policy(),
            ReconnectPolicy::Exponential {
                initial: Duration::from_millis(3000),
                max: Duration::from_millis(DEFAULT_MAX_RECONNECT_DELAY_MS),
                max_attempts: Some(5),
            }
        );
    }

    #[test]
    fn env_overrides_win_and_bad_numbers_are_ignored() {
        let mut settings = Settings::default();
        apply_env_overrides(
            &mut settings,
            lookup_from(&[
                ("INVESTIGATION_WS_URL", "ws://first/ws"),
                ("APP__SERVER_URL", "ws://second/ws"),
                ("APP__RECONNECT_DELAY_MS", "250"),
                ("APP__RECONNECT_MAX_ATTEMPTS", "many"),
                ("APP__HEARTBEAT_INTERVAL_SECS", "15"),
            ]),
        );
        assert_eq!(settings.server_url, "ws://second/ws");
        assert_eq!(settings.reconnect_delay_ms, 250);
        assert_eq!(settings.reconnect_max_attempts, None);
        assert_eq!(settings.heartbeat_interval(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn connection_options_carry_policy_and_heartbeat() {
        let settings = Settings {
            reconnect_delay_ms: 500,
            reconnect_max_delay_ms: Some(100),
            heartbeat_interval_secs: Some(0),
            ..Settings::default()
        };
        let options = settings.connection_options().expect("options");
        assert_eq!(
            options.reconnect,
            ReconnectPolicy::Exponential {
                initial: Duration::from_millis(500),
                max: Duration::from_millis(500),
                max_attempts: None,
            }
        );
        assert_eq!(options.heartbeat, None);
    }

    #[test]
    fn explicit_missing_or_broken_file_is_an_error() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let temp_root = env::temp_dir().join(format!("live_client_config_test_{suffix}"));
        fs::create_dir_all(&temp_root).expect("temp root");

        let missing = temp_root.join("absent.toml");
        assert!(load_settings(Some(&missing)).is_err());

        let broken = temp_root.join("broken.toml");
        fs::write(&broken, "server_url = [not toml").expect("write");
        let err = load_settings(Some(&broken)).expect_err("must fail");
        assert!(err.to_string().contains("failed to parse config file"));

        fs::remove_dir_all(temp_root).expect("cleanup");
    }
}
