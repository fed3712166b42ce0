use anyhow::{Context, Result};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::warn;

pub const DEFAULT_ADMIN_TOKEN: &str = "default_admin_token";

/// Runtime settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub admin_token: String,
    pub host: String,
    pub port: u16,
    /// Upper bound on the contact directory fetch.
    pub sync_timeout: Duration,
    /// Pause after connecting before the first contact fetch.
    pub sync_delay: Duration,
    pub device_name: String,
    pub log_level: String,
    pub log_json: bool,
    /// Shell command launching the protocol helper. None runs detached.
    pub client_cmd: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            admin_token: DEFAULT_ADMIN_TOKEN.to_string(),
            host: "127.0.0.1".to_string(),
            port: 8081,
            sync_timeout: Duration::from_secs(30),
            sync_delay: Duration::from_millis(2000),
            device_name: "chatbridge".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            client_cmd: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            admin_token: get("ADMIN_TOKEN").unwrap_or(defaults.admin_token),
            host: get("BRIDGE_HOST").unwrap_or(defaults.host),
            port: get("BRIDGE_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            sync_timeout: get("WHATSAPP_TIMEOUT")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.sync_timeout),
            sync_delay: get("CONTACT_SYNC_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.sync_delay),
            device_name: get("DEVICE_NAME").unwrap_or(defaults.device_name),
            log_level: get("LOG_LEVEL")
                .map(|v| v.to_lowercase())
                .unwrap_or(defaults.log_level),
            log_json: get("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.log_json),
            client_cmd: get("BRIDGE_CLIENT_CMD"),
        }
    }

    /// Bind the HTTP listener. The host may be a hostname such as `localhost`.
    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("Failed to listen on {}:{}", self.host, self.port))
    }

    /// Log settings that are unsafe to run with.
    pub fn warn_insecure(&self) {
        if self.admin_token == DEFAULT_ADMIN_TOKEN {
            warn!("ADMIN_TOKEN not set, using the default token");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]);
        assert_eq!(cfg.admin_token, DEFAULT_ADMIN_TOKEN);
        assert_eq!(cfg.port, 8081);
        assert_eq!(cfg.sync_timeout, Duration::from_secs(30));
        assert!(cfg.client_cmd.is_none());
    }

    #[test]
    fn overrides_are_read() {
        let cfg = config(&[
            ("ADMIN_TOKEN", "s3cret"),
            ("BRIDGE_PORT", "9000"),
            ("WHATSAPP_TIMEOUT", "5"),
            ("LOG_LEVEL", "DEBUG"),
            ("LOG_FORMAT", "json"),
            ("BRIDGE_CLIENT_CMD", "wa-helper --stdio"),
        ]);
        assert_eq!(cfg.admin_token, "s3cret");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.sync_timeout, Duration::from_secs(5));
        assert_eq!(cfg.log_level, "debug");
        assert!(cfg.log_json);
        assert_eq!(cfg.client_cmd.as_deref(), Some("wa-helper --stdio"));
    }

    #[test]
    fn unparseable_numbers_fall_back() {
        let cfg = config(&[("BRIDGE_PORT", "eighty"), ("WHATSAPP_TIMEOUT", "-1")]);
        assert_eq!(cfg.port, 8081);
        assert_eq!(cfg.sync_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn binds_hostnames_as_well_as_addresses() {
        let cfg = config(&[("BRIDGE_HOST", "localhost"), ("BRIDGE_PORT", "0")]);
        let listener = cfg.bind().await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }
}
