//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.wabridge/config.json`) and environment.
//! Everything has a working default so the bridge can run from env vars alone.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings (HTTP ingress + visitor WebSocket).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Channel connector and addressing settings.
    #[serde(default)]
    pub channel: ChannelConfig,
}

/// Gateway bind and port settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP and WebSocket (default 3001).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1"). Visitors are anonymous by contract,
    /// so exposing the port beyond loopback is a reverse-proxy decision, not an
    /// auth one.
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    3001
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// True when bind address is loopback (127.0.0.1, ::1, localhost).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Channel settings: where the session gateway lives, who the operator is,
/// and how local phone numbers are canonicalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    /// WebSocket URL of the session gateway that owns the authenticated
    /// WhatsApp session. Overridden by WABRIDGE_CONNECTOR_URL when set.
    pub connector_url: Option<String>,

    /// Operator phone number ("07..." or "+254..." both work; it is
    /// normalized at startup). Overridden by WABRIDGE_OPERATOR_NUMBER.
    pub operator_number: Option<String>,

    /// Country calling code that replaces the trunk prefix (default "254").
    #[serde(default = "default_country_code")]
    pub country_code: String,

    /// Local trunk prefix digit (default "0").
    #[serde(default = "default_trunk_prefix")]
    pub trunk_prefix: String,
}

fn default_country_code() -> String {
    "254".to_string()
}

fn default_trunk_prefix() -> String {
    "0".to_string()
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connector_url: None,
            operator_number: None,
            country_code: default_country_code(),
            trunk_prefix: default_trunk_prefix(),
        }
    }
}

/// Default session-gateway URL when neither env nor config sets one.
const DEFAULT_CONNECTOR_URL: &str = "ws://127.0.0.1:8055/ws";

/// Fallback operator number when neither env nor config sets one.
const DEFAULT_OPERATOR_NUMBER: &str = "254700000000";

/// Resolve the session-gateway URL: env WABRIDGE_CONNECTOR_URL overrides config.
pub fn resolve_connector_url(config: &Config) -> String {
    std::env::var("WABRIDGE_CONNECTOR_URL")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .channel
                .connector_url
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_CONNECTOR_URL.to_string())
}

/// Resolve the operator phone number: env WABRIDGE_OPERATOR_NUMBER overrides
/// config; falls back to the fixed default when both are unset.
pub fn resolve_operator_number(config: &Config) -> String {
    std::env::var("WABRIDGE_OPERATOR_NUMBER")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .channel
                .operator_number
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| DEFAULT_OPERATOR_NUMBER.to_string())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("WABRIDGE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".wabridge").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or WABRIDGE_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_gateway_port_and_bind() {
        let g = GatewayConfig::default();
        assert_eq!(g.port, 3001);
        assert_eq!(g.bind, "127.0.0.1");
    }

    #[test]
    fn default_channel_addressing() {
        let c = ChannelConfig::default();
        assert_eq!(c.country_code, "254");
        assert_eq!(c.trunk_prefix, "0");
        assert!(c.connector_url.is_none());
        assert!(c.operator_number.is_none());
    }

    #[test]
    fn parse_camel_case_config() {
        let json = r#"{
            "gateway": { "port": 4000, "bind": "0.0.0.0" },
            "channel": {
                "connectorUrl": "ws://gateway.internal:8055/ws",
                "operatorNumber": "+254712345678",
                "countryCode": "255",
                "trunkPrefix": "0"
            }
        }"#;
        let config: Config = serde_json::from_str(json).expect("parse config");
        assert_eq!(config.gateway.port, 4000);
        assert_eq!(
            config.channel.connector_url.as_deref(),
            Some("ws://gateway.internal:8055/ws")
        );
        assert_eq!(config.channel.country_code, "255");
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = serde_json::from_str("{}").expect("parse empty config");
        assert_eq!(config.gateway.port, 3001);
        assert_eq!(config.channel.country_code, "254");
    }
}
