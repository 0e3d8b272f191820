use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_RETENTION: usize = 200; // samples kept per identity
pub const DEFAULT_QUEUE_CAPACITY: usize = 256; // per-subscriber outbound queue
pub const MAX_PAYLOAD_BYTES: usize = 16 * 1024; // report bodies and inbound WS frames
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30; // WS ping cadence

/// Top-level config (waypost.toml + WAYPOST_* env overrides + PORT).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaypostConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub fanout: FanoutConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_payload")]
    pub max_payload_bytes: usize,
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: DEFAULT_PORT,
            max_payload_bytes: MAX_PAYLOAD_BYTES,
            heartbeat_secs: HEARTBEAT_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum samples retained per identity; oldest are evicted first.
    #[serde(default = "default_retention")]
    pub retention: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Outbound queue depth per subscriber. A subscriber whose queue is full
    /// at publish time is evicted.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub coordinates: CoordinatePolicy,
}

/// What ingest does with a latitude/longitude outside the geographic range.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CoordinatePolicy {
    /// Reject the report as malformed.
    #[default]
    Reject,
    /// Accept it, mark the sample `out_of_range`, and log a warning.
    Flag,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_max_payload() -> usize {
    MAX_PAYLOAD_BYTES
}
fn default_heartbeat() -> u64 {
    HEARTBEAT_INTERVAL_SECS
}
fn default_retention() -> usize {
    DEFAULT_RETENTION
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl WaypostConfig {
    /// Load config from a TOML file with env var overrides.
    ///
    /// Precedence, lowest first:
    ///   1. Built-in defaults
    ///   2. TOML file (explicit path, else ~/.waypost/waypost.toml)
    ///   3. WAYPOST_* env vars, `__` separating sections (WAYPOST_GATEWAY__PORT)
    ///   4. Bare PORT env var
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let figment = Figment::from(Serialized::defaults(WaypostConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed("WAYPOST_").split("__"))
            .merge(Env::raw().only(&["PORT"]).map(|_| "gateway.port".into()));

        Self::from_figment(figment)
    }

    /// Extract a config from an already-assembled figment.
    pub fn from_figment(figment: Figment) -> crate::error::Result<Self> {
        figment
            .extract()
            .map_err(|e| crate::error::WaypostError::Config(e.to_string()))
    }

    /// `bind:port` string for the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.gateway.bind, self.gateway.port)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.waypost/waypost.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(src: &str) -> crate::error::Result<WaypostConfig> {
        WaypostConfig::from_figment(
            Figment::from(Serialized::defaults(WaypostConfig::default())).merge(Toml::string(src)),
        )
    }

    #[test]
    fn defaults_match_original_server() {
        let config = WaypostConfig::default();
        assert_eq!(config.gateway.port, 5000);
        assert_eq!(config.history.retention, 200);
        assert_eq!(config.ingest.coordinates, CoordinatePolicy::Reject);
        assert_eq!(config.listen_addr(), "0.0.0.0:5000");
    }

    #[test]
    fn toml_overrides_selected_keys() {
        let config = from_toml(
            r#"
            [gateway]
            port = 8080

            [fanout]
            queue_capacity = 8

            [ingest]
            coordinates = "flag"
            "#,
        )
        .unwrap();

        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.bind, DEFAULT_BIND);
        assert_eq!(config.fanout.queue_capacity, 8);
        assert_eq!(config.history.retention, DEFAULT_RETENTION);
        assert_eq!(config.ingest.coordinates, CoordinatePolicy::Flag);
    }

    #[test]
    fn unknown_policy_is_a_config_error() {
        let err = from_toml("[ingest]\ncoordinates = \"clamp\"\n").unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
