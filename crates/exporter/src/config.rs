//! Exporter configuration

use anyhow::{Context, Result};
use exporter_lib::{ClientConfig, TlsSettings};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Exporter configuration, read once from the environment
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Goldmane gRPC endpoint
    #[serde(default = "default_goldmane_addr")]
    pub goldmane_addr: String,

    /// Listen address for the metrics server; `:port` binds all interfaces
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,

    /// Poll interval in seconds
    #[serde(default = "default_interval")]
    pub poll_interval: u64,

    /// Accepts `1`, `t`, `T`, `TRUE`, `true`, `True` and their false counterparts
    #[serde(default, deserialize_with = "flag::deserialize")]
    pub tls_enabled: bool,

    #[serde(default)]
    pub tls_cert_path: Option<String>,

    #[serde(default)]
    pub tls_key_path: Option<String>,

    #[serde(default)]
    pub tls_ca_path: Option<String>,

    /// Aggregation granularity requested from Goldmane, in seconds
    #[serde(default = "default_interval")]
    pub aggregation_interval: u64,

    /// Consecutive failed polls before reconnecting; 0 never reconnects
    #[serde(default)]
    pub reconnect_after_failures: u32,

    /// Time allowed for tasks to stop after a shutdown signal, in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

fn default_goldmane_addr() -> String {
    "localhost:9094".to_string()
}

fn default_metrics_addr() -> String {
    ":9090".to_string()
}

fn default_interval() -> u64 {
    15
}

fn default_shutdown_timeout() -> u64 {
    5
}

impl ExporterConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::default())
    }

    /// Load configuration from an explicit set of variables
    #[cfg(test)]
    fn from_vars(vars: &[(&str, &str)]) -> Result<Self> {
        let map: std::collections::HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        Self::from_environment(config::Environment::default().source(Some(map)))
    }

    fn from_environment(env: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(env.try_parsing(true).ignore_empty(true))
            .build()
            .context("failed to read environment")?;

        let config: Self = config
            .try_deserialize()
            .context("invalid exporter configuration")?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval == 0 {
            anyhow::bail!("POLL_INTERVAL must be greater than zero");
        }
        if self.aggregation_interval == 0 {
            anyhow::bail!("AGGREGATION_INTERVAL must be greater than zero");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn aggregation_interval(&self) -> Duration {
        Duration::from_secs(self.aggregation_interval)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }

    /// Addresses to try, in order, for the metrics listener.
    ///
    /// `:port` prefers the dual-stack IPv6 wildcard and falls back to IPv4 on
    /// hosts without IPv6.
    pub fn listen_addrs(&self) -> Vec<String> {
        if self.metrics_addr.starts_with(':') {
            vec![
                format!("[::]{}", self.metrics_addr),
                format!("0.0.0.0{}", self.metrics_addr),
            ]
        } else {
            vec![self.metrics_addr.clone()]
        }
    }

    pub fn tls_settings(&self) -> TlsSettings {
        TlsSettings {
            enabled: self.tls_enabled,
            cert_path: non_empty_path(&self.tls_cert_path),
            key_path: non_empty_path(&self.tls_key_path),
            ca_path: non_empty_path(&self.tls_ca_path),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.goldmane_addr).tls(self.tls_settings())
    }
}

fn non_empty_path(value: &Option<String>) -> Option<PathBuf> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
}

mod flag {
    use serde::{de, Deserializer};
    use std::fmt;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FlagVisitor;

        impl<'de> de::Visitor<'de> for FlagVisitor {
            type Value = bool;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "one of 1, t, T, TRUE, true, True, 0, f, F, FALSE, false, False")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
                Ok(v)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
                match v {
                    1 => Ok(true),
                    0 => Ok(false),
                    _ => Err(E::invalid_value(de::Unexpected::Signed(v), &self)),
                }
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
                match v {
                    1 => Ok(true),
                    0 => Ok(false),
                    _ => Err(E::invalid_value(de::Unexpected::Unsigned(v), &self)),
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<bool, E> {
                match v {
                    "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
                    "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
                    _ => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
                }
            }
        }

        deserializer.deserialize_any(FlagVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExporterConfig::from_vars(&[]).unwrap();

        assert_eq!(config.goldmane_addr, "localhost:9094");
        assert_eq!(config.metrics_addr, ":9090");
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.aggregation_interval(), Duration::from_secs(15));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.reconnect_after_failures, 0);
        assert!(!config.tls_enabled);
        assert_eq!(config.listen_addrs(), vec!["[::]:9090", "0.0.0.0:9090"]);
    }

    #[test]
    fn test_environment_overrides() {
        let config = ExporterConfig::from_vars(&[
            ("GOLDMANE_ADDR", "goldmane.calico-system.svc:7443"),
            ("METRICS_ADDR", "127.0.0.1:9100"),
            ("POLL_INTERVAL", "30"),
            ("TLS_ENABLED", "true"),
            ("TLS_CERT_PATH", "/certs/tls.crt"),
            ("TLS_KEY_PATH", "/certs/tls.key"),
            ("TLS_CA_PATH", "/certs/ca.crt"),
            ("RECONNECT_AFTER_FAILURES", "3"),
        ])
        .unwrap();

        assert_eq!(config.goldmane_addr, "goldmane.calico-system.svc:7443");
        assert_eq!(config.listen_addrs(), vec!["127.0.0.1:9100"]);
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.reconnect_after_failures, 3);

        let tls = config.tls_settings();
        assert!(tls.enabled);
        assert_eq!(tls.cert_path, Some(PathBuf::from("/certs/tls.crt")));
        assert_eq!(tls.key_path, Some(PathBuf::from("/certs/tls.key")));
        assert_eq!(tls.ca_path, Some(PathBuf::from("/certs/ca.crt")));

        let client = config.client_config();
        assert_eq!(client.endpoint, "goldmane.calico-system.svc:7443");
        assert!(client.tls.enabled);
    }

    #[test]
    fn test_empty_values_fall_back_to_defaults() {
        let config = ExporterConfig::from_vars(&[
            ("GOLDMANE_ADDR", ""),
            ("POLL_INTERVAL", ""),
            ("TLS_CERT_PATH", ""),
        ])
        .unwrap();

        assert_eq!(config.goldmane_addr, "localhost:9094");
        assert_eq!(config.poll_interval, 15);
        assert_eq!(config.tls_settings().cert_path, None);
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        assert!(ExporterConfig::from_vars(&[("POLL_INTERVAL", "0")]).is_err());
    }

    #[test]
    fn test_malformed_value_rejected() {
        assert!(ExporterConfig::from_vars(&[("POLL_INTERVAL", "soon")]).is_err());
        assert!(ExporterConfig::from_vars(&[("TLS_ENABLED", "maybe")]).is_err());
    }

    #[test]
    fn test_tls_enabled_accepts_short_forms() {
        for value in ["1", "t", "T", "TRUE", "true", "True"] {
            let config = ExporterConfig::from_vars(&[("TLS_ENABLED", value)]).unwrap();
            assert!(config.tls_enabled, "{value} should enable TLS");
        }
        for value in ["0", "f", "F", "FALSE", "false", "False"] {
            let config = ExporterConfig::from_vars(&[("TLS_ENABLED", value)]).unwrap();
            assert!(!config.tls_enabled, "{value} should disable TLS");
        }
    }
}
