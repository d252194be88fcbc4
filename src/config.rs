use crate::agent::{AgentOptions, VerifyAgainst};
use crate::error::{HijackError, HijackResult};
use crate::mapping::MappingConfig;
use crate::tls_utils;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Static host mapping: requested hostname -> replacement hostname
    #[serde(default)]
    pub mapping: HashMap<String, String>,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub keepalive_timeout_secs: u64,
    pub connection_timeout_secs: u64,
    /// Max idle pooled connections per host
    pub max_idle_connections: usize,
    /// Hostname used for TLS SNI and certificate verification on hijacked
    /// connections ("replacement" or "original")
    pub verify_against: VerifyAgainst,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Extra CA certificates to trust (PEM format)
    pub ca_file: Option<String>,
    /// Whether to trust the platform's native roots
    pub native_roots: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Log file path; console only when unset
    pub file: Option<String>,
    pub json: bool,
    /// Rotate the log file daily
    pub rotation: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            keepalive_timeout_secs: 60,
            connection_timeout_secs: 10,
            max_idle_connections: 10,
            verify_against: VerifyAgainst::Replacement,
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            ca_file: None,
            native_roots: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
            rotation: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        Ok(config)
    }

    /// Load configuration from file or use default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config file, using defaults: {}", e);
            Self::default()
        })
    }

    /// Check mapping entries and agent settings
    pub fn validate(&self) -> HijackResult<()> {
        for (host, replacement) in &self.mapping {
            validate_host(host)?;
            validate_host(replacement)?;
        }

        if self.agent.keepalive_timeout_secs == 0 {
            return Err(HijackError::Config(
                "agent.keepalive_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.agent.connection_timeout_secs == 0 {
            return Err(HijackError::Config(
                "agent.connection_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if !self.tls.native_roots && self.tls.ca_file.is_none() {
            return Err(HijackError::Config(
                "tls.native_roots is disabled and no tls.ca_file is set".to_string(),
            ));
        }
        Ok(())
    }

    /// Mapping to install; `None` (passthrough) when the table is empty
    pub fn mapping_config(&self) -> Option<MappingConfig> {
        if self.mapping.is_empty() {
            None
        } else {
            Some(MappingConfig::from(self.mapping.clone()))
        }
    }

    /// Agent options, loading TLS roots as configured
    pub fn agent_options(&self) -> HijackResult<AgentOptions> {
        let tls_config = tls_utils::client_config(&self.tls)?;
        Ok(AgentOptions {
            keepalive_timeout: Duration::from_secs(self.agent.keepalive_timeout_secs),
            connection_timeout: Duration::from_secs(self.agent.connection_timeout_secs),
            max_idle_connections: self.agent.max_idle_connections,
            verify_against: self.agent.verify_against,
            tls_config: Some(Arc::new(tls_config)),
            ..AgentOptions::default()
        })
    }
}

/// A mapping host must be a bare hostname: no scheme, path or port
fn validate_host(host: &str) -> HijackResult<()> {
    let invalid =
        |reason: &str| HijackError::Config(format!("Invalid mapping host '{}': {}", host, reason));

    if host.trim().is_empty() {
        return Err(invalid("empty hostname"));
    }
    if host.contains("://") {
        return Err(invalid("scheme not allowed"));
    }
    if host.contains('/') {
        return Err(invalid("path not allowed"));
    }
    // IPv6 literals are the only hosts allowed to contain ':'
    if host.contains(':') && host.parse::<std::net::Ipv6Addr>().is_err() {
        return Err(invalid("port not allowed"));
    }
    Ok(())
}
