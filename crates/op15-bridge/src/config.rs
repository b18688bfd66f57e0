//! Bridge-side configuration: `load_or_default` falls back to defaults on
//! any read or parse failure rather than refusing to start.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use op15_domain::config::{ConfigIssue, ConfigSeverity};

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_heartbeat_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            port: default_port(),
            heartbeat_interval_secs: default_heartbeat_secs(),
        }
    }
}

impl BridgeConfig {
    pub fn load(path: &Path) -> op15_domain::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    pub fn socket_addr(&self) -> op15_domain::error::Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Collects every issue instead of failing on the first one found.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.port == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "port must be nonzero".to_string(),
            });
        }
        if self.heartbeat_interval_secs == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "heartbeatIntervalSecs is 0, heartbeats disabled".to_string(),
            });
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn zero_port_is_an_error() {
        let config = BridgeConfig { port: 0, ..Default::default() };
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let config = BridgeConfig::load_or_default(Path::new("/nonexistent/bridge.json"));
        assert_eq!(config.port, default_port());
    }
}
