//! Agent Daemon configuration: `config.json` adjacent to the binary,
//! with argv/env fallback, config as the sole identity source.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use op15_domain::config::{ConfigIssue, ConfigSeverity};

fn default_http_port() -> u16 {
    4001
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    server_url: Option<String>,
    user_id: Option<String>,
    shared_secret: Option<String>,
    http_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub server_url: String,
    pub user_id: String,
    pub shared_secret: String,
    pub http_port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("missing serverUrl (no config file, env, or argv value)")]
    MissingServerUrl,
    #[error("missing userId (no config file, env, or argv value)")]
    MissingUserId,
    #[error("missing sharedSecret (no config file, env var OP15_SHARED_SECRET, or install-time token)")]
    MissingSharedSecret,
}

impl AgentConfig {
    /// Resolve configuration from, in priority order: argv overrides,
    /// the JSON config file, then environment variables. `serverUrl` and
    /// `userId` may be overridden by the first two positional CLI args;
    /// `sharedSecret` is never taken from argv: config is the sole
    /// identity source, and shared secrets never cross onto a command line.
    pub fn resolve(
        config_path: &Path,
        argv_server_url: Option<String>,
        argv_user_id: Option<String>,
    ) -> Result<Self, ConfigLoadError> {
        let raw = Self::read_file(config_path).unwrap_or_default();

        let server_url = argv_server_url
            .or(raw.server_url)
            .or_else(|| std::env::var("OP15_SERVER_URL").ok())
            .ok_or(ConfigLoadError::MissingServerUrl)?;

        let user_id = argv_user_id
            .or(raw.user_id)
            .or_else(|| std::env::var("OP15_USER_ID").ok())
            .ok_or(ConfigLoadError::MissingUserId)?;

        let shared_secret = raw
            .shared_secret
            .or_else(|| std::env::var("OP15_SHARED_SECRET").ok())
            .ok_or(ConfigLoadError::MissingSharedSecret)?;

        let http_port = raw.http_port.unwrap_or_else(default_http_port);

        Ok(Self {
            server_url,
            user_id,
            shared_secret,
            http_port,
        })
    }

    fn read_file(path: &Path) -> Option<RawConfig> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Every loopback listener MUST bind to `127.0.0.1`; there is no
    /// config knob for this, enforced by never exposing a bind-host
    /// field here.
    pub fn loopback_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(
            std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
            self.http_port,
        )
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.server_url.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "serverUrl is empty".to_string(),
            });
        }
        if self.shared_secret.len() < 16 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "sharedSecret is shorter than the recommended 128 bits".to_string(),
            });
        }
        issues
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn argv_overrides_file_values() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"{"serverUrl":"wss://file","userId":"file-user","sharedSecret":"0123456789abcdef"}"#,
        )
        .unwrap();
        let config = AgentConfig::resolve(
            file.path(),
            Some("wss://argv".to_string()),
            Some("argv-user".to_string()),
        )
        .unwrap();
        assert_eq!(config.server_url, "wss://argv");
        assert_eq!(config.user_id, "argv-user");
        assert_eq!(config.shared_secret, "0123456789abcdef");
    }

    #[test]
    fn missing_everything_is_an_error() {
        let missing = Path::new("/nonexistent/config.json");
        let err = AgentConfig::resolve(missing, None, None).unwrap_err();
        assert!(matches!(err, ConfigLoadError::MissingServerUrl));
    }

    #[test]
    fn loopback_addr_is_always_localhost() {
        let config = AgentConfig {
            server_url: "wss://x".into(),
            user_id: "u1".into(),
            shared_secret: "s".repeat(16),
            http_port: 4001,
        };
        assert_eq!(config.loopback_addr().ip(), std::net::Ipv4Addr::LOCALHOST);
    }
}
