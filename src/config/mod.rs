//! Configuration module

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A single (username, password) pair accepted by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

/// Server-side configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port the server listens on for AUTH, PROXY and public traffic alike.
    pub port: u16,

    /// Advertised pool size. `0` (or negative in the YAML source) means
    /// "use the built-in default of 20".
    pub pool_size: i64,

    /// Seconds to wait on a dial/accept before giving up.
    pub connect_timeout: u64,

    /// Credentials accepted for AUTH.
    #[serde(default)]
    pub users: Vec<Credential>,

    /// Default directive used to initialize the tracing subscriber when
    /// `RUST_LOG` isn't set.
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: default_port(),
            pool_size: default_pool_size(),
            connect_timeout: default_connect_timeout(),
            users: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {}", path, e)))?;
        let config: ServerConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.users.is_empty() {
            return Err(Error::config("server config must list at least one user"));
        }
        Ok(())
    }

    /// The pool size actually advertised to clients: the configured value
    /// if positive, else the built-in default of 20 (spec.md §4.4 step 2).
    pub fn effective_pool_size(&self) -> usize {
        if self.pool_size > 0 {
            self.pool_size as usize
        } else {
            DEFAULT_SERVER_POOL_SIZE
        }
    }
}

/// Client-side configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// The server's address. If it contains no `:`, it is treated as a bare
    /// port and `localhost:<server_addr>` is dialed instead (spec.md §4.7
    /// step 2).
    pub server_addr: String,

    /// Port the hidden local service listens on.
    pub local_port: u16,

    /// Seconds to wait when dialing the server or the local service.
    pub connect_timeout: u64,

    pub username: String,
    pub password: String,

    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server_addr: "127.0.0.1:3339".to_string(),
            local_port: 8000,
            connect_timeout: default_connect_timeout(),
            username: String::new(),
            password: String::new(),
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {}", path, e)))?;
        let config: ClientConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_addr.is_empty() {
            return Err(Error::config("client config must set server_addr"));
        }
        if self.username.is_empty() || self.password.is_empty() {
            return Err(Error::config(
                "client config must set username and password",
            ));
        }
        Ok(())
    }

    /// Resolve the address to dial, per spec.md §4.7 step 2.
    pub fn resolve_server_addr(&self) -> String {
        if self.server_addr.contains(':') {
            self.server_addr.clone()
        } else {
            format!("localhost:{}", self.server_addr)
        }
    }
}

/// Server-side default when `pool_size` is absent or non-positive.
pub const DEFAULT_SERVER_POOL_SIZE: usize = 20;

/// Client-side default used when `AUTH_OK`'s `pool_size=` can't be parsed.
/// Deliberately different from [`DEFAULT_SERVER_POOL_SIZE`] — see spec.md §9
/// "Pool-size default asymmetry".
pub const DEFAULT_CLIENT_POOL_SIZE: usize = 10;

fn default_port() -> u16 {
    3339
}

fn default_pool_size() -> i64 {
    DEFAULT_SERVER_POOL_SIZE as i64
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_log_level() -> Option<String> {
    Some("info".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_from_yaml() {
        let yaml = r#"
port: 3339
pool_size: 3
users:
  - username: admin
    password: "123456"
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.port, 3339);
        assert_eq!(config.effective_pool_size(), 3);
    }

    #[test]
    fn test_server_pool_size_falls_back_to_default() {
        let mut config = ServerConfig::default();
        config.pool_size = 0;
        assert_eq!(config.effective_pool_size(), DEFAULT_SERVER_POOL_SIZE);

        config.pool_size = -1;
        assert_eq!(config.effective_pool_size(), DEFAULT_SERVER_POOL_SIZE);
    }

    #[test]
    fn test_server_config_requires_users() {
        let config = ServerConfig {
            users: Vec::new(),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_client_resolve_server_addr_with_port() {
        let mut config = ClientConfig::default();
        config.server_addr = "example.com:3339".to_string();
        assert_eq!(config.resolve_server_addr(), "example.com:3339");
    }

    #[test]
    fn test_client_resolve_server_addr_bare_port() {
        let mut config = ClientConfig::default();
        config.server_addr = "3339".to_string();
        assert_eq!(config.resolve_server_addr(), "localhost:3339");
    }

    #[test]
    fn test_client_config_requires_credentials() {
        let config = ClientConfig {
            username: String::new(),
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
