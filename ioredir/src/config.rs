use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use osocks::server::MAX_SERVER;

fn default_server_address() -> String {
    "0.0.0.0".to_owned()
}

fn default_server_port() -> u16 {
    1205
}

fn default_redir_address() -> String {
    "127.0.0.1".to_owned()
}

fn default_redir_port() -> u16 {
    1081
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_address")]
    pub address: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RedirectConfig {
    #[serde(default = "default_redir_address")]
    pub address: String,
    #[serde(default = "default_redir_port")]
    pub port: u16,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        RedirectConfig {
            address: default_redir_address(),
            port: default_redir_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: Vec<ServerConfig>,
    #[serde(default)]
    pub redir: RedirectConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.is_empty() {
            return Err(ConfigError::NoServers);
        }
        if self.server.len() > MAX_SERVER {
            return Err(ConfigError::TooManyServers { max: MAX_SERVER });
        }
        for (index, server) in self.server.iter().enumerate() {
            if server.secret.is_none() {
                return Err(ConfigError::MissingSecret { index });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_when_omitted() {
        let toml = r#"
            [[server]]
            secret = "s3cr3t"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server[0].address, "0.0.0.0");
        assert_eq!(config.server[0].port, 1205);
        assert_eq!(config.redir.address, "127.0.0.1");
        assert_eq!(config.redir.port, 1081);
    }

    #[test]
    fn missing_secret_is_rejected() {
        let toml = r#"
            [[server]]
            address = "1.2.3.4"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSecret { index: 0 })
        ));
    }

    #[test]
    fn empty_server_list_is_rejected() {
        let toml = "";
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::NoServers)));
    }
}
