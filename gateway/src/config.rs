use std::env;
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv6Addr};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid bind address {0:?}")]
    InvalidAddress(String),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub address: String,
    pub port: i64,
    pub https_port: i64,
    pub https_certificate: String,
    pub https_private_key: String,
    pub ipv6: bool,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub organization: Option<String>,
    pub cache_address: String,
    pub request_timeout_secs: u64,
    pub model_cache_ttl_secs: u64,
    pub client_context_ttl_secs: u64,
    pub assets_dir: String,
    pub identity_interface: Option<String>,
    pub geoip_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8080,
            https_port: -1,
            https_certificate: String::new(),
            https_private_key: String::new(),
            ipv6: false,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            organization: None,
            cache_address: "redis://127.0.0.1:6379".to_string(),
            request_timeout_secs: 120,
            model_cache_ttl_secs: 600,
            client_context_ttl_secs: 86_400,
            assets_dir: "assets".to_string(),
            identity_interface: None,
            geoip_url: None,
        }
    }
}

impl Config {
    /// Reads the YAML file named by `GATEWAY_CONFIG` (or `config.yaml`) and applies
    /// environment overrides on top. A missing file falls back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("GATEWAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = match Self::from_file(&path) {
            Ok(config) => config,
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Self::default()
            }
            Err(error) => return Err(error),
        };
        config.apply_env();
        Ok(config.normalized())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        let config: Self = serde_yaml::from_str(text)?;
        Ok(config.normalized())
    }

    fn apply_env(&mut self) {
        if let Some(value) = env_string("HOST") {
            self.address = value;
        }
        if let Some(value) = env_parse("PORT") {
            self.port = value;
        }
        if let Some(value) = env_parse("HTTPS_PORT") {
            self.https_port = value;
        }
        if let Some(value) = env_string("HTTPS_CERTIFICATE") {
            self.https_certificate = value;
        }
        if let Some(value) = env_string("HTTPS_PRIVATE_KEY") {
            self.https_private_key = value;
        }
        if let Some(value) = env_parse("IPV6") {
            self.ipv6 = value;
        }
        if let Some(value) = env_string("OPENAI_API_KEY") {
            self.openai_api_key = Some(value);
        }
        if let Some(value) = env_string("OPENAI_BASE_URL") {
            self.openai_base_url = value;
        }
        if let Some(value) = env_string("CACHE_ADDRESS") {
            self.cache_address = value;
        }
        if let Some(value) = env_parse("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = value;
        }
        if let Some(value) = env_parse("MODEL_CACHE_TTL_SECS") {
            self.model_cache_ttl_secs = value;
        }
        if let Some(value) = env_string("ASSETS_DIR") {
            self.assets_dir = value;
        }
        if let Some(value) = env_string("IDENTITY_INTERFACE") {
            self.identity_interface = Some(value);
        }
        if let Some(value) = env_string("GEOIP_URL") {
            self.geoip_url = Some(value);
        }
    }

    fn normalized(mut self) -> Self {
        self.address = self.address.trim().to_string();
        if self.address.is_empty() {
            self.address = "0.0.0.0".to_string();
        }
        self.openai_base_url = self.openai_base_url.trim_end_matches('/').to_string();
        self.openai_api_key = self
            .openai_api_key
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self
    }

    pub fn http_enabled(&self) -> bool {
        self.port > 0
    }

    pub fn https_enabled(&self) -> bool {
        self.https_port > 0
            && !self.https_certificate.trim().is_empty()
            && !self.https_private_key.trim().is_empty()
    }

    /// The IPv6 flag wins over an explicit address.
    pub fn bind_ip(&self) -> Result<IpAddr, ConfigError> {
        if self.ipv6 {
            return Ok(IpAddr::V6(Ipv6Addr::UNSPECIFIED));
        }

        let address = self.address.trim_start_matches('[').trim_end_matches(']');
        address
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidAddress(self.address.clone()))
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|value| value.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn yaml_fields_and_defaults() {
        let config = Config::from_yaml(
            "address: 127.0.0.1\nport: 9000\nhttps_port: 9443\nopenai_base_url: http://up/v1/\n",
        )
        .unwrap();

        assert_eq!(config.address, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.https_port, 9443);
        assert_eq!(config.openai_base_url, "http://up/v1");
        assert_eq!(config.cache_address, "redis://127.0.0.1:6379");
        assert_eq!(config.request_timeout_secs, 120);
    }

    #[test]
    fn non_positive_http_port_disables_http() {
        let mut config = Config::default();
        config.port = 0;
        assert!(!config.http_enabled());
        config.port = -1;
        assert!(!config.http_enabled());
        config.port = 80;
        assert!(config.http_enabled());
    }

    #[test]
    fn https_requires_port_and_tls_material() {
        let mut config = Config::default();
        config.https_port = 8443;
        assert!(!config.https_enabled());

        config.https_certificate = "cert.pem".to_string();
        assert!(!config.https_enabled());

        config.https_private_key = "key.pem".to_string();
        assert!(config.https_enabled());

        config.https_port = 0;
        assert!(!config.https_enabled());
    }

    #[test]
    fn ipv6_flag_overrides_address() {
        let mut config = Config::default();
        config.address = "10.0.0.1".to_string();
        config.ipv6 = true;
        assert_eq!(
            config.bind_ip().unwrap(),
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        );
    }

    #[test]
    fn empty_address_defaults_to_any() {
        let config = Config::from_yaml("address: \"\"\n").unwrap();
        assert_eq!(config.bind_ip().unwrap().to_string(), "0.0.0.0");
    }

    #[test]
    fn unparsable_address_is_rejected() {
        let mut config = Config::default();
        config.address = "not an address".to_string();
        assert!(matches!(
            config.bind_ip(),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn reads_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port: -1\nhttps_port: 443\ncache_address: memory://").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(!config.http_enabled());
        assert_eq!(config.cache_address, "memory://");
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port: [not, a, number]").unwrap();

        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
