//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use nanoc6_core::SupabaseClient;
use nanoc6_core::supabase::DEFAULT_TIMEOUT;

/// Environment variable overriding `backend.url`.
pub const BACKEND_URL_ENV: &str = "NANOC6_BACKEND_URL";

/// Environment variable overriding `backend.api_key`.
pub const API_KEY_ENV: &str = "NANOC6_API_KEY";

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Readings backend settings.
    pub backend: BackendConfig,
    /// Readings page settings.
    pub page: PageConfig,
    /// Devices to collect from.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Apply `NANOC6_BACKEND_URL` and `NANOC6_API_KEY` from the environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply backend overrides from a variable lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(BACKEND_URL_ENV).filter(|v| !v.is_empty()) {
            self.backend.url = url;
        }
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
            self.backend.api_key = key;
        }
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - Server bind address is valid (host:port format)
    /// - Backend URL and API key are consistent
    /// - Device addresses are not empty and not duplicated
    /// - Device poll intervals are within reasonable bounds (10s - 1 hour)
    ///
    /// # Example
    ///
    /// ```
    /// use nanoc6_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.backend.validate());
        errors.extend(self.page.validate());

        let mut seen_addresses = std::collections::HashSet::new();
        for (i, device) in self.devices.iter().enumerate() {
            let prefix = format!("devices[{}]", i);
            errors.extend(device.validate(&prefix));

            let addr_lower = device.address.to_lowercase();
            if !seen_addresses.insert(addr_lower) {
                errors.push(ValidationError {
                    field: format!("{}.address", prefix),
                    message: format!("duplicate device address '{}'", device.address),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: "bind address cannot be empty".to_string(),
            });
            return errors;
        }

        let Some((_, port)) = self.bind.rsplit_once(':') else {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: format!(
                    "invalid bind address '{}': expected format 'host:port'",
                    self.bind
                ),
            });
            return errors;
        };

        match port.parse::<u16>() {
            Ok(0) => errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: "port cannot be 0".to_string(),
            }),
            Err(_) => errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: format!("invalid port '{}': must be a number 1-65535", port),
            }),
            Ok(_) => {}
        }

        errors
    }
}

/// Readings backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Supabase project URL (e.g., "https://abc.supabase.co").
    pub url: String,
    /// Project API key.
    pub api_key: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl BackendConfig {
    /// Whether a backend URL has been configured.
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// Build a client for the configured backend.
    pub fn client(&self) -> nanoc6_core::Result<SupabaseClient> {
        SupabaseClient::with_timeout(
            &self.url,
            &self.api_key,
            Duration::from_secs(self.timeout_secs),
        )
    }

    /// Validate backend configuration.
    ///
    /// An empty URL is allowed here; the service reports it at startup.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.is_configured() {
            let url = self.url.trim();
            if !url.starts_with("http://") && !url.starts_with("https://") {
                errors.push(ValidationError {
                    field: "backend.url".to_string(),
                    message: format!("URL '{}' must start with http:// or https://", url),
                });
            }
            if self.api_key.trim().is_empty() {
                errors.push(ValidationError {
                    field: "backend.api_key".to_string(),
                    message: "API key is required when a backend URL is set".to_string(),
                });
            }
        }

        if self.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "backend.timeout_secs".to_string(),
                message: "timeout must be at least 1 second".to_string(),
            });
        }

        errors
    }
}

/// Readings page configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    /// Page title.
    pub title: String,
    /// Maximum readings shown on the page; unset shows all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            title: "Readings".to_string(),
            limit: None,
        }
    }
}

impl PageConfig {
    /// Validate page configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.title.trim().is_empty() {
            errors.push(ValidationError {
                field: "page.title".to_string(),
                message: "title cannot be empty".to_string(),
            });
        }
        if self.limit == Some(0) {
            errors.push(ValidationError {
                field: "page.limit".to_string(),
                message: "limit must be at least 1 (omit for no limit)".to_string(),
            });
        }
        errors
    }
}

/// Configuration for a device to collect from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device address or name.
    pub address: String,
    /// Friendly alias for the device.
    #[serde(default)]
    pub alias: Option<String>,
    /// MAC address to report readings under, when `address` is not one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Poll interval in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

/// Minimum poll interval in seconds (10 seconds).
pub const MIN_POLL_INTERVAL: u64 = 10;
/// Maximum poll interval in seconds (1 hour).
pub const MAX_POLL_INTERVAL: u64 = 3600;

/// Devices upload a reading every ten minutes on their own.
fn default_poll_interval() -> u64 {
    600
}

impl DeviceConfig {
    /// Create a device entry with the default poll interval.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            alias: None,
            mac: None,
            poll_interval: default_poll_interval(),
        }
    }

    /// Validate device configuration.
    pub fn validate(&self, prefix: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push(ValidationError {
                field: format!("{}.address", prefix),
                message: "device address cannot be empty".to_string(),
            });
        } else if self.address.len() < 3 {
            errors.push(ValidationError {
                field: format!("{}.address", prefix),
                message: format!(
                    "device address '{}' is too short (minimum 3 characters)",
                    self.address
                ),
            });
        }

        if let Some(alias) = &self.alias
            && alias.is_empty()
        {
            errors.push(ValidationError {
                field: format!("{}.alias", prefix),
                message: "alias cannot be empty string (use null/omit instead)".to_string(),
            });
        }

        if let Some(mac) = &self.mac
            && mac.parse::<nanoc6_types::MacAddress>().is_err()
        {
            errors.push(ValidationError {
                field: format!("{}.mac", prefix),
                message: format!("'{}' is not a MAC address", mac),
            });
        }

        if self.poll_interval < MIN_POLL_INTERVAL {
            errors.push(ValidationError {
                field: format!("{}.poll_interval", prefix),
                message: format!(
                    "poll interval {} is too short (minimum {} seconds)",
                    self.poll_interval, MIN_POLL_INTERVAL
                ),
            });
        } else if self.poll_interval > MAX_POLL_INTERVAL {
            errors.push(ValidationError {
                field: format!("{}.poll_interval", prefix),
                message: format!(
                    "poll interval {} is too long (maximum {} seconds / 1 hour)",
                    self.poll_interval, MAX_POLL_INTERVAL
                ),
            });
        }

        errors
    }

    /// Name used in logs and stats.
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.address)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `devices[0].address`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nanoc6")
        .join("server.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert!(!config.backend.is_configured());
        assert_eq!(config.backend.timeout_secs, 10);
        assert_eq!(config.page.title, "Readings");
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_device_config_serde() {
        let toml = r#"
            address = "NanoC6-D4E5F6"
            alias = "Greenhouse"
            mac = "4C:75:25:D4:E5:F6"
            poll_interval = 120
        "#;
        let config: DeviceConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.address, "NanoC6-D4E5F6");
        assert_eq!(config.alias.as_deref(), Some("Greenhouse"));
        assert_eq!(config.mac.as_deref(), Some("4C:75:25:D4:E5:F6"));
        assert_eq!(config.poll_interval, 120);
        assert_eq!(config.display_name(), "Greenhouse");
    }

    #[test]
    fn test_device_config_default_poll_interval() {
        let toml = r#"address = "4C:75:25:D4:E5:F6""#;
        let config: DeviceConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.poll_interval, 600);
        assert_eq!(config.alias, None);
        assert_eq!(config.display_name(), "4C:75:25:D4:E5:F6");
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("server.toml");

        let config = Config {
            server: ServerConfig {
                bind: "0.0.0.0:9090".to_string(),
            },
            backend: BackendConfig {
                url: "https://abc.supabase.co".to_string(),
                api_key: "anon".to_string(),
                timeout_secs: 5,
            },
            page: PageConfig {
                title: "Greenhouse".to_string(),
                limit: Some(50),
            },
            devices: vec![DeviceConfig {
                alias: Some("Test Device".to_string()),
                poll_interval: 30,
                ..DeviceConfig::new("4C:75:25:D4:E5:F6")
            }],
        };

        config.save(&config_path).unwrap();
        let loaded = Config::load_validated(&config_path).unwrap();

        assert_eq!(loaded.server.bind, "0.0.0.0:9090");
        assert_eq!(loaded.backend.url, "https://abc.supabase.co");
        assert_eq!(loaded.backend.timeout_secs, 5);
        assert_eq!(loaded.page.limit, Some(50));
        assert_eq!(loaded.devices.len(), 1);
        assert_eq!(loaded.devices[0].alias.as_deref(), Some("Test Device"));
        assert_eq!(loaded.devices[0].poll_interval, 30);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [server]
            bind = "192.168.1.1:8888"

            [backend]
            url = "https://abc.supabase.co"
            api_key = "anon"

            [page]
            title = "Lab"
            limit = 100

            [[devices]]
            address = "NanoC6-D4E5F6"
            alias = "Lab bench"

            [[devices]]
            address = "4C:75:25:11:22:33"
            poll_interval = 120
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "192.168.1.1:8888");
        assert_eq!(config.backend.timeout_secs, 10);
        assert_eq!(config.page.title, "Lab");
        assert_eq!(config.page.limit, Some(100));
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[1].alias, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("nanoc6/server.toml"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            BACKEND_URL_ENV => Some("https://env.supabase.co".to_string()),
            API_KEY_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.backend.url, "https://env.supabase.co");
        assert_eq!(config.backend.api_key, "");

        config.apply_overrides(|key| (key == API_KEY_ENV).then(|| "secret".to_string()));
        assert_eq!(config.backend.url, "https://env.supabase.co");
        assert_eq!(config.backend.api_key, "secret");
    }

    #[test]
    fn test_backend_client() {
        let backend = BackendConfig {
            url: "https://abc.supabase.co/".to_string(),
            api_key: "anon".to_string(),
            timeout_secs: 3,
        };
        let client = backend.client().unwrap();
        assert_eq!(client.rest_url(), "https://abc.supabase.co/rest/v1");
    }

    // ==========================================================================
    // Validation tests
    // ==========================================================================

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_server_bind_validation() {
        let valid = ServerConfig {
            bind: "127.0.0.1:8080".to_string(),
        };
        assert!(valid.validate().is_empty());

        let valid_ipv6 = ServerConfig {
            bind: "[::1]:8080".to_string(),
        };
        assert!(valid_ipv6.validate().is_empty());

        let empty = ServerConfig {
            bind: "".to_string(),
        };
        let errors = empty.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be empty"));

        let no_port = ServerConfig {
            bind: "127.0.0.1".to_string(),
        };
        let errors = no_port.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("host:port"));

        let port_zero = ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        };
        assert!(port_zero.validate()[0].message.contains("cannot be 0"));

        let bad_port = ServerConfig {
            bind: "127.0.0.1:abc".to_string(),
        };
        assert!(bad_port.validate()[0].message.contains("must be a number"));
    }

    #[test]
    fn test_backend_validation() {
        let no_scheme = BackendConfig {
            url: "abc.supabase.co".to_string(),
            api_key: "anon".to_string(),
            ..Default::default()
        };
        let errors = no_scheme.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "backend.url");

        let no_key = BackendConfig {
            url: "https://abc.supabase.co".to_string(),
            ..Default::default()
        };
        let errors = no_key.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "backend.api_key");

        let zero_timeout = BackendConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(zero_timeout.validate()[0].field, "backend.timeout_secs");
    }

    #[test]
    fn test_page_validation() {
        let page = PageConfig {
            title: " ".to_string(),
            limit: Some(0),
        };
        let fields: Vec<_> = page.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["page.title", "page.limit"]);
    }

    #[test]
    fn test_device_config_validation() {
        let valid = DeviceConfig {
            alias: Some("Living Room".to_string()),
            ..DeviceConfig::new("4C:75:25:D4:E5:F6")
        };
        assert!(valid.validate("devices[0]").is_empty());

        let errors = DeviceConfig::new("").validate("devices[0]");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be empty"));

        let errors = DeviceConfig::new("AB").validate("devices[0]");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("too short"));

        let empty_alias = DeviceConfig {
            alias: Some("".to_string()),
            ..DeviceConfig::new("NanoC6-D4E5F6")
        };
        let errors = empty_alias.validate("devices[0]");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be empty string"));

        let bad_mac = DeviceConfig {
            mac: Some("not-a-mac".to_string()),
            ..DeviceConfig::new("NanoC6-D4E5F6")
        };
        assert_eq!(bad_mac.validate("devices[0]")[0].field, "devices[0].mac");

        let short_poll = DeviceConfig {
            poll_interval: 5,
            ..DeviceConfig::new("NanoC6-D4E5F6")
        };
        assert!(short_poll.validate("devices[0]")[0].message.contains("too short"));

        let long_poll = DeviceConfig {
            poll_interval: 7200,
            ..DeviceConfig::new("NanoC6-D4E5F6")
        };
        assert!(long_poll.validate("devices[0]")[0].message.contains("too long"));
    }

    #[test]
    fn test_duplicate_addresses_case_insensitive() {
        let config = Config {
            devices: vec![
                DeviceConfig::new("NanoC6-D4E5F6"),
                DeviceConfig::new("NANOC6-D4E5F6"),
            ],
            ..Default::default()
        };

        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.message.contains("duplicate")));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_errors_collected_together() {
        let config = Config {
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
            },
            devices: vec![DeviceConfig::new("")],
            ..Default::default()
        };

        let display = config.validate().unwrap_err().to_string();
        assert!(display.contains("server.bind"));
        assert!(display.contains("devices[0].address"));
    }
}
