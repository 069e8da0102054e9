use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::models::{CosStorageConfig, LocalStorageConfig, StorageBackend};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub expiry: ExpiryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Fixed `scheme://host` used for result URLs instead of the request's Host header.
    #[serde(default)]
    pub public_url: Option<String>,
    /// Directory holding the upload page assets.
    #[serde(default)]
    pub public_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    /// Empty disables short links.
    #[serde(default = "default_short_url_service")]
    pub short_url_service: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpiryConfig {
    /// Seconds a file may live before the sweeper removes it.
    #[serde(default = "default_max_age")]
    pub max_age: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,
    /// Pause between handing off a download and deleting the object.
    #[serde(default = "default_delete_delay_ms")]
    pub delete_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub local: LocalStorageConfig,
    #[serde(default)]
    pub cos: Option<CosStorageConfig>,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1309
}

fn default_max_upload_size() -> u64 {
    5 * 1024 * 1024 * 1024 // 5 GiB
}

fn default_short_url_service() -> String {
    "https://suosuo.de/short".to_string()
}

fn default_max_age() -> u64 {
    3600
}

fn default_sweep_interval() -> u64 {
    600
}

fn default_delete_delay_ms() -> u64 {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            public_dir: None,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size: default_max_upload_size(),
            short_url_service: default_short_url_service(),
        }
    }
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            max_age: default_max_age(),
            sweep_interval: default_sweep_interval(),
            delete_delay_ms: default_delete_delay_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            local: LocalStorageConfig::default(),
            cos: None,
        }
    }
}

impl ExpiryConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval.max(1))
    }

    pub fn delete_delay(&self) -> Duration {
        Duration::from_millis(self.delete_delay_ms)
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.ensure_directories()?;
        tracing::info!(
            "Expiry config: max_age={}s, sweep_interval={}s, max_upload_size={} bytes, backend={}",
            config.expiry.max_age,
            config.expiry.sweep_interval,
            config.upload.max_upload_size,
            config.storage.backend.as_str()
        );
        Ok(config)
    }

    /// Load configuration from oncedrop.toml or config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["oncedrop.toml", "config.toml", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| env::var(name).ok());
    }

    /// Apply overrides from a variable lookup.
    /// `MAX_AGE`, `MAX_UPLOAD_SIZE` and `SHORT_URL_SERVICE` keep their bare names;
    /// everything else uses `OD_CONF_<SECTION>_<KEY>`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |name: &str| -> Option<u64> {
            let val = lookup(name)?;
            match val.trim().parse() {
                Ok(n) => Some(n),
                Err(_) => {
                    tracing::warn!("Ignoring {}={:?}: not a number", name, val);
                    None
                }
            }
        };

        // Expiry and upload limits
        if let Some(v) = number("MAX_AGE") {
            self.expiry.max_age = v;
        }
        if let Some(v) = number("MAX_UPLOAD_SIZE") {
            self.upload.max_upload_size = v;
        }
        if let Some(val) = lookup("SHORT_URL_SERVICE") {
            self.upload.short_url_service = val.trim().to_string();
        }
        if let Some(v) = number("OD_CONF_EXPIRY_SWEEP_INTERVAL") {
            self.expiry.sweep_interval = v;
        }
        if let Some(v) = number("OD_CONF_EXPIRY_DELETE_DELAY_MS") {
            self.expiry.delete_delay_ms = v;
        }

        // Server overrides
        if let Some(val) = lookup("OD_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Some(v) = number("OD_CONF_SERVER_PORT") {
            match u16::try_from(v) {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring OD_CONF_SERVER_PORT={}: out of range", v),
            }
        }
        if let Some(val) = lookup("OD_CONF_SERVER_PUBLIC_URL") {
            self.server.public_url = non_empty(val);
        }
        if let Some(val) = lookup("OD_CONF_SERVER_PUBLIC_DIR") {
            self.server.public_dir = non_empty(val);
        }

        // Storage overrides
        if let Some(val) = lookup("OD_CONF_STORAGE_BACKEND") {
            match val.parse::<StorageBackend>() {
                Ok(backend) => self.storage.backend = backend,
                Err(e) => tracing::warn!("Ignoring OD_CONF_STORAGE_BACKEND: {}", e),
            }
        }
        if let Some(val) = lookup("OD_CONF_STORAGE_LOCAL_PATH") {
            self.storage.local.base_path = val;
        }

        let cos_keys = [
            "OD_CONF_COS_SECRET_ID",
            "OD_CONF_COS_SECRET_KEY",
            "OD_CONF_COS_BUCKET",
            "OD_CONF_COS_REGION",
            "OD_CONF_COS_BASE_PATH",
            "OD_CONF_COS_ENDPOINT",
        ];
        if cos_keys.iter().any(|k| lookup(k).is_some()) {
            let cos = self.storage.cos.get_or_insert_with(CosStorageConfig::default);
            if let Some(val) = lookup("OD_CONF_COS_SECRET_ID") {
                cos.secret_id = val;
            }
            if let Some(val) = lookup("OD_CONF_COS_SECRET_KEY") {
                cos.secret_key = val;
            }
            if let Some(val) = lookup("OD_CONF_COS_BUCKET") {
                cos.bucket = val;
            }
            if let Some(val) = lookup("OD_CONF_COS_REGION") {
                cos.region = val;
            }
            if let Some(val) = lookup("OD_CONF_COS_BASE_PATH") {
                cos.base_path = val;
            }
            if let Some(val) = lookup("OD_CONF_COS_ENDPOINT") {
                cos.endpoint = non_empty(val);
            }
        }
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        if self.storage.backend == StorageBackend::Local {
            fs::create_dir_all(&self.storage.local.base_path)?;
        }
        Ok(())
    }
}

fn non_empty(val: String) -> Option<String> {
    let trimmed = val.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.expiry.max_age, 3600);
        assert_eq!(config.upload.max_upload_size, 5_368_709_120);
        assert_eq!(config.upload.short_url_service, "https://suosuo.de/short");
        assert_eq!(config.expiry.delete_delay(), Duration::from_millis(100));
        assert_eq!(config.storage.backend, StorageBackend::Local);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[
            ("MAX_AGE", "60"),
            ("MAX_UPLOAD_SIZE", "1024"),
            ("SHORT_URL_SERVICE", ""),
            ("OD_CONF_SERVER_PORT", "8080"),
            ("OD_CONF_STORAGE_BACKEND", "Memory"),
        ]));

        assert_eq!(config.expiry.max_age, 60);
        assert_eq!(config.upload.max_upload_size, 1024);
        assert!(config.upload.short_url_service.is_empty());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_invalid_numbers_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[
            ("MAX_AGE", "an hour"),
            ("OD_CONF_SERVER_PORT", "70000"),
        ]));

        assert_eq!(config.expiry.max_age, 3600);
        assert_eq!(config.server.port, 1309);
    }

    #[test]
    fn test_cos_section_created_from_env() {
        let mut config = Config::default();
        config.apply_overrides(lookup_from(&[
            ("OD_CONF_COS_BUCKET", "drops-1250000000"),
            ("OD_CONF_COS_REGION", "ap-guangzhou"),
        ]));

        let cos = config.storage.cos.expect("cos section");
        assert_eq!(cos.bucket, "drops-1250000000");
        assert_eq!(cos.region, "ap-guangzhou");
        assert!(cos.endpoint.is_none());
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000
            public_url = "https://drop.example"

            [expiry]
            max_age = 120

            [storage]
            backend = "cos"

            [storage.cos]
            secret_id = "id"
            secret_key = "key"
            bucket = "b"
            region = "ap-beijing"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.public_url.as_deref(), Some("https://drop.example"));
        assert_eq!(config.expiry.max_age, 120);
        assert_eq!(config.expiry.sweep_interval, 600);
        assert_eq!(config.storage.backend, StorageBackend::Cos);
        assert_eq!(config.storage.cos.unwrap().region, "ap-beijing");
    }
}
