use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Object store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Cos,
    Memory,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Local => "local",
            StorageBackend::Cos => "cos",
            StorageBackend::Memory => "memory",
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "cos" => Ok(StorageBackend::Cos),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend {:?}", other)),
        }
    }
}

/// Local storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    #[serde(default = "default_local_path")]
    pub base_path: String,
}

fn default_local_path() -> String {
    "data/drops".to_string()
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_local_path(),
        }
    }
}

/// Tencent COS configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CosStorageConfig {
    #[serde(default)]
    pub secret_id: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub region: String,
    /// Key prefix inside the bucket.
    #[serde(default)]
    pub base_path: String,
    /// Overrides `https://<bucket>.cos.<region>.myqcloud.com`, e.g. for a
    /// private gateway or a local emulator.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl CosStorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.secret_id.is_empty() || self.secret_key.is_empty() {
            return Err("COS secret_id and secret_key are required".to_string());
        }
        if self.bucket.is_empty() {
            return Err("COS bucket is required".to_string());
        }
        if self.region.is_empty() && self.endpoint.is_none() {
            return Err("COS region or endpoint is required".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_str() {
        assert_eq!("COS".parse::<StorageBackend>(), Ok(StorageBackend::Cos));
        assert_eq!(" local ".parse::<StorageBackend>(), Ok(StorageBackend::Local));
        assert!("s3".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_cos_validate() {
        let mut config = CosStorageConfig {
            secret_id: "id".into(),
            secret_key: "key".into(),
            bucket: "bucket".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.region = "ap-guangzhou".into();
        assert!(config.validate().is_ok());
    }
}
