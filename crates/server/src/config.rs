use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
    pub token_expiry_hours: u64,
}

/// S3 credentials for pre-signed URL issuance. Every field is required;
/// the environment overrides the file so secrets can stay out of it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./data/tutorlink.db".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_expiry_hours: 24,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::read()?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn read() -> Result<Self> {
        // Explicit path wins
        if let Ok(path) = std::env::var("TUTORLINK_CONFIG") {
            return Self::load_from_path(&PathBuf::from(path));
        }

        let default_paths = vec![
            PathBuf::from("tutorlink.toml"),
            PathBuf::from("config/tutorlink.toml"),
            PathBuf::from("/etc/tutorlink/server.toml"),
        ];

        for path in default_paths {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        tracing::warn!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var("TUTORLINK_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(region) = std::env::var("AWS_REGION") {
            self.storage.region = region;
        }
        if let Ok(bucket) = std::env::var("AWS_BUCKET_NAME") {
            self.storage.bucket = bucket;
        }
        if let Ok(key) = std::env::var("AWS_ACCESS_KEY") {
            self.storage.access_key = key;
        }
        if let Ok(key) = std::env::var("AWS_SECRET_KEY") {
            self.storage.secret_key = key;
        }
    }

    /// Missing secrets abort start-up rather than surfacing later as
    /// per-request failures.
    fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            bail!("auth.jwt_secret is not set (file or TUTORLINK_JWT_SECRET)");
        }
        if self.storage.region.is_empty()
            || self.storage.bucket.is_empty()
            || self.storage.access_key.is_empty()
            || self.storage.secret_key.is_empty()
        {
            bail!(
                "storage configuration incomplete: region, bucket, access_key, \
                 and secret_key are all required (file or AWS_* environment)"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> Config {
        let mut config = Config::default();
        config.auth.jwt_secret = "secret".to_string();
        config.storage = StorageConfig {
            region: "us-east-1".to_string(),
            bucket: "tutorlink-uploads".to_string(),
            access_key: "AKIA".to_string(),
            secret_key: "shhh".to_string(),
        };
        config
    }

    #[test]
    fn test_defaults_fail_validation() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn test_populated_config_passes() {
        assert!(populated().validate().is_ok());
    }

    #[test]
    fn test_missing_storage_field_is_fatal() {
        let mut config = populated();
        config.storage.bucket.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 9090

            [database]
            path = "/tmp/t.db"

            [auth]
            jwt_secret = "s"
            token_expiry_hours = 1
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.auth.token_expiry_hours, 1);
        // storage left to the environment
        assert!(config.storage.bucket.is_empty());
    }
}
