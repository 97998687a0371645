use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub assets: AssetStoreConfig,
    #[serde(default)]
    pub listing: ListingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Connection settings for the image asset store.
///
/// Credentials deliberately do not live here: they are read from the
/// environment at startup and handed to the store constructor explicitly,
/// so the core carries no ambient state.
#[derive(Debug, Deserialize, Clone)]
pub struct AssetStoreConfig {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Key prefix under which all product images are stored.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Overall deadline per asset store call, in seconds. A timeout is
    /// reported as an upload/delete failure.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ListingConfig {
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_key_prefix() -> String {
    "products".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_page_size() -> i64 {
    20
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.assets.bucket.trim().is_empty() {
        anyhow::bail!("assets.bucket must not be empty");
    }

    if config.assets.timeout_secs == 0 {
        anyhow::bail!("assets.timeout_secs must be > 0");
    }

    if config.listing.page_size < 1 {
        anyhow::bail!("listing.page_size must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_applies_defaults() {
        let config = parse(
            r#"
            [db]
            path = "data/stockroom.sqlite"

            [assets]
            bucket = "catalog-images"
            "#,
        )
        .unwrap();
        assert_eq!(config.assets.region, "us-east-1");
        assert_eq!(config.assets.key_prefix, "products");
        assert_eq!(config.assets.timeout_secs, 30);
        assert_eq!(config.listing.page_size, 20);
        assert!(config.assets.endpoint_url.is_none());
    }

    #[test]
    fn full_config_round_trips() {
        let config = parse(
            r#"
            [db]
            path = "/tmp/cat.sqlite"

            [assets]
            bucket = "b"
            region = "eu-west-1"
            endpoint_url = "http://localhost:9000"
            key_prefix = "imgs"
            timeout_secs = 5

            [listing]
            page_size = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.assets.region, "eu-west-1");
        assert_eq!(
            config.assets.endpoint_url.as_deref(),
            Some("http://localhost:9000")
        );
        assert_eq!(config.listing.page_size, 50);
    }
}
