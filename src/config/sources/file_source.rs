//! Generic async file-based config source with SHA256 change detection.
//!
//! [`FileSource`] implements [`ConfigSource`] for any file format by
//! accepting a deserialization function at construction time. Each load
//! reads the file through Tokio, validates the endpoint/token/session
//! tables, and hashes the raw content for version tracking.

use std::path::PathBuf;

use async_trait::async_trait;

use super::sha256_hex;
use crate::config::model::Config;
use crate::config::validation::validate;
use crate::config::{ConfigSource, ConfigVersion};
use crate::error::{BoxError, RelayError};

pub type Deserializer = fn(&str) -> Result<Config, BoxError>;

pub struct FileSource {
    path: PathBuf,
    name: &'static str,
    deserialize: Deserializer,
}

impl FileSource {
    #[must_use]
    pub fn new(path: PathBuf, name: &'static str, deserialize: Deserializer) -> Self {
        Self {
            path,
            name,
            deserialize,
        }
    }

    async fn read_content(&self) -> Result<String, RelayError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => RelayError::ConfigFileNotFound {
                    path: self.path.clone(),
                },
                _ => RelayError::Io(e),
            })
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn load(&self) -> Result<(Config, ConfigVersion), RelayError> {
        let content = self.read_content().await?;

        let config = (self.deserialize)(&content).map_err(|e| RelayError::ConfigParse {
            path: self.path.display().to_string(),
            source: e,
        })?;

        validate(&config).map_err(|errors| RelayError::ConfigValidation { errors })?;

        let version = ConfigVersion::Hash(sha256_hex(content.as_bytes()));
        tracing::debug!(
            path = %self.path.display(),
            version = version.short(),
            endpoints = config.endpoints.len(),
            "config file loaded"
        );
        Ok((config, version))
    }

    async fn has_changed(&self, current: &ConfigVersion) -> Result<bool, RelayError> {
        let content = self.read_content().await?;
        Ok(*current != ConfigVersion::Hash(sha256_hex(content.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_source(path: PathBuf) -> FileSource {
        FileSource::new(path, "json-test", |content| {
            serde_json::from_str::<Config>(content).map_err(Into::into)
        })
    }

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("relaygate-{}.json", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let source = json_source(temp_path());
        let err = source.load().await.unwrap_err();
        assert!(matches!(err, RelayError::ConfigFileNotFound { .. }));
    }

    #[tokio::test]
    async fn detects_content_changes() {
        let path = temp_path();
        tokio::fs::write(
            &path,
            r#"{"endpoints": [{"id": "a", "url": "https://api.a.example.com"}]}"#,
        )
        .await
        .unwrap();

        let source = json_source(path.clone());
        let (config, version) = source.load().await.unwrap();
        assert_eq!(config.endpoints.len(), 1);
        assert!(!source.has_changed(&version).await.unwrap());

        tokio::fs::write(
            &path,
            r#"{"endpoints": [{"id": "b", "url": "https://api.b.example.com"}]}"#,
        )
        .await
        .unwrap();
        assert!(source.has_changed(&version).await.unwrap());

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn invalid_config_fails_validation() {
        let path = temp_path();
        tokio::fs::write(&path, r#"{"endpoints": []}"#).await.unwrap();

        let err = json_source(path.clone()).load().await.unwrap_err();
        assert!(matches!(err, RelayError::ConfigValidation { .. }));

        let _ = tokio::fs::remove_file(&path).await;
    }
}
