//! Storage configuration types.

use incident_shared::config::{StorageKind, StorageSettings};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::error::StorageError;

/// Storage provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageProvider {
    /// S3-compatible storage: Cloudflare R2, Supabase, AWS S3, DigitalOcean Spaces
    S3 {
        /// S3 endpoint URL.
        endpoint: String,
        /// S3 bucket name.
        bucket: String,
        /// AWS access key ID.
        access_key_id: String,
        /// AWS secret access key.
        secret_access_key: String,
        /// AWS region.
        region: String,
    },
    /// Azure Blob Storage
    AzureBlob {
        /// Azure storage account name.
        account: String,
        /// Azure storage access key.
        access_key: String,
        /// Azure container name.
        container: String,
    },
    /// Local filesystem (cannot presign; useful for tooling only)
    LocalFs {
        /// Root directory path.
        root: PathBuf,
    },
    /// Uploads absorbed by the API process (development only)
    Loopback {
        /// Externally reachable base URL of the API.
        public_base_url: String,
    },
}

impl StorageProvider {
    /// Create S3-compatible provider (Cloudflare R2, Supabase, AWS S3).
    #[must_use]
    pub fn s3(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self::S3 {
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
        }
    }

    /// Create local filesystem provider.
    #[must_use]
    pub fn local_fs(root: impl Into<PathBuf>) -> Self {
        Self::LocalFs { root: root.into() }
    }

    /// Create loopback provider.
    #[must_use]
    pub fn loopback(public_base_url: impl Into<String>) -> Self {
        Self::Loopback {
            public_base_url: public_base_url.into(),
        }
    }

    /// Get the provider name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::S3 { .. } => "s3",
            Self::AzureBlob { .. } => "azure_blob",
            Self::LocalFs { .. } => "local",
            Self::Loopback { .. } => "loopback",
        }
    }
}

impl TryFrom<&StorageSettings> for StorageProvider {
    type Error = StorageError;

    fn try_from(settings: &StorageSettings) -> Result<Self, Self::Error> {
        fn required(value: Option<&String>, field: &str) -> Result<String, StorageError> {
            value
                .cloned()
                .ok_or_else(|| StorageError::configuration(format!("storage.{field} is required")))
        }

        match settings.provider {
            StorageKind::Loopback => Ok(Self::loopback(settings.public_base_url.clone())),
            StorageKind::S3 => Ok(Self::S3 {
                endpoint: required(settings.endpoint.as_ref(), "endpoint")?,
                bucket: required(settings.bucket.as_ref(), "bucket")?,
                access_key_id: required(settings.access_key_id.as_ref(), "access_key_id")?,
                secret_access_key: required(
                    settings.secret_access_key.as_ref(),
                    "secret_access_key",
                )?,
                region: settings.region.clone().unwrap_or_else(|| "auto".to_string()),
            }),
            StorageKind::AzureBlob => Ok(Self::AzureBlob {
                account: required(settings.account.as_ref(), "account")?,
                access_key: required(settings.access_key.as_ref(), "access_key")?,
                container: required(settings.container.as_ref(), "container")?,
            }),
            StorageKind::LocalFs => Ok(Self::local_fs(required(settings.root.as_ref(), "root")?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_provider_names() {
        let s3 = StorageProvider::s3(
            "https://account.r2.cloudflarestorage.com",
            "attachments",
            "access_key",
            "secret_key",
            "auto",
        );
        assert_eq!(s3.name(), "s3");
        assert_eq!(StorageProvider::local_fs("./storage").name(), "local");
        assert_eq!(
            StorageProvider::loopback("http://localhost:8080").name(),
            "loopback"
        );
    }

    #[test]
    fn test_default_settings_select_loopback() {
        let provider = StorageProvider::try_from(&StorageSettings::default()).unwrap();
        assert!(matches!(
            provider,
            StorageProvider::Loopback { ref public_base_url } if public_base_url == "http://localhost:8080"
        ));
    }

    #[test]
    fn test_s3_settings_require_bucket() {
        let settings = StorageSettings {
            provider: StorageKind::S3,
            endpoint: Some("https://s3.example.com".to_string()),
            access_key_id: Some("key".to_string()),
            secret_access_key: Some("secret".to_string()),
            ..StorageSettings::default()
        };

        let err = StorageProvider::try_from(&settings).unwrap_err();
        assert!(err.to_string().contains("storage.bucket"));
    }

    #[test]
    fn test_s3_settings_default_region() {
        let settings = StorageSettings {
            provider: StorageKind::S3,
            endpoint: Some("https://s3.example.com".to_string()),
            bucket: Some("files".to_string()),
            access_key_id: Some("key".to_string()),
            secret_access_key: Some("secret".to_string()),
            ..StorageSettings::default()
        };

        match StorageProvider::try_from(&settings).unwrap() {
            StorageProvider::S3 { region, bucket, .. } => {
                assert_eq!(region, "auto");
                assert_eq!(bucket, "files");
            }
            other => panic!("unexpected provider {other:?}"),
        }
    }
}
