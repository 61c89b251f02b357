//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// JWT configuration.
    pub jwt: JwtConfig,
    /// Blob storage configuration.
    #[serde(default)]
    pub storage: StorageSettings,
    /// Attachment policy.
    #[serde(default)]
    pub attachments: AttachmentSettings,
    /// Signed download link configuration.
    pub signing: SigningConfig,
    /// Idempotency record retention.
    #[serde(default)]
    pub idempotency: IdempotencySettings,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// JWT configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Secret key for validating tokens.
    pub secret: String,
    /// Access token expiration in seconds.
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: u64,
}

fn default_access_token_expiry() -> u64 {
    900 // 15 minutes
}

/// Which blob storage backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// Uploads are absorbed by the API process itself (development only).
    #[default]
    Loopback,
    /// S3-compatible object store.
    S3,
    /// Azure Blob Storage.
    AzureBlob,
    /// Local filesystem through OpenDAL.
    LocalFs,
}

/// Blob storage configuration.
///
/// Only the fields of the selected provider are read.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Selected backend.
    #[serde(default)]
    pub provider: StorageKind,
    /// Externally reachable base URL of this API, used by the loopback backend.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// S3 endpoint URL.
    pub endpoint: Option<String>,
    /// S3 bucket name.
    pub bucket: Option<String>,
    /// S3 access key ID.
    pub access_key_id: Option<String>,
    /// S3 secret access key.
    pub secret_access_key: Option<String>,
    /// S3 region.
    pub region: Option<String>,
    /// Azure storage account name.
    pub account: Option<String>,
    /// Azure storage access key.
    pub access_key: Option<String>,
    /// Azure container name.
    pub container: Option<String>,
    /// Root directory for the local filesystem backend.
    pub root: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            provider: StorageKind::default(),
            public_base_url: default_public_base_url(),
            endpoint: None,
            bucket: None,
            access_key_id: None,
            secret_access_key: None,
            region: None,
            account: None,
            access_key: None,
            container: None,
            root: None,
        }
    }
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

/// Attachment policy settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentSettings {
    /// Largest accepted upload, inclusive.
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
    /// Accepted MIME types.
    #[serde(default = "default_content_types")]
    pub allowed_content_types: Vec<String>,
    /// Accepted file name extensions, without the dot.
    #[serde(default = "default_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Lifetime of an upload slot in minutes.
    #[serde(default = "default_upload_url_minutes")]
    pub upload_url_minutes_to_live: u32,
    /// Strip image metadata after completion.
    #[serde(default = "default_true")]
    pub sanitize_images: bool,
}

impl Default for AttachmentSettings {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_size_bytes(),
            allowed_content_types: default_content_types(),
            allowed_extensions: default_extensions(),
            upload_url_minutes_to_live: default_upload_url_minutes(),
            sanitize_images: default_true(),
        }
    }
}

fn default_max_size_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_content_types() -> Vec<String> {
    [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "application/pdf",
        "text/plain",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

fn default_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "webp", "pdf", "txt"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_upload_url_minutes() -> u32 {
    15
}

fn default_true() -> bool {
    true
}

/// Signed download link configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    /// HMAC secret for download links.
    pub secret: String,
    /// Lifetime of a download link in minutes.
    #[serde(default = "default_download_link_minutes")]
    pub download_link_minutes_to_live: u32,
}

fn default_download_link_minutes() -> u32 {
    10
}

/// Idempotency record retention.
#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencySettings {
    /// How long a recorded response is replayed.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u32,
    /// How often expired records are pruned.
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,
}

impl Default for IdempotencySettings {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            prune_interval_secs: default_prune_interval(),
        }
    }
}

fn default_ttl_hours() -> u32 {
    24
}

fn default_prune_interval() -> u64 {
    3600
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("INCIDENT")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("attachments.allowed_content_types")
                    .with_list_parse_key("attachments.allowed_extensions"),
            )
            .build()?;

        config.try_deserialize()
    }
}
