//! Attachment policy: what may be uploaded and for how long a slot lives.

use std::collections::HashSet;
use std::time::Duration;

use incident_shared::config::AttachmentSettings;

use super::error::AttachmentError;
use super::types::{ParentType, StartUploadInput};

/// Longest accepted file name, in characters.
pub const MAX_FILE_NAME_CHARS: usize = 255;

/// Read-only upload policy.
///
/// Content types and extensions are compared case-insensitively.
#[derive(Debug, Clone)]
pub struct AttachmentPolicy {
    max_size_bytes: u64,
    allowed_content_types: HashSet<String>,
    allowed_extensions: HashSet<String>,
    upload_url_minutes_to_live: u32,
    sanitize_images: bool,
}

impl AttachmentPolicy {
    /// Create a policy.
    #[must_use]
    pub fn new<C, E>(
        max_size_bytes: u64,
        allowed_content_types: C,
        allowed_extensions: E,
        upload_url_minutes_to_live: u32,
    ) -> Self
    where
        C: IntoIterator,
        C::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Self {
            max_size_bytes,
            allowed_content_types: allowed_content_types
                .into_iter()
                .map(|ct| ct.as_ref().trim().to_ascii_lowercase())
                .collect(),
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            upload_url_minutes_to_live,
            sanitize_images: true,
        }
    }

    /// Enable or disable post-completion image sanitization.
    #[must_use]
    pub fn with_sanitize_images(mut self, enabled: bool) -> Self {
        self.sanitize_images = enabled;
        self
    }

    /// Largest accepted upload, inclusive.
    #[must_use]
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    /// Slot lifetime in minutes.
    #[must_use]
    pub fn upload_url_minutes_to_live(&self) -> u32 {
        self.upload_url_minutes_to_live
    }

    /// Slot lifetime.
    #[must_use]
    pub fn upload_url_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.upload_url_minutes_to_live) * 60)
    }

    /// Whether completed images are sanitized.
    #[must_use]
    pub fn sanitize_images(&self) -> bool {
        self.sanitize_images
    }

    /// Whether the MIME type may be uploaded.
    #[must_use]
    pub fn is_content_type_allowed(&self, content_type: &str) -> bool {
        self.allowed_content_types
            .contains(&content_type.trim().to_ascii_lowercase())
    }

    /// Whether the file name carries an allowed extension.
    #[must_use]
    pub fn is_extension_allowed(&self, file_name: &str) -> bool {
        file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .is_some_and(|ext| self.allowed_extensions.contains(&ext))
    }

    /// Whether a stored object size is acceptable: non-empty and at most the maximum.
    #[must_use]
    pub fn is_size_allowed(&self, size: u64) -> bool {
        size > 0 && size <= self.max_size_bytes
    }

    /// Structural validation of a start request, before any lookup.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a missing parent type, a bad file name,
    /// a disallowed extension, or a disallowed content type.
    pub fn validate_start(&self, input: &StartUploadInput) -> Result<(), AttachmentError> {
        if input.parent_type == ParentType::None {
            return Err(AttachmentError::InvalidParentType);
        }

        let file_name = input.file_name.trim();
        if file_name.is_empty() {
            return Err(AttachmentError::invalid_file_name("file name is empty"));
        }
        if file_name.chars().count() > MAX_FILE_NAME_CHARS {
            return Err(AttachmentError::invalid_file_name(format!(
                "file name exceeds {MAX_FILE_NAME_CHARS} characters"
            )));
        }
        if !self.is_extension_allowed(file_name) {
            return Err(AttachmentError::invalid_file_name(format!(
                "extension not allowed: {file_name}"
            )));
        }

        if !self.is_content_type_allowed(&input.content_type) {
            return Err(AttachmentError::InvalidContentType(
                input.content_type.clone(),
            ));
        }
        Ok(())
    }
}

impl From<&AttachmentSettings> for AttachmentPolicy {
    fn from(settings: &AttachmentSettings) -> Self {
        Self::new(
            settings.max_size_bytes,
            &settings.allowed_content_types,
            &settings.allowed_extensions,
            settings.upload_url_minutes_to_live,
        )
        .with_sanitize_images(settings.sanitize_images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use uuid::Uuid;

    fn policy() -> AttachmentPolicy {
        AttachmentPolicy::from(&AttachmentSettings::default())
    }

    fn start(file_name: &str, content_type: &str) -> StartUploadInput {
        StartUploadInput {
            parent_type: ParentType::Incident,
            parent_id: Uuid::nil(),
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
        }
    }

    #[test]
    fn test_defaults_from_settings() {
        let policy = policy();
        assert_eq!(policy.max_size_bytes(), 10 * 1024 * 1024);
        assert_eq!(policy.upload_url_minutes_to_live(), 15);
        assert_eq!(policy.upload_url_ttl(), Duration::from_secs(900));
        assert!(policy.sanitize_images());
    }

    #[rstest]
    #[case("image/png", true)]
    #[case("IMAGE/PNG", true)]
    #[case(" application/pdf ", true)]
    #[case("application/x-msdownload", false)]
    #[case("", false)]
    fn test_content_type_allowed(#[case] content_type: &str, #[case] allowed: bool) {
        assert_eq!(policy().is_content_type_allowed(content_type), allowed);
    }

    #[rstest]
    #[case("photo.JPG", true)]
    #[case("report.pdf", true)]
    #[case("archive.tar.exe", false)]
    #[case("noextension", false)]
    fn test_extension_allowed(#[case] file_name: &str, #[case] allowed: bool) {
        assert_eq!(policy().is_extension_allowed(file_name), allowed);
    }

    #[test]
    fn test_size_boundaries() {
        let policy = policy();
        let max = policy.max_size_bytes();
        assert!(!policy.is_size_allowed(0));
        assert!(policy.is_size_allowed(1));
        assert!(policy.is_size_allowed(max));
        assert!(!policy.is_size_allowed(max + 1));
    }

    #[test]
    fn test_validate_start_accepts_valid_request() {
        assert!(policy().validate_start(&start("a.png", "image/png")).is_ok());
    }

    #[test]
    fn test_validate_start_rejects() {
        let policy = policy();

        let mut no_parent = start("a.png", "image/png");
        no_parent.parent_type = ParentType::None;
        assert!(matches!(
            policy.validate_start(&no_parent),
            Err(AttachmentError::InvalidParentType)
        ));

        assert!(matches!(
            policy.validate_start(&start("   ", "image/png")),
            Err(AttachmentError::InvalidFileName(_))
        ));

        let long_name = format!("{}.png", "a".repeat(MAX_FILE_NAME_CHARS));
        assert!(matches!(
            policy.validate_start(&start(&long_name, "image/png")),
            Err(AttachmentError::InvalidFileName(_))
        ));

        assert!(matches!(
            policy.validate_start(&start("run.exe", "image/png")),
            Err(AttachmentError::InvalidFileName(_))
        ));

        assert!(matches!(
            policy.validate_start(&start("a.png", "application/zip")),
            Err(AttachmentError::InvalidContentType(_))
        ));
    }

    #[test]
    fn test_custom_policy_normalizes_entries() {
        let policy = AttachmentPolicy::new(100, ["Image/PNG"], [".PNG"], 5);
        assert!(policy.is_content_type_allowed("image/png"));
        assert!(policy.is_extension_allowed("x.png"));
        assert_eq!(policy.upload_url_ttl(), Duration::from_secs(300));
    }
}
