//! Storage path construction and validation.
//!
//! Every path handed to a backend goes through [`validate_storage_path`]:
//! no traversal, no absolute paths, no backslashes, and only whitelisted
//! top-level prefixes.

use super::error::StorageError;

/// Top-level prefixes a storage path may start with.
pub const ALLOWED_PREFIXES: [&str; 2] = ["incidents/", "comments/"];

/// Longest sanitized file name embedded in a path.
const MAX_FILE_NAME_LEN: usize = 128;

/// Sanitize a client-supplied file name for use in a storage path.
///
/// Only ASCII alphanumerics, dots, hyphens, and underscores survive. Runs of
/// dots are broken up and leading dots stripped so the result can never form a
/// traversal segment.
#[must_use]
pub fn sanitize_file_name(file_name: &str) -> String {
    let mut sanitized: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    while sanitized.contains("..") {
        sanitized = sanitized.replace("..", "_.");
    }

    let trimmed = sanitized.trim_start_matches('.');
    let mut result: String = trimmed.chars().take(MAX_FILE_NAME_LEN).collect();
    if result.is_empty() {
        result.push_str("file");
    }
    result
}

/// Build the storage path for a new upload.
///
/// Format: `{prefix}/{attachment_id}/{sanitized_file_name}`, where `prefix`
/// is e.g. `incidents/{incident_id}`.
pub fn build_storage_path(
    prefix: &str,
    attachment_id: &str,
    file_name: &str,
) -> Result<String, StorageError> {
    let prefix = prefix.trim_end_matches('/');
    let path = format!("{prefix}/{attachment_id}/{}", sanitize_file_name(file_name));
    validate_storage_path(&path)?;
    Ok(path)
}

/// Validate a storage path before it reaches a backend.
pub fn validate_storage_path(path: &str) -> Result<(), StorageError> {
    if path.is_empty() {
        return Err(StorageError::invalid_path("path is empty"));
    }
    if path.contains('\\') {
        return Err(StorageError::invalid_path("backslashes are not allowed"));
    }
    if path.starts_with('/') || path.as_bytes().get(1) == Some(&b':') {
        return Err(StorageError::invalid_path("absolute paths are not allowed"));
    }
    if path.contains("..") {
        return Err(StorageError::invalid_path("path traversal is not allowed"));
    }
    if path.split('/').any(|segment| segment.is_empty() || segment == ".") {
        return Err(StorageError::invalid_path("empty path segment"));
    }
    if !ALLOWED_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        return Err(StorageError::invalid_path(format!(
            "path must start with one of {ALLOWED_PREFIXES:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("photo.png"), "photo.png");
        assert_eq!(sanitize_file_name("my file (1).pdf"), "my_file__1_.pdf");
        assert_eq!(sanitize_file_name("test@#$%.doc"), "test____.doc");
        assert_eq!(sanitize_file_name("日本語.pdf"), "___.pdf");
    }

    #[test]
    fn test_sanitize_file_name_defuses_traversal() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_._etc_passwd");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name("..."), "_.");
        assert!(!sanitize_file_name("a....b").contains(".."));
    }

    #[test]
    fn test_sanitize_file_name_never_empty() {
        assert_eq!(sanitize_file_name(""), "file");
        assert_eq!(sanitize_file_name("."), "file");
    }

    #[test]
    fn test_sanitize_file_name_truncates() {
        let long = "a".repeat(500);
        assert_eq!(sanitize_file_name(&long).len(), MAX_FILE_NAME_LEN);
    }

    #[test]
    fn test_build_storage_path() {
        let path = build_storage_path("incidents/42", "att-1", "a b.png").unwrap();
        assert_eq!(path, "incidents/42/att-1/a_b.png");

        let path = build_storage_path("comments/7/", "att-2", "x.pdf").unwrap();
        assert_eq!(path, "comments/7/att-2/x.pdf");
    }

    #[test]
    fn test_build_storage_path_rejects_unknown_prefix() {
        let err = build_storage_path("users/1", "att-1", "a.png").unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
    }

    #[rstest]
    #[case("")]
    #[case("/incidents/1/a.png")]
    #[case("C:/incidents/1/a.png")]
    #[case("incidents\\1\\a.png")]
    #[case("incidents/../secrets")]
    #[case("incidents/1//a.png")]
    #[case("incidents/./a.png")]
    #[case("uploads/1/a.png")]
    #[case("pending")]
    fn test_validate_storage_path_rejects(#[case] path: &str) {
        assert!(validate_storage_path(path).is_err(), "{path} should be rejected");
    }

    #[rstest]
    #[case("incidents/1/2/a.png")]
    #[case("comments/1/2/report.pdf")]
    fn test_validate_storage_path_accepts(#[case] path: &str) {
        assert!(validate_storage_path(path).is_ok());
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_sanitized_file_name_safe_chars(file_name in ".*") {
            let sanitized = sanitize_file_name(&file_name);

            prop_assert!(!sanitized.is_empty());
            prop_assert!(!sanitized.contains(".."));
            prop_assert!(!sanitized.starts_with('.'));
            for c in sanitized.chars() {
                let is_safe = c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_';
                prop_assert!(is_safe, "Unexpected character in sanitized file name: {}", c);
            }
        }

        #[test]
        fn prop_built_paths_always_validate(file_name in ".*", parent in any::<u64>()) {
            let prefix = format!("incidents/{parent}");
            let path = build_storage_path(&prefix, "attachment", &file_name);
            prop_assert!(path.is_ok());
        }
    }
}
