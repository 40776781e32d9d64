//! Keys, prefixes and path segments
//!
//! A path is a list of segments; its prefix is the segments joined with `/`
//! plus a trailing `/`, or the empty string for the root.

use super::NamespaceError;

/// Prefix selecting everything under `segments`
pub fn prefix_for<S: AsRef<str>>(segments: &[S]) -> String {
    if segments.is_empty() {
        return String::new();
    }
    let mut prefix = segments.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join("/");
    prefix.push('/');
    prefix
}

/// Validate a segment of a key that may already exist in storage. Other
/// writers can leave backslashes or control characters in object keys, so
/// only the shapes that break the key structure are refused.
pub fn validate_existing_segment(segment: &str) -> Result<(), NamespaceError> {
    // 1. Reject empty names
    if segment.is_empty() {
        return Err(NamespaceError::Validation("Name cannot be empty".into()));
    }

    // 2. Reject traversal and current-directory references
    if segment == "." || segment == ".." {
        return Err(NamespaceError::Validation(format!("Invalid name '{}'", segment)));
    }

    // 3. A name is one segment
    if segment.contains('/') {
        return Err(NamespaceError::Validation("Name cannot contain path separators".into()));
    }

    Ok(())
}

/// Validate a name for a new file or folder.
pub fn validate_segment(segment: &str) -> Result<(), NamespaceError> {
    validate_existing_segment(segment)?;

    if segment.contains('\\') {
        return Err(NamespaceError::Validation("Name cannot contain path separators".into()));
    }
    if segment.chars().any(|c| c.is_control()) {
        return Err(NamespaceError::Validation("Name contains invalid control characters".into()));
    }
    Ok(())
}

/// Validate a full storage key (file key or directory key ending in `/`).
/// The root is not a valid key.
pub fn validate_key(key: &str) -> Result<(), NamespaceError> {
    if key.is_empty() || key == "/" {
        return Err(NamespaceError::Validation("Cannot operate on the root directory".into()));
    }
    if key.starts_with('/') {
        return Err(NamespaceError::Validation("Key must not start with '/'".into()));
    }

    let trimmed = key.strip_suffix('/').unwrap_or(key);
    for segment in trimmed.split('/') {
        validate_existing_segment(segment)?;
    }
    Ok(())
}

/// Last segment of a key, without the trailing delimiter
pub fn name_of(key: &str) -> &str {
    let trimmed = key.strip_suffix('/').unwrap_or(key);
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Prefix of the directory containing `key` (empty for top-level keys)
pub fn parent_prefix(key: &str) -> &str {
    let trimmed = key.strip_suffix('/').unwrap_or(key);
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[..=idx],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_for() {
        assert_eq!(prefix_for::<&str>(&[]), "");
        assert_eq!(prefix_for(&["docs"]), "docs/");
        assert_eq!(prefix_for(&["docs", "img"]), "docs/img/");
    }

    #[test]
    fn test_valid_keys() {
        assert!(validate_key("readme.md").is_ok());
        assert!(validate_key("docs/").is_ok());
        assert!(validate_key("docs/img/logo.png").is_ok());
        assert!(validate_key("My Files/notes (1).txt").is_ok());
    }

    #[test]
    fn test_rejects_invalid_keys() {
        assert!(validate_key("").is_err());
        assert!(validate_key("/").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("docs//a.txt").is_err());
        assert!(validate_key("docs/../a.txt").is_err());
    }

    #[test]
    fn test_existing_keys_allow_foreign_characters() {
        assert!(validate_key("logs\\2024/a\u{1}.txt").is_ok());
        assert!(validate_existing_segment("a\\b").is_ok());
        assert!(validate_segment("a\0b").is_err());
    }

    #[test]
    fn test_rejects_invalid_names() {
        assert!(validate_segment("").is_err());
        assert!(validate_segment("..").is_err());
        assert!(validate_segment("a/b").is_err());
        assert!(validate_segment("a\\b").is_err());
        assert!(validate_segment("report.pdf").is_ok());
    }

    #[test]
    fn test_name_and_parent() {
        assert_eq!(name_of("docs/img/"), "img");
        assert_eq!(name_of("docs/report.pdf"), "report.pdf");
        assert_eq!(name_of("readme.md"), "readme.md");
        assert_eq!(parent_prefix("docs/img/"), "docs/");
        assert_eq!(parent_prefix("docs/img/logo.png"), "docs/img/");
        assert_eq!(parent_prefix("docs/"), "");
        assert_eq!(parent_prefix("readme.md"), "");
    }
}
