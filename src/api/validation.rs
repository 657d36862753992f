//! Input validation for API requests.
//!
//! For collecting multiple validation errors and returning them as an
//! ApiError, use the `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for validating usernames (alphanumeric with ._-, 3-100 chars)
    static ref USERNAME_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9][a-zA-Z0-9._-]{2,99}$"
    ).unwrap();

    /// Regex for validating UUID path segments
    static ref UUID_REGEX: Regex = Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
    ).unwrap();
}

/// Image formats accepted for upload
pub const ALLOWED_IMAGE_FORMATS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// Maximum upload size: 10 MiB
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Validate a UUID path parameter
pub fn validate_uuid(value: &str, field: &str) -> Result<(), String> {
    if UUID_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(format!("{} must be a valid UUID", field))
    }
}

pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required".to_string());
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err(
            "Username must be 3-100 characters (letters, digits, '.', '_', '-')".to_string(),
        );
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if password.len() > 256 {
        return Err("Password is too long (max 256 characters)".to_string());
    }
    Ok(())
}

/// Validate an optional RFC 3339 timestamp field
pub fn validate_timestamp(value: &str, field: &str) -> Result<(), String> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|_| ())
        .map_err(|_| format!("{} must be an RFC 3339 timestamp", field))
}

/// Extract the lowercase extension from a filename
pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Validate an uploaded image filename, returning its format
pub fn validate_image_filename(filename: &str) -> Result<String, String> {
    let ext = file_extension(filename)
        .ok_or_else(|| "Filename must include an extension".to_string())?;
    if ALLOWED_IMAGE_FORMATS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(format!(
            "File type not allowed. Allowed types: {}",
            ALLOWED_IMAGE_FORMATS.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000", "id").is_ok());
        assert!(validate_uuid("not-a-uuid", "id").is_err());
        assert!(validate_uuid("", "id").is_err());
        // Error message names the field
        assert!(validate_uuid("x", "session_id").unwrap_err().contains("session_id"));
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("a.b-c_d99").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has spaces").is_err());
        assert!(validate_username(&"x".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"x".repeat(257)).is_err());
    }

    #[test]
    fn test_validate_timestamp() {
        assert!(validate_timestamp("2025-02-08T15:30:00Z", "startedAt").is_ok());
        assert!(validate_timestamp("2025-02-08T15:30:00+02:00", "startedAt").is_ok());
        assert!(validate_timestamp("2/8/2025, 3:30:00 PM", "startedAt").is_err());
        assert!(validate_timestamp("", "startedAt").is_err());
    }

    #[test]
    fn test_image_filename() {
        assert_eq!(validate_image_filename("shot.PNG").unwrap(), "png");
        assert_eq!(validate_image_filename("a.b.jpeg").unwrap(), "jpeg");
        assert!(validate_image_filename("script.exe").is_err());
        assert!(validate_image_filename("noextension").is_err());
        assert!(validate_image_filename("trailingdot.").is_err());
    }
}
