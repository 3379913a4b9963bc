//! Shared validation helpers for endpoint settings

use anyhow::{bail, Context, Result};
use url::Url;

/// Reject values that cannot be sent in an HTTP header.
///
/// Control characters, DEL, carriage returns, newlines and null bytes are not
/// allowed.
pub fn sanitize_for_header(value: &str, field_name: &str) -> Result<String> {
    if value.is_empty() {
        bail!("{} cannot be empty", field_name);
    }

    for (index, ch) in value.char_indices() {
        if ch.is_control() || ch == '\u{7f}' {
            bail!(
                "{} contains invalid character at position {} ({:?}). \
                Control characters, newlines, carriage returns, and null bytes are not allowed.",
                field_name,
                index,
                ch
            );
        }
    }

    Ok(value.to_string())
}

/// Validate an API key for the `x-goog-api-key` header.
pub fn validate_api_key(api_key: &str) -> Result<String> {
    let trimmed = api_key.trim();

    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        bail!("API key is empty. Set RAHYAB_API_KEY or `endpoint.api_key` in rahyab.toml");
    }

    sanitize_for_header(trimmed, "API key")?;
    trimmed
        .parse::<reqwest::header::HeaderValue>()
        .with_context(|| {
            format!(
                "API key is not a valid header value. Key length: {} characters.",
                trimmed.len()
            )
        })?;

    Ok(trimmed.to_string())
}

/// Validate a base URL and return it without a trailing slash.
pub fn sanitize_base_url(url: &str, field_name: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');

    if trimmed.is_empty() {
        bail!("{} cannot be empty", field_name);
    }

    // Encoded separators mean the value was encoded twice somewhere
    if trimmed.contains("%2F") || trimmed.contains("%3D") || trimmed.contains("%20") {
        bail!(
            "{} appears to contain URL-encoded characters (e.g., %2F, %3D, %20). \
            Please verify the URL is not double-encoded.",
            field_name
        );
    }

    let parsed = Url::parse(trimmed).with_context(|| format!("{} is not a valid URL: {}", field_name, trimmed))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!(
            "{} must start with 'http://' or 'https://'. Got: {}",
            field_name,
            trimmed
        );
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_for_header_valid() {
        assert!(sanitize_for_header("AIzaSyD-abc123", "test").is_ok());
        assert!(sanitize_for_header("hello world", "test").is_ok());
    }

    #[test]
    fn test_sanitize_for_header_invalid() {
        assert!(sanitize_for_header("abc\n123", "test").is_err());
        assert!(sanitize_for_header("abc\r123", "test").is_err());
        assert!(sanitize_for_header("abc\x00123", "test").is_err());
        assert!(sanitize_for_header("abc\x7f123", "test").is_err());
    }

    #[test]
    fn test_validate_api_key() {
        assert!(validate_api_key("AIza-test123").is_ok());
        assert!(validate_api_key("").is_err());
        assert!(validate_api_key("NONE").is_err());
        assert!(validate_api_key(" \n ").is_err());
    }

    #[test]
    fn test_sanitize_base_url() {
        assert_eq!(
            sanitize_base_url("https://generativelanguage.googleapis.com/", "url").unwrap(),
            "https://generativelanguage.googleapis.com"
        );
        assert!(sanitize_base_url("http://localhost:8080", "url").is_ok());
    }

    #[test]
    fn test_sanitize_base_url_invalid() {
        assert!(sanitize_base_url("", "url").is_err());
        assert!(sanitize_base_url("invalid-url", "url").is_err());
        assert!(sanitize_base_url("ftp://example.com", "url").is_err());
        assert!(sanitize_base_url("https://api.example%2Fcom", "url").is_err());
    }
}
