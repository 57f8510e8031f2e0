//! Safety checks run before anything is written to a store.
//!
//! Identifiers become repository names and URL path segments, so anything
//! outside a conservative character set is rejected up front.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{LyricsError, Result};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]{1,100}$").unwrap());

/// Validates that a media identifier is safe to use as a container name.
///
/// Checks:
/// - 1 to 100 characters from `[A-Za-z0-9_.-]`
/// - not `.` or `..`
///
/// # Returns
/// * `Ok(())` if the identifier is safe
/// * `Err(LyricsError::Config)` with a descriptive message otherwise
pub fn validate_identifier(id: &str) -> Result<()> {
    if !IDENTIFIER.is_match(id) {
        return Err(LyricsError::Config(format!(
            "Safety check failed: identifier {:?} must be 1-100 characters of [A-Za-z0-9_.-]",
            id
        )));
    }
    if id == "." || id == ".." {
        return Err(LyricsError::Config(format!(
            "Safety check failed: identifier {:?} is a path component",
            id
        )));
    }
    Ok(())
}
