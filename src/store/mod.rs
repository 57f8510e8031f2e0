//! Document store: one container per media identifier, holding the primary
//! lyrics document and at most one provenance flag record.
//!
//! Backends:
//! - `GithubStore`: a public repository per identifier
//! - `SqliteStore`: local tables, used offline and in tests
//!
//! Create operations must be atomic: creating something that already exists
//! fails with `LyricsError::Conflict`. Reads of missing things return `None`;
//! writes against missing things fail with `LyricsError::NotFound`.

pub mod github;
pub mod sqlite;

use crate::error::Result;

pub use github::GithubStore;
pub use sqlite::SqliteStore;

/// Name of the primary lyrics document inside a container.
pub const PRIMARY_RECORD: &str = "README.md";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    pub description: Option<String>,
}

/// Stored record content with the opaque revision needed to update or delete it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub content: String,
    pub revision: String,
}

pub trait DocumentStore: Send + Sync {
    fn container(&self, id: &str) -> Result<Option<Container>>;

    fn create_container(&self, id: &str, description: &str) -> Result<Container>;

    fn set_description(&self, id: &str, description: &str) -> Result<()>;

    /// Record names in the container, empty when the container has none.
    fn list_records(&self, id: &str) -> Result<Vec<String>>;

    fn read_record(&self, id: &str, name: &str) -> Result<Option<Record>>;

    fn create_record(&self, id: &str, name: &str, content: &str, message: &str) -> Result<()>;

    fn update_record(
        &self,
        id: &str,
        name: &str,
        content: &str,
        revision: &str,
        message: &str,
    ) -> Result<()>;

    fn delete_record(&self, id: &str, name: &str, revision: &str, message: &str) -> Result<()>;

    /// Where a human can look at the container.
    fn container_url(&self, id: &str) -> String;
}

/// Case-insensitive lookup of the primary record name.
pub fn find_primary(names: &[String]) -> Option<&str> {
    names
        .iter()
        .map(String::as_str)
        .find(|n| n.eq_ignore_ascii_case(PRIMARY_RECORD))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_primary_ignores_case() {
        let names = vec!["1".to_string(), "readme.MD".to_string()];
        assert_eq!(find_primary(&names), Some("readme.MD"));
        assert_eq!(find_primary(&["LICENSE".to_string()]), None);
    }
}
