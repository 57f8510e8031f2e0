//! SQLite-backed document store.
//!
//! The `(container, name)` primary key makes concurrent creates of the same
//! record conflict atomically, mirroring the hosted store.

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{Container, DocumentStore, Record};
use crate::error::{LyricsError, Result};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS containers (
        name TEXT PRIMARY KEY,
        description TEXT
    );

    CREATE TABLE IF NOT EXISTS records (
        container TEXT NOT NULL REFERENCES containers(name),
        name TEXT NOT NULL,
        content TEXT NOT NULL,
        revision INTEGER NOT NULL DEFAULT 1,
        message TEXT,
        PRIMARY KEY (container, name)
    );";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    location: String,
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Self::with_connection(conn, path.display().to_string())
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, ":memory:".to_string())
    }

    fn with_connection(conn: Connection, location: String) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            location,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LyricsError::PersistFailure("store connection lock poisoned".into()))
    }

    fn require_container(conn: &Connection, id: &str) -> Result<()> {
        let exists: Option<String> = conn
            .query_row("SELECT name FROM containers WHERE name = ?1", [id], |row| row.get(0))
            .optional()?;
        match exists {
            Some(_) => Ok(()),
            None => Err(LyricsError::NotFound(format!("container {}", id))),
        }
    }
}

fn parse_revision(revision: &str) -> Result<i64> {
    revision
        .parse()
        .map_err(|_| LyricsError::Conflict(format!("stale revision {:?}", revision)))
}

impl DocumentStore for SqliteStore {
    fn container(&self, id: &str) -> Result<Option<Container>> {
        let conn = self.lock()?;
        let container = conn
            .query_row(
                "SELECT name, description FROM containers WHERE name = ?1",
                [id],
                |row| {
                    Ok(Container {
                        name: row.get(0)?,
                        description: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(container)
    }

    fn create_container(&self, id: &str, description: &str) -> Result<Container> {
        let conn = self.lock()?;
        match conn.execute(
            "INSERT INTO containers (name, description) VALUES (?1, ?2)",
            params![id, description],
        ) {
            Ok(_) => Ok(Container {
                name: id.to_string(),
                description: Some(description.to_string()),
            }),
            Err(e) if is_constraint_violation(&e) => {
                Err(LyricsError::Conflict(format!("container {} exists", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set_description(&self, id: &str, description: &str) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE containers SET description = ?2 WHERE name = ?1",
            params![id, description],
        )?;
        if changed == 0 {
            return Err(LyricsError::NotFound(format!("container {}", id)));
        }
        Ok(())
    }

    fn list_records(&self, id: &str) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name FROM records WHERE container = ?1 ORDER BY name")?;
        let names = stmt
            .query_map([id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn read_record(&self, id: &str, name: &str) -> Result<Option<Record>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT name, content, revision FROM records WHERE container = ?1 AND name = ?2",
                params![id, name],
                |row| {
                    Ok(Record {
                        name: row.get(0)?,
                        content: row.get(1)?,
                        revision: row.get::<_, i64>(2)?.to_string(),
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn create_record(&self, id: &str, name: &str, content: &str, message: &str) -> Result<()> {
        let conn = self.lock()?;
        Self::require_container(&conn, id)?;
        match conn.execute(
            "INSERT INTO records (container, name, content, message) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, content, message],
        ) {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => {
                Err(LyricsError::Conflict(format!("{}/{} exists", id, name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update_record(
        &self,
        id: &str,
        name: &str,
        content: &str,
        revision: &str,
        message: &str,
    ) -> Result<()> {
        let revision = parse_revision(revision)?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE records SET content = ?3, message = ?5, revision = revision + 1
             WHERE container = ?1 AND name = ?2 AND revision = ?4",
            params![id, name, content, revision, message],
        )?;
        if changed == 0 {
            return Err(LyricsError::Conflict(format!("{}/{} changed or missing", id, name)));
        }
        Ok(())
    }

    fn delete_record(&self, id: &str, name: &str, revision: &str, _message: &str) -> Result<()> {
        let revision = parse_revision(revision)?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM records WHERE container = ?1 AND name = ?2 AND revision = ?3",
            params![id, name, revision],
        )?;
        if changed == 0 {
            return Err(LyricsError::NotFound(format!("{}/{}", id, name)));
        }
        Ok(())
    }

    fn container_url(&self, id: &str) -> String {
        format!("sqlite://{}#{}", self.location, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_container() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_container("vid", "desc").unwrap();
        store
    }

    #[test]
    fn test_container_lifecycle() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.container("vid").unwrap(), None);
        store.create_container("vid", "A – B").unwrap();
        assert!(store.create_container("vid", "again").unwrap_err().is_conflict());

        store.set_description("vid", "C – D").unwrap();
        let c = store.container("vid").unwrap().unwrap();
        assert_eq!(c.description.as_deref(), Some("C – D"));
        assert!(store.set_description("missing", "x").unwrap_err().is_not_found());
    }

    #[test]
    fn test_create_record_conflicts() {
        let store = store_with_container();
        store.create_record("vid", "README.md", "body", "Add lyrics").unwrap();
        let err = store.create_record("vid", "README.md", "other", "Add lyrics").unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.read_record("vid", "README.md").unwrap().unwrap().content, "body");
    }

    #[test]
    fn test_create_record_requires_container() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.create_record("nope", "1", "1\n", "m").unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_and_delete_check_revision() {
        let store = store_with_container();
        store.create_record("vid", "1", "1\n", "m").unwrap();
        let rec = store.read_record("vid", "1").unwrap().unwrap();

        store.update_record("vid", "1", "x\n", &rec.revision, "m").unwrap();
        assert!(store.update_record("vid", "1", "y\n", &rec.revision, "m").unwrap_err().is_conflict());

        let rec = store.read_record("vid", "1").unwrap().unwrap();
        assert_eq!(rec.content, "x\n");
        store.delete_record("vid", "1", &rec.revision, "m").unwrap();
        assert!(store.read_record("vid", "1").unwrap().is_none());
        assert!(store.delete_record("vid", "1", &rec.revision, "m").unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_records_sorted() {
        let store = store_with_container();
        store.create_record("vid", "README.md", "x", "m").unwrap();
        store.create_record("vid", "3", "3\n", "m").unwrap();
        assert_eq!(store.list_records("vid").unwrap(), vec!["3", "README.md"]);
        assert!(store.list_records("other").unwrap().is_empty());
    }
}
