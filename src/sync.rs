//! Document sync: write a resolved lyrics document into the store without
//! ever overwriting one that already exists.
//!
//! Steps:
//! 1. Find or create the container, reconcile its description
//! 2. Stop if a primary record exists (human edits are authoritative)
//! 3. Compose heading + fenced body
//! 4. Create the primary record (a conflicting create means another writer won)
//! 5. Make the provenance flag set contain exactly the current code
//!
//! Errors in step 1 are returned; anything later degrades to
//! `SyncOutcome::Failed`.

use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::lrc::{serialize_payload, unfence};
use crate::models::{LyricsPayload, MusicMetadata, RegistrationStatus, SourceId};
use crate::store::{find_primary, DocumentStore, PRIMARY_RECORD};

const ADD_LYRICS_MESSAGE: &str = "Add lyrics";
const REMOVE_FLAG_MESSAGE: &str = "Remove old lyrics source flag";
const SET_FLAG_MESSAGE: &str = "Set lyrics source";

const STATUS_PREFIX: &str = "歌詞登録ステータス";
const CODE_PREFIX: &str = "歌詞取得コード";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    SkippedExisting,
    Failed,
}

/// Container description: "artist – track" when known, else the raw video
/// title, else the document title.
pub fn display_description(meta: &MusicMetadata, raw_title: Option<&str>, title: &str) -> String {
    meta.display()
        .or_else(|| raw_title.map(str::trim).filter(|t| !t.is_empty()).map(String::from))
        .unwrap_or_else(|| title.to_string())
}

fn status_for_body(status: RegistrationStatus, body: &str) -> RegistrationStatus {
    if body.is_empty() {
        RegistrationStatus::NoLyrics
    } else {
        status
    }
}

/// Status the composed document actually carries.
pub fn written_status(status: RegistrationStatus, payload: Option<&LyricsPayload>) -> RegistrationStatus {
    let body = payload.map(serialize_payload).unwrap_or_default();
    status_for_body(status, &body)
}

/// Full document text. An empty body forces the "no lyrics" status and a
/// heading-only document.
pub fn compose_document(
    title: &str,
    status: RegistrationStatus,
    payload: Option<&LyricsPayload>,
    code: Option<u8>,
) -> String {
    let body = payload.map(serialize_payload).unwrap_or_default();
    let status = status_for_body(status, &body);

    let mut heading = format!("# {}\n\n> **{}：{}**", title, STATUS_PREFIX, status.label());
    if let Some(code) = code {
        heading.push_str(&format!("\n>\n> **{}：{}**", CODE_PREFIX, code));
    }

    if body.is_empty() {
        return heading;
    }
    let lang = if payload.is_some_and(LyricsPayload::is_synced) { "lrc" } else { "" };
    format!("{}\n\n```{}\n{}\n```", heading, lang, body)
}

fn flag_content(code: u8) -> String {
    format!("{}\n", code)
}

/// Make `active` the only provenance flag in the container. Deleting stale
/// flags is best-effort.
pub fn reconcile_flags(store: &dyn DocumentStore, id: &str, active: SourceId) -> Result<()> {
    let present: FxHashSet<SourceId> = store
        .list_records(id)?
        .iter()
        .filter_map(|name| name.parse::<u8>().ok())
        .filter_map(SourceId::from_code)
        .collect();
    let desired: FxHashSet<SourceId> = [active].into_iter().collect();

    for stale in present.difference(&desired) {
        let name = stale.code().to_string();
        let result = match store.read_record(id, &name) {
            Ok(Some(record)) => store.delete_record(id, &name, &record.revision, REMOVE_FLAG_MESSAGE),
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => debug!("Removed stale flag {} from {}", name, id),
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!("Could not remove stale flag {} from {}: {}", name, id, e),
        }
    }

    let name = active.code().to_string();
    let content = flag_content(active.code());
    match store.read_record(id, &name)? {
        Some(record) if record.content == content => Ok(()),
        Some(record) => store.update_record(id, &name, &content, &record.revision, SET_FLAG_MESSAGE),
        None => match store.create_record(id, &name, &content, SET_FLAG_MESSAGE) {
            Err(e) if e.is_conflict() => Ok(()),
            other => other,
        },
    }
}

/// Create the lyrics document for `id` unless one already exists.
pub fn sync(
    store: &dyn DocumentStore,
    id: &str,
    title: &str,
    status: RegistrationStatus,
    payload: Option<&LyricsPayload>,
    source: Option<SourceId>,
    description: &str,
) -> Result<SyncOutcome> {
    match store.container(id)? {
        Some(container) => {
            if container.description.as_deref().unwrap_or("") != description {
                if let Err(e) = store.set_description(id, description) {
                    warn!("Could not update description of {}: {}", id, e);
                }
            }
        }
        None => match store.create_container(id, description) {
            Ok(_) => info!("Created container {}", id),
            Err(e) if e.is_conflict() => debug!("Container {} created concurrently", id),
            Err(e) => return Err(e),
        },
    }

    let names = match store.list_records(id) {
        Ok(names) => names,
        Err(e) => {
            warn!("Could not list records of {}: {}", id, e);
            return Ok(SyncOutcome::Failed);
        }
    };
    if let Some(existing) = find_primary(&names) {
        info!("{} already has {}, leaving it untouched", id, existing);
        return Ok(SyncOutcome::SkippedExisting);
    }

    let code = source.map(SourceId::code);
    let content = compose_document(title, status, payload, code);
    match store.create_record(id, PRIMARY_RECORD, &content, ADD_LYRICS_MESSAGE) {
        Ok(()) => {}
        Err(e) if e.is_conflict() => {
            info!("{} was written concurrently, leaving it untouched", id);
            return Ok(SyncOutcome::SkippedExisting);
        }
        Err(e) => {
            warn!("Could not write {} for {}: {}", PRIMARY_RECORD, id, e);
            return Ok(SyncOutcome::Failed);
        }
    }

    if let Some(source) = source {
        if let Err(e) = reconcile_flags(store, id, source) {
            warn!("Could not set provenance flag for {}: {}", id, e);
            return Ok(SyncOutcome::Failed);
        }
    }

    info!("Registered lyrics for {} ({})", id, written_status(status, payload).label());
    Ok(SyncOutcome::Created)
}

/// Stored document text with fences stripped, `None` when there is none.
pub fn existing_lyrics(store: &dyn DocumentStore, id: &str) -> Result<Option<String>> {
    let names = store.list_records(id)?;
    let Some(name) = find_primary(&names) else {
        return Ok(None);
    };
    let text = store
        .read_record(id, name)?
        .map(|record| unfence(&record.content))
        .filter(|text| !text.is_empty());
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LyricsError;
    use crate::models::Cue;
    use crate::store::{Container, Record, SqliteStore};

    fn cues() -> LyricsPayload {
        LyricsPayload::Cues(vec![Cue::new(1.0, "夢ならば")])
    }

    fn sync_default(store: &dyn DocumentStore, payload: Option<&LyricsPayload>) -> SyncOutcome {
        let status = RegistrationStatus::for_payload(payload);
        sync(store, "vid", "Lemon", status, payload, Some(SourceId::Lrclib), "米津玄師 – Lemon").unwrap()
    }

    #[test]
    fn test_compose_synced_document() {
        let doc = compose_document("Lemon", RegistrationStatus::Synced, Some(&cues()), Some(1));
        assert_eq!(
            doc,
            "# Lemon\n\n> **歌詞登録ステータス：Auto/同期あり**\n>\n> **歌詞取得コード：1**\n\n```lrc\n[00:01.00] 夢ならば\n```"
        );
    }

    #[test]
    fn test_compose_plain_document_is_untagged() {
        let plain = LyricsPayload::Plain("line".into());
        let doc = compose_document("T", RegistrationStatus::Plain, Some(&plain), Some(3));
        assert!(doc.ends_with("\n\n```\nline\n```"));
        assert!(doc.contains("Auto/同期なし"));
    }

    #[test]
    fn test_compose_without_lyrics_is_heading_only() {
        let doc = compose_document("T", RegistrationStatus::Plain, None, None);
        assert_eq!(doc, "# T\n\n> **歌詞登録ステータス：歌詞の登録なし**");
    }

    #[test]
    fn test_second_sync_skips_and_keeps_content() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(sync_default(&store, Some(&cues())), SyncOutcome::Created);
        let first = store.read_record("vid", PRIMARY_RECORD).unwrap().unwrap();

        let other = LyricsPayload::Plain("different".into());
        assert_eq!(sync_default(&store, Some(&other)), SyncOutcome::SkippedExisting);
        let second = store.read_record("vid", PRIMARY_RECORD).unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_existing_primary_matched_case_insensitively() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_container("vid", "x").unwrap();
        store.create_record("vid", "readme.md", "hand written", "m").unwrap();
        assert_eq!(sync_default(&store, Some(&cues())), SyncOutcome::SkippedExisting);
        assert!(store.read_record("vid", PRIMARY_RECORD).unwrap().is_none());
    }

    #[test]
    fn test_no_lyrics_still_creates_document() {
        let store = SqliteStore::open_in_memory().unwrap();
        let outcome = sync(
            &store,
            "vid",
            "T",
            RegistrationStatus::NoLyrics,
            None,
            None,
            "T",
        )
        .unwrap();
        assert_eq!(outcome, SyncOutcome::Created);
        let doc = store.read_record("vid", PRIMARY_RECORD).unwrap().unwrap();
        assert!(doc.content.contains("歌詞の登録なし"));
        assert!(!doc.content.contains("```"));
        assert_eq!(store.list_records("vid").unwrap(), vec![PRIMARY_RECORD]);
    }

    #[test]
    fn test_description_is_reconciled() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_container("vid", "old").unwrap();
        sync_default(&store, None);
        let container = store.container("vid").unwrap().unwrap();
        assert_eq!(container.description.as_deref(), Some("米津玄師 – Lemon"));
    }

    #[test]
    fn test_flags_replaced_by_current_code() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_container("vid", "x").unwrap();
        store.create_record("vid", "1", "1\n", "m").unwrap();
        store.create_record("vid", "2", "2\n", "m").unwrap();

        reconcile_flags(&store, "vid", SourceId::PetitLyrics).unwrap();
        assert_eq!(store.list_records("vid").unwrap(), vec!["3"]);
        assert_eq!(store.read_record("vid", "3").unwrap().unwrap().content, "3\n");
    }

    #[test]
    fn test_reconcile_is_idempotent_and_repairs_content() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_container("vid", "x").unwrap();
        store.create_record("vid", "1", "garbage", "m").unwrap();

        reconcile_flags(&store, "vid", SourceId::Lrclib).unwrap();
        let repaired = store.read_record("vid", "1").unwrap().unwrap();
        assert_eq!(repaired.content, "1\n");

        reconcile_flags(&store, "vid", SourceId::Lrclib).unwrap();
        let again = store.read_record("vid", "1").unwrap().unwrap();
        assert_eq!(again.revision, repaired.revision);
    }

    #[test]
    fn test_existing_lyrics() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(existing_lyrics(&store, "vid").unwrap(), None);
        sync_default(&store, Some(&LyricsPayload::Plain("line".into())));
        let text = existing_lyrics(&store, "vid").unwrap().unwrap();
        assert!(text.starts_with("# Lemon"));
        assert!(text.ends_with("line"));
        assert!(!text.contains("```"));
    }

    #[test]
    fn test_display_description_fallbacks() {
        let full = MusicMetadata {
            artist: Some("A".into()),
            track: Some("T".into()),
            ..Default::default()
        };
        assert_eq!(display_description(&full, Some("raw"), "title"), "A – T");
        let partial = MusicMetadata { track: Some("T".into()), ..Default::default() };
        assert_eq!(display_description(&partial, Some(" raw "), "title"), "raw");
        assert_eq!(display_description(&partial, None, "title"), "title");
    }

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Fault {
        /// Every create fails outright.
        ReadOnly,
        /// Creating the primary record loses a race with another writer.
        PrimaryConflict,
        /// Deletes report the record as already gone.
        DeleteNotFound,
    }

    /// Delegates to SQLite, injecting one kind of failure.
    struct FaultyStore {
        inner: SqliteStore,
        fault: Fault,
    }

    impl FaultyStore {
        fn new(fault: Fault) -> Self {
            Self {
                inner: SqliteStore::open_in_memory().unwrap(),
                fault,
            }
        }
    }

    impl DocumentStore for FaultyStore {
        fn container(&self, id: &str) -> Result<Option<Container>> {
            self.inner.container(id)
        }
        fn create_container(&self, id: &str, description: &str) -> Result<Container> {
            self.inner.create_container(id, description)
        }
        fn set_description(&self, id: &str, description: &str) -> Result<()> {
            self.inner.set_description(id, description)
        }
        fn list_records(&self, id: &str) -> Result<Vec<String>> {
            self.inner.list_records(id)
        }
        fn read_record(&self, id: &str, name: &str) -> Result<Option<Record>> {
            self.inner.read_record(id, name)
        }
        fn create_record(&self, id: &str, name: &str, content: &str, msg: &str) -> Result<()> {
            match self.fault {
                Fault::ReadOnly => Err(LyricsError::PersistFailure("read only".into())),
                Fault::PrimaryConflict if name == PRIMARY_RECORD => {
                    Err(LyricsError::Conflict(format!("{}/{} exists", id, name)))
                }
                _ => self.inner.create_record(id, name, content, msg),
            }
        }
        fn update_record(&self, id: &str, name: &str, content: &str, rev: &str, msg: &str) -> Result<()> {
            self.inner.update_record(id, name, content, rev, msg)
        }
        fn delete_record(&self, id: &str, name: &str, rev: &str, msg: &str) -> Result<()> {
            if self.fault == Fault::DeleteNotFound {
                return Err(LyricsError::NotFound(format!("{}/{}", id, name)));
            }
            self.inner.delete_record(id, name, rev, msg)
        }
        fn container_url(&self, id: &str) -> String {
            self.inner.container_url(id)
        }
    }

    #[test]
    fn test_concurrent_primary_create_is_skipped() {
        let store = FaultyStore::new(Fault::PrimaryConflict);
        assert_eq!(sync_default(&store, Some(&cues())), SyncOutcome::SkippedExisting);
        assert!(store.list_records("vid").unwrap().is_empty());
    }

    #[test]
    fn test_vanished_stale_flag_is_not_an_error() {
        let store = FaultyStore::new(Fault::DeleteNotFound);
        store.create_container("vid", "米津玄師 – Lemon").unwrap();
        store.create_record("vid", "3", "3\n", "m").unwrap();

        assert_eq!(sync_default(&store, Some(&cues())), SyncOutcome::Created);
        let flag = store.read_record("vid", "1").unwrap().unwrap();
        assert_eq!(flag.content, "1\n");
    }

    #[test]
    fn test_written_status_downgrades_empty_body() {
        let empty = LyricsPayload::Plain("   ".into());
        assert_eq!(
            written_status(RegistrationStatus::Plain, Some(&empty)),
            RegistrationStatus::NoLyrics
        );
        assert_eq!(
            written_status(RegistrationStatus::Synced, Some(&cues())),
            RegistrationStatus::Synced
        );
        assert_eq!(written_status(RegistrationStatus::Plain, None), RegistrationStatus::NoLyrics);
    }

    #[test]
    fn test_write_failure_degrades_to_failed() {
        let store = FaultyStore::new(Fault::ReadOnly);
        assert_eq!(sync_default(&store, Some(&cues())), SyncOutcome::Failed);
    }
}
