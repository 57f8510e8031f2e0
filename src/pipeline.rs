//! Source resolution: LRCLIB first, then the scraped site, else nothing.
//!
//! Every step is isolated. A transport or parse error is logged and turns
//! that step into "no result"; it never aborts the resolution.

use tracing::{debug, info, warn};

use crate::models::{LyricsPayload, MusicMetadata, SourceId, SourceResult};
use crate::normalize::song_only;
use crate::scoring::FUZZY_TITLE_CUTOFF;
use crate::sources::lrclib::pick_best;
use crate::sources::petitlyrics::{find_exact, find_fuzzy};
use crate::sources::{LyricDatabase, ScrapedLyricSite};

pub struct Resolver<'a> {
    database: &'a dyn LyricDatabase,
    site: &'a dyn ScrapedLyricSite,
    fuzzy_cutoff: f64,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl<'a> Resolver<'a> {
    pub fn new(database: &'a dyn LyricDatabase, site: &'a dyn ScrapedLyricSite) -> Self {
        Self {
            database,
            site,
            fuzzy_cutoff: FUZZY_TITLE_CUTOFF,
        }
    }

    pub fn with_fuzzy_cutoff(mut self, cutoff: f64) -> Self {
        self.fuzzy_cutoff = cutoff;
        self
    }

    /// Resolve lyrics for `meta`. `raw_title` (the video title) supplies the
    /// track name when the metadata has none.
    pub fn resolve(&self, meta: &MusicMetadata, raw_title: &str) -> Option<SourceResult> {
        let track = non_empty(meta.track.clone()).or_else(|| non_empty(Some(song_only(raw_title))));

        match track.as_deref() {
            Some(track) => {
                if let Some(result) = self.from_database(track, meta.artist.as_deref()) {
                    return Some(result);
                }
            }
            None => debug!("No track name for {:?}, skipping LRCLIB", raw_title),
        }

        let query = song_only(track.as_deref().unwrap_or(raw_title));
        if query.is_empty() {
            debug!("No title query for {:?}, skipping PetitLyrics", raw_title);
            return None;
        }
        if let Some(result) = self.from_site(&query) {
            return Some(result);
        }

        info!("No lyrics found for {:?}", raw_title);
        None
    }

    fn from_database(&self, track: &str, artist: Option<&str>) -> Option<SourceResult> {
        let records = match self.database.search(track, artist) {
            Ok(records) => records,
            Err(e) => {
                warn!("LRCLIB search failed for {:?}: {}", track, e);
                return None;
            }
        };

        let Some(best) = pick_best(&records, track, artist) else {
            debug!("LRCLIB: no candidates for {:?}", track);
            return None;
        };
        let Some(payload) = best.to_payload() else {
            debug!("LRCLIB: best candidate {:?} carries no lyrics", best.track_name);
            return None;
        };

        info!(
            "LRCLIB hit: {:?} by {:?} ({})",
            best.track_name,
            best.artist_name,
            if payload.is_synced() { "synced" } else { "plain" }
        );
        Some(SourceResult {
            source: SourceId::Lrclib,
            payload,
            raw_artist: best.artist_name.clone(),
            raw_track: Some(best.track_name.clone()),
        })
    }

    fn from_site(&self, query: &str) -> Option<SourceResult> {
        let rows = match self.site.search(query) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("PetitLyrics search failed for {:?}: {}", query, e);
                return None;
            }
        };

        let Some(id) = find_exact(&rows, query).or_else(|| find_fuzzy(&rows, query, self.fuzzy_cutoff))
        else {
            debug!("PetitLyrics: no acceptable row for {:?} ({} rows)", query, rows.len());
            return None;
        };

        let text = match self.site.fetch_text_by_id(id) {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("PetitLyrics: no text for id {}", id);
                return None;
            }
            Err(e) => {
                warn!("PetitLyrics fetch failed for id {}: {}", id, e);
                return None;
            }
        };

        let payload = LyricsPayload::from_parts(Some(text), Vec::new())?;
        info!("PetitLyrics hit: id {} for {:?}", id, query);
        Some(SourceResult {
            source: SourceId::PetitLyrics,
            payload,
            raw_artist: None,
            raw_track: rows.iter().find(|r| r.id == id).map(|r| r.text.clone()),
        })
    }
}
