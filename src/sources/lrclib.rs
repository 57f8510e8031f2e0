//! LRCLIB search client.
//!
//! `GET {base}/api/search?track_name=..&artist_name=..` returns a JSON array
//! of candidates. Each element is converted to an `LrclibRecord` at the
//! boundary; elements missing a track name are discarded.

use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::LyricDatabase;
use crate::error::{LyricsError, Result};
use crate::lrc::parse_synced;
use crate::models::LyricsPayload;
use crate::scoring::{best_index, score_candidate};

pub const DEFAULT_BASE_URL: &str = "https://lrclib.net";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// One search candidate with the fields the resolver needs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LrclibRecord {
    pub track_name: String,
    pub artist_name: Option<String>,
    pub album_name: Option<String>,
    pub plain_lyrics: Option<String>,
    pub synced_lyrics: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    #[serde(default)]
    track_name: Option<String>,
    #[serde(default)]
    artist_name: Option<String>,
    #[serde(default)]
    album_name: Option<String>,
    #[serde(default)]
    plain_lyrics: Option<String>,
    #[serde(default)]
    synced_lyrics: Option<String>,
}

fn present(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

impl LrclibRecord {
    fn from_value(value: serde_json::Value) -> Option<Self> {
        let raw: RawRecord = serde_json::from_value(value).ok()?;
        Some(LrclibRecord {
            track_name: present(raw.track_name)?,
            artist_name: present(raw.artist_name),
            album_name: present(raw.album_name),
            plain_lyrics: present(raw.plain_lyrics),
            synced_lyrics: present(raw.synced_lyrics),
        })
    }

    /// Cues when the synced field parses to anything, plain text otherwise.
    pub fn to_payload(&self) -> Option<LyricsPayload> {
        let cues = self
            .synced_lyrics
            .as_deref()
            .map(parse_synced)
            .unwrap_or_default();
        LyricsPayload::from_parts(self.plain_lyrics.clone(), cues)
    }
}

/// Parse a search response body. A non-array body is a parse error; array
/// elements that are not usable records are dropped.
pub fn parse_search_response(body: &str) -> Result<Vec<LrclibRecord>> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    let serde_json::Value::Array(items) = value else {
        return Err(LyricsError::Parse("search response is not an array".into()));
    };
    let total = items.len();
    let records: Vec<LrclibRecord> = items.into_iter().filter_map(LrclibRecord::from_value).collect();
    if records.len() < total {
        debug!("Discarded {} malformed LRCLIB records", total - records.len());
    }
    Ok(records)
}

/// Highest summed similarity against the query; the first record wins ties.
pub fn pick_best<'a>(
    records: &'a [LrclibRecord],
    track: &str,
    artist: Option<&str>,
) -> Option<&'a LrclibRecord> {
    let idx = best_index(records, |r| {
        score_candidate(
            Some(track),
            artist,
            Some(r.track_name.as_str()),
            r.artist_name.as_deref(),
        )
    })?;
    records.get(idx)
}

pub struct LrclibClient {
    client: Client,
    base_url: String,
}

impl LrclibClient {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: super::http_client(user_agent, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl LyricDatabase for LrclibClient {
    fn search(&self, track: &str, artist: Option<&str>) -> Result<Vec<LrclibRecord>> {
        let mut params = vec![("track_name", track)];
        if let Some(artist) = artist.filter(|a| !a.trim().is_empty()) {
            params.push(("artist_name", artist));
        }

        let url = format!("{}/api/search", self.base_url);
        debug!("LRCLIB search: track={:?} artist={:?}", track, artist);
        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()?
            .error_for_status()?;
        let body = response.text()?;
        parse_search_response(&body)
    }
}
