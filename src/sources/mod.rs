//! External lyric sources.
//!
//! Each source sits behind a trait so the resolution pipeline can be driven
//! by fakes in tests. Implementations return `Ok(empty)` for "nothing found"
//! and reserve `Err` for transport or parse failures.

pub mod html;
pub mod lrclib;
pub mod petitlyrics;

use reqwest::blocking::Client;
use std::time::Duration;

use crate::error::Result;

pub use lrclib::{LrclibClient, LrclibRecord};
pub use petitlyrics::{PetitLyricsClient, SearchRow};

/// Structured lyric database searched by track (required) and artist.
pub trait LyricDatabase: Send + Sync {
    fn search(&self, track: &str, artist: Option<&str>) -> Result<Vec<LrclibRecord>>;
}

/// Scrape-based lyric site searched by bare song title.
pub trait ScrapedLyricSite: Send + Sync {
    /// Result rows in page order.
    fn search(&self, title: &str) -> Result<Vec<SearchRow>>;

    /// Lyric body for a result id, `None` when the site has no text for it.
    fn fetch_text_by_id(&self, id: u64) -> Result<Option<String>>;
}

/// Blocking client with the shared user agent and a per-call timeout.
pub fn http_client(user_agent: &str, timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()?;
    Ok(client)
}
