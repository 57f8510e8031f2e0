//! PetitLyrics: title-only search and the session protocol that returns the
//! lyric body.
//!
//! Fetching a body takes three requests on one cookie session:
//! 1. `GET /lyrics/{id}` (sets the session cookie)
//! 2. `GET /lib/pl-lib.js` and pull the CSRF token out of it
//! 3. `POST /com/get_lyrics.ajax` with the token; the reply is a JSON array
//!    of `{ "lyrics": <base64 html> }` fragments

use base64::{engine::general_purpose, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::html::{anchor_rows, fragment_text};
use super::ScrapedLyricSite;
use crate::error::{LyricsError, Result};
use crate::normalize::fold_text;
use crate::scoring::token_set_ratio;

pub const DEFAULT_BASE_URL: &str = "https://petitlyrics.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

static LYRICS_HREF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/lyrics/(\d+)").unwrap());

static CSRF_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"setRequestHeader\('X-CSRF-Token', '([0-9a-f]+)'\)").unwrap());

/// First title/artist separator in a result row.
static ROW_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*(?:/|／|\||｜| - |–|—)\s*").unwrap());

/// A search hit: lyric id and the text of the row it was listed in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchRow {
    pub id: u64,
    pub text: String,
}

impl SearchRow {
    /// Folded title side of the row (text before the first separator).
    fn title_side(&self) -> String {
        let folded = fold_text(&self.text);
        match ROW_SEPARATOR.find(&folded) {
            Some(m) => folded[..m.start()].to_string(),
            None => folded,
        }
    }
}

/// Result rows of a search page, in page order.
pub fn parse_search_page(html: &str) -> Vec<SearchRow> {
    anchor_rows(html, &LYRICS_HREF)
        .into_iter()
        .filter_map(|(href, text)| {
            let id = LYRICS_HREF.captures(&href)?.get(1)?.as_str().parse().ok()?;
            Some(SearchRow { id, text })
        })
        .collect()
}

/// First row whose title side contains the query.
pub fn find_exact(rows: &[SearchRow], query: &str) -> Option<u64> {
    let q = fold_text(query);
    if q.is_empty() {
        return None;
    }
    rows.iter().find(|row| row.title_side().contains(&q)).map(|row| row.id)
}

/// Best token-set match on the title side, accepted only at or above `cutoff`.
pub fn find_fuzzy(rows: &[SearchRow], query: &str, cutoff: f64) -> Option<u64> {
    let q = fold_text(query);
    let mut best: Option<(u64, f64)> = None;
    for row in rows {
        let score = token_set_ratio(&q, &row.title_side());
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((row.id, score));
        }
    }
    match best {
        Some((id, score)) if score >= cutoff => Some(id),
        Some((id, score)) => {
            debug!("Best fuzzy row {} scored {:.1}, below cutoff {:.1}", id, score, cutoff);
            None
        }
        None => None,
    }
}

/// Decode the ajax reply into plain text. `None` when every fragment is empty.
pub fn parse_fragments(body: &str) -> Result<Option<String>> {
    #[derive(Deserialize)]
    struct Fragment {
        lyrics: String,
    }

    let fragments: Vec<Fragment> = serde_json::from_str(body)?;
    let mut chunks = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        let bytes = general_purpose::STANDARD
            .decode(fragment.lyrics.trim())
            .map_err(|e| LyricsError::Parse(format!("lyrics fragment: {}", e)))?;
        let html = String::from_utf8_lossy(&bytes);
        chunks.push(fragment_text(&html).trim().to_string());
    }
    let text = chunks.join("\n").trim().to_string();
    Ok(if text.is_empty() { None } else { Some(text) })
}

pub struct PetitLyricsClient {
    client: Client,
    base_url: String,
    user_agent: String,
    timeout: Duration,
}

impl PetitLyricsClient {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: super::http_client(user_agent, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
            timeout,
        })
    }

    /// Fresh cookie session for one fetch.
    fn session(&self) -> Result<Client> {
        let client = Client::builder()
            .user_agent(self.user_agent.as_str())
            .timeout(self.timeout)
            .cookie_store(true)
            .build()?;
        Ok(client)
    }
}

impl ScrapedLyricSite for PetitLyricsClient {
    fn search(&self, title: &str) -> Result<Vec<SearchRow>> {
        let url = format!("{}/search_lyrics", self.base_url);
        debug!("PetitLyrics search: {:?}", title);
        let html = self
            .client
            .get(&url)
            .query(&[("title", title)])
            .send()?
            .error_for_status()?
            .text()?;
        Ok(parse_search_page(&html))
    }

    fn fetch_text_by_id(&self, id: u64) -> Result<Option<String>> {
        let session = self.session()?;

        let page = session
            .get(format!("{}/lyrics/{}", self.base_url, id))
            .send()?
            .error_for_status()?;
        let referer = page.url().to_string();

        let script = session
            .get(format!("{}/lib/pl-lib.js", self.base_url))
            .send()?
            .error_for_status()?
            .text()?;
        let Some(token) = CSRF_TOKEN.captures(&script).and_then(|c| c.get(1)) else {
            debug!("PetitLyrics: no CSRF token in client library");
            return Ok(None);
        };

        let body = session
            .post(format!("{}/com/get_lyrics.ajax", self.base_url))
            .header("X-CSRF-Token", token.as_str())
            .header("X-Requested-With", "XMLHttpRequest")
            .header(reqwest::header::REFERER, referer)
            .header(reqwest::header::ORIGIN, self.base_url.as_str())
            .form(&[("lyrics_id", id.to_string())])
            .send()?
            .error_for_status()?
            .text()?;
        parse_fragments(&body)
    }
}
