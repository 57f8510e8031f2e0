//! Metadata inference from noisy video metadata.
//!
//! Turns a raw title, optional channel name and optional description into a
//! best-guess `MusicMetadata`. Inference is an ordered list of pure strategies;
//! the first one that yields an artist or track wins.
//!
//! Also home of the text folding used before every fuzzy comparison.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::models::{Chapter, MusicMetadata, VideoInfo};
use crate::scoring::{folded_token_set_ratio, CHANNEL_MATCH_THRESHOLD};

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Trailing bracketed promotional qualifier: "(Official Video)", "[Lyrics]",
/// "(Sped Up)". Anchored at the end; qualifiers can stack, so callers apply it
/// repeatedly.
pub static TITLE_TRIM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        (\s*[\(\[]\s*
            (official(?:\s*music)?\s*video|mv|lyric(?:s|\s*video)?|audio|teaser|short|pv|
             full|ver\.?|version|remix|edit|live|acoustic|prod\.?.*?|performance|
             music\s*video|color\s*coded|dance\s*practice|practice|choreo(?:graphy)?|
             official\s*audio|visualizer|sped\s*up|slowed\s*reverb)
        \s*[\)\]]\s*)$",
    )
    .unwrap()
});

/// Maximal run of kana/kanji, allowing inner whitespace.
pub static CJK_RUN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\u{3040}-\u{30FF}\u{4E00}-\u{9FFF}]+(?:\s*[\u{3040}-\u{30FF}\u{4E00}-\u{9FFF}]+)*")
        .unwrap()
});

/// Separators between "artist" and "track" in song-only queries.
pub static SEP_ANY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*(?:-+|–|—|/|／|\||｜|•|・|~|〜)\s*").unwrap());

/// Broader separator set for metadata guessing (adds colons).
pub static SEP_META: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*(?:-|–|—|/|／|\||｜|:|：|•|・|~|〜)\s*").unwrap());

/// Everything from the first separator on, for truncating a CJK track candidate.
pub static CJK_TAIL_SEP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s　]*(?:/|／|\||｜|-|–|—|:|：).*$").unwrap());

/// Auto-generated "Artist - Topic" channel suffix.
pub static CHANNEL_TOPIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s*[-–—]\s*topic$").unwrap());

/// Channel branding tokens.
pub static CHANNEL_OFFICIAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(official|offical|オフィシャル|公式|vevo)\b").unwrap());

/// Promotional keywords anywhere in an artist/track candidate.
pub static PROMO_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(official(?: music)? video|mv|lyric(?:s|\s*video)?|audio|teaser|short|pv|full|ver\.?|version|remix|edit|live|acoustic|prod\.?.*?|performance|visualizer|sped\s*up|slowed\s*reverb)\b",
    )
    .unwrap()
});

/// Description values that are platform disclaimers, not metadata.
pub static BOILERPLATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(licensed to youtube|auto-generated by youtube)").unwrap());

/// Regex to collapse any whitespace run into a single space
pub static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Regex to collapse multiple whitespace into single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

// ============================================================================
// CONSTANTS
// ============================================================================

/// Iteration cap for stripping stacked qualifiers.
const MAX_TRIM_PASSES: usize = 5;

/// How many lines after "Provided to YouTube by" to look for "Track · Artist".
const PROVIDED_LOOKAHEAD: usize = 5;

/// Chapter labels longer than this are descriptions, not song titles.
const MAX_CHAPTER_TITLE_CHARS: usize = 80;

const PROVIDED_MARKER: &str = "provided to youtube by";
const PROVIDED_SEPARATOR: &str = " · ";

const SONG_KEYS: &[&str] = &["song", "楽曲", "曲", "タイトル"];
const ARTIST_KEYS: &[&str] = &["artist", "アーティスト"];
const ALBUM_KEYS: &[&str] = &["album", "アルバム"];

/// Artist values that carry no information (compared after folding).
const BLOCKED_ARTISTS: &[&str] = &[
    "topic",
    "various artists",
    "auto-generated by youtube",
    "unknown artist",
    "v.a.",
];

const CHANNEL_TRIM_CHARS: &[char] = &[' ', '-', '–', '—', '|', '｜', '・'];
const CANDIDATE_TRIM_CHARS: &[char] = &[' ', '-', '–', '—', '/', '／', '|', '｜', '•', '・', '~', '〜'];

// ============================================================================
// TEXT FOLDING
// ============================================================================

/// NFKC, trim, collapse whitespace. Keeps case.
pub fn clean_spaces(s: &str) -> String {
    let folded: String = s.nfkc().collect();
    WHITESPACE.replace_all(folded.trim(), " ").to_string()
}

/// Width/compatibility fold + case fold + whitespace collapse.
/// Applied to both sides before any similarity comparison.
/// e.g., "ＹＯＡＳＯＢＩ  " → "yoasobi"
pub fn fold_text(s: &str) -> String {
    clean_spaces(s).to_lowercase()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

// ============================================================================
// TITLE HELPERS
// ============================================================================

/// Strip stacked trailing promotional qualifiers.
/// e.g., "Song (Official Video) [Lyrics]" → "Song"
pub fn clean_title_for_song(title: &str) -> String {
    let mut t = title.trim().to_string();
    for _ in 0..MAX_TRIM_PASSES {
        let next = TITLE_TRIM.replace(&t, "").trim().to_string();
        if next == t {
            break;
        }
        t = next;
    }
    MULTI_SPACE.replace_all(&t, " ").to_string()
}

/// Longest kana/kanji run; the first one wins on ties.
pub fn longest_cjk_run(text: &str) -> Option<&str> {
    let mut best: Option<(&str, usize)> = None;
    for m in CJK_RUN.find_iter(text) {
        let len = m.as_str().chars().count();
        if best.map_or(true, |(_, best_len)| len > best_len) {
            best = Some((m.as_str(), len));
        }
    }
    best.map(|(s, _)| s.trim()).filter(|s| !s.is_empty())
}

/// Reduce a video title to a bare song-title query (no artist).
/// e.g., "米津玄師 - かいじゅうのマーチ" → "かいじゅうのマーチ"
pub fn song_only(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    let cleaned = clean_title_for_song(text);
    let target = longest_cjk_run(&cleaned).unwrap_or(&cleaned);
    let parts: Vec<&str> = SEP_ANY
        .split(target)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() >= 2 {
        parts[parts.len() - 1].to_string()
    } else {
        target.to_string()
    }
}

/// Strip "- Topic" and branding tokens from a channel name.
/// e.g., "Artist Name - Topic" → "Artist Name", "ArtistVEVO" stays (no word boundary)
pub fn clean_channel_name(name: &str) -> Option<String> {
    let n = clean_spaces(name);
    let n = CHANNEL_TOPIC.replace(&n, "");
    let n = CHANNEL_OFFICIAL.replace_all(&n, "");
    let n = WHITESPACE.replace_all(&n, " ");
    non_empty(n.trim_matches(CHANNEL_TRIM_CHARS).to_string())
}

/// Remove promotional keywords left inside an artist/track candidate.
fn trim_noise(s: &str) -> Option<String> {
    let s = PROMO_NOISE.replace_all(s, "");
    let s = WHITESPACE.replace_all(&s, " ");
    non_empty(s.trim_matches(CANDIDATE_TRIM_CHARS).to_string())
}

pub fn is_blocked_artist(artist: &str) -> bool {
    let folded = fold_text(artist);
    BLOCKED_ARTISTS.contains(&folded.as_str())
}

// ============================================================================
// STRATEGIES
// ============================================================================

/// Raw inputs for metadata inference.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetadataInput<'a> {
    pub title: &'a str,
    pub channel: Option<&'a str>,
    pub description: Option<&'a str>,
    pub chapters: &'a [Chapter],
}

pub type Strategy = fn(&MetadataInput) -> Option<MusicMetadata>;

/// Evaluated in order; first non-empty result wins.
pub const STRATEGIES: &[Strategy] = &[from_description, from_title_and_channel, from_chapters];

fn metadata(artist: Option<String>, track: Option<String>, album: Option<String>) -> Option<MusicMetadata> {
    if artist.is_none() && track.is_none() {
        return None;
    }
    Some(MusicMetadata {
        artist,
        track,
        album,
        year: None,
    })
}

/// Structured description blocks:
/// - "Provided to YouTube by ..." followed by "Track · Artist"
/// - labeled fields ("Song" / "Artist" / "Album", plus Japanese labels) with
///   the value on the next line
pub fn from_description(input: &MetadataInput) -> Option<MusicMetadata> {
    let desc = input.description?;
    let lines: Vec<String> = desc
        .lines()
        .map(clean_spaces)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return None;
    }

    for (i, line) in lines.iter().enumerate() {
        if !line.to_lowercase().contains(PROVIDED_MARKER) {
            continue;
        }
        let window_end = (i + 1 + PROVIDED_LOOKAHEAD).min(lines.len());
        for candidate in &lines[i + 1..window_end] {
            if let Some((left, right)) = candidate.split_once(PROVIDED_SEPARATOR) {
                let (track, artist) = (left.trim(), right.trim());
                if !track.is_empty() && !artist.is_empty() {
                    return metadata(Some(artist.to_string()), Some(track.to_string()), None);
                }
            }
        }
    }

    let pick_after = |keys: &[&str]| -> Option<String> {
        lines.windows(2).find_map(|pair| {
            let label = pair[0].to_lowercase();
            if !keys.contains(&label.as_str()) {
                return None;
            }
            let value = pair[1].trim();
            if BOILERPLATE.is_match(value) {
                None
            } else {
                Some(value.to_string())
            }
        })
    };

    metadata(pick_after(ARTIST_KEYS), pick_after(SONG_KEYS), pick_after(ALBUM_KEYS))
}

/// "Artist - Track" style titles, cross-checked against the channel name.
pub fn from_title_and_channel(input: &MetadataInput) -> Option<MusicMetadata> {
    let title = clean_spaces(input.title);
    if title.is_empty() {
        return None;
    }
    let t = clean_title_for_song(&title);
    let parts: Vec<&str> = SEP_META.split(&t).filter(|p| !p.is_empty()).collect();

    let (mut cand_artist, mut cand_track) = if parts.len() >= 2 {
        (Some(parts[0].to_string()), Some(parts[parts.len() - 1].to_string()))
    } else {
        (None, None)
    };

    if cand_track.is_none() {
        cand_track = longest_cjk_run(&t)
            .map(|run| CJK_TAIL_SEP.replace(run, "").trim().to_string())
            .and_then(non_empty);
    }
    let channel = input.channel.and_then(clean_channel_name);
    if let (Some(ch), Some(artist)) = (channel.as_deref(), cand_artist.as_deref()) {
        // "Track - Artist" order: the channel matches the last segment instead.
        if folded_token_set_ratio(ch, artist) < CHANNEL_MATCH_THRESHOLD
            && parts.len() >= 2
            && folded_token_set_ratio(ch, parts[parts.len() - 1]) >= CHANNEL_MATCH_THRESHOLD
        {
            cand_artist = Some(parts[parts.len() - 1].to_string());
            cand_track = Some(parts[0].to_string());
        }
    }
    if cand_artist.is_none() {
        cand_artist = channel;
    }
    // A bare title is only a track once something else supplied the artist.
    if cand_track.is_none() && cand_artist.is_some() && parts.len() == 1 {
        cand_track = non_empty(parts[0].trim().to_string());
    }

    metadata(
        cand_artist.as_deref().and_then(trim_noise),
        cand_track.as_deref().and_then(trim_noise),
        None,
    )
}

/// First chapter label as the track name, when it is short enough.
pub fn from_chapters(input: &MetadataInput) -> Option<MusicMetadata> {
    let first = input.chapters.first()?.title.as_deref()?;
    if first.chars().count() > MAX_CHAPTER_TITLE_CHARS {
        return None;
    }
    metadata(None, non_empty(clean_spaces(first)), None)
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

fn drop_blocked_artist(mut meta: MusicMetadata) -> MusicMetadata {
    if meta.artist.as_deref().is_some_and(is_blocked_artist) {
        meta.artist = None;
    }
    meta
}

/// Run the strategy chain over all available inputs.
pub fn normalize_input(input: &MetadataInput) -> MusicMetadata {
    let meta = STRATEGIES
        .iter()
        .find_map(|strategy| strategy(input).filter(|m| !m.is_empty()))
        .unwrap_or_default();
    drop_blocked_artist(meta)
}

/// Infer `(artist, track, album)` from title, channel and description.
pub fn normalize(title: &str, channel: Option<&str>, description: Option<&str>) -> MusicMetadata {
    normalize_input(&MetadataInput {
        title,
        channel,
        description,
        chapters: &[],
    })
}

/// Metadata for a video: fields the video site already supplies win,
/// heuristics fill the gaps. Returns the display title alongside.
pub fn canon_music_meta(info: &VideoInfo) -> (Option<String>, MusicMetadata) {
    let mut meta = MusicMetadata {
        artist: info.artist.as_ref().and_then(|a| a.joined()),
        track: info.track.clone().map(|t| t.trim().to_string()).and_then(non_empty),
        album: info.album.clone().map(|a| a.trim().to_string()).and_then(non_empty),
        year: info.release_year,
    };

    if meta.artist.is_none() || meta.track.is_none() {
        let guessed = normalize_input(&MetadataInput {
            title: info.title.as_deref().unwrap_or(""),
            channel: info.channel_name(),
            description: info.description.as_deref(),
            chapters: info.chapters(),
        });
        meta.artist = meta.artist.or(guessed.artist);
        meta.track = meta.track.or(guessed.track);
        meta.album = meta.album.or(guessed.album);
    }

    let meta = drop_blocked_artist(meta);
    let display = meta.display().or_else(|| meta.track.clone());
    (display, meta)
}

/// Title shown in the document heading.
pub fn display_title_for(info: &VideoInfo) -> String {
    canon_music_meta(info)
        .0
        .or_else(|| info.title.clone().filter(|t| !t.trim().is_empty()))
        .unwrap_or_else(|| "(no title)".to_string())
}

// ============================================================================
// TESTS
// ============================================================================
