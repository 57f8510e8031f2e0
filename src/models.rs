//! Core data models for lyrics resolution and registration.
//!
//! Request-scoped values (`MusicMetadata`, `SourceResult`) are built fresh per
//! resolution; durable state lives only in the document store.

use serde::Deserialize;

// ============================================================================
// Metadata
// ============================================================================

/// Best-guess music metadata inferred from noisy video metadata.
/// Any field may be missing; absence is an expected outcome.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MusicMetadata {
    pub artist: Option<String>,
    pub track: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
}

impl MusicMetadata {
    pub fn is_empty(&self) -> bool {
        self.artist.is_none() && self.track.is_none()
    }

    /// Canonical "artist – track" string, only when both are known.
    pub fn display(&self) -> Option<String> {
        match (self.artist.as_deref(), self.track.as_deref()) {
            (Some(a), Some(t)) if !a.is_empty() && !t.is_empty() => Some(format!("{} – {}", a, t)),
            _ => None,
        }
    }
}

// ============================================================================
// Cue Model
// ============================================================================

/// Default lifetime of a cue that has no successor to bound it.
pub const LAST_CUE_SPAN: f64 = 4.0;

/// A single timestamped lyric line (or block of lines sharing one timestamp).
#[derive(Clone, Debug, PartialEq)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Cue {
    pub fn new(start: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end: start + LAST_CUE_SPAN,
            text: text.into(),
        }
    }
}

/// Resolved lyrics. Cues are the richer representation and win when present.
#[derive(Clone, Debug, PartialEq)]
pub enum LyricsPayload {
    Plain(String),
    Cues(Vec<Cue>),
}

impl LyricsPayload {
    /// Builds a payload from optional plain and synced inputs, preferring cues.
    pub fn from_parts(plain: Option<String>, cues: Vec<Cue>) -> Option<Self> {
        if !cues.is_empty() {
            return Some(LyricsPayload::Cues(cues));
        }
        plain
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(LyricsPayload::Plain)
    }

    pub fn is_synced(&self) -> bool {
        matches!(self, LyricsPayload::Cues(_))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            LyricsPayload::Plain(text) => text.trim().is_empty(),
            LyricsPayload::Cues(cues) => cues.is_empty(),
        }
    }
}

// ============================================================================
// Sources
// ============================================================================

/// Provenance code of a lyric source. The numeric value is persisted as the
/// provenance flag record, so it must never be renumbered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceId {
    /// Structured lyric database (LRCLIB)
    Lrclib,
    /// Video captions. Reserved: no resolver produces it, but stale flags with
    /// this code are still cleaned up.
    Captions,
    /// Scraped lyric site (PetitLyrics)
    PetitLyrics,
}

impl SourceId {
    pub const ALL: [SourceId; 3] = [SourceId::Lrclib, SourceId::Captions, SourceId::PetitLyrics];

    pub fn code(self) -> u8 {
        match self {
            SourceId::Lrclib => 1,
            SourceId::Captions => 2,
            SourceId::PetitLyrics => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        SourceId::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn label(self) -> &'static str {
        match self {
            SourceId::Lrclib => "lrclib",
            SourceId::Captions => "captions",
            SourceId::PetitLyrics => "petitlyrics",
        }
    }
}

/// Winning output of one source.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceResult {
    pub source: SourceId,
    pub payload: LyricsPayload,
    pub raw_artist: Option<String>,
    pub raw_track: Option<String>,
}

// ============================================================================
// Registration Status
// ============================================================================

/// Human-readable status written into the document heading.
/// Labels are part of the stored document format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationStatus {
    Synced,
    Plain,
    NoLyrics,
}

impl RegistrationStatus {
    pub fn for_payload(payload: Option<&LyricsPayload>) -> Self {
        match payload {
            Some(p) if p.is_empty() => RegistrationStatus::NoLyrics,
            Some(LyricsPayload::Cues(_)) => RegistrationStatus::Synced,
            Some(LyricsPayload::Plain(_)) => RegistrationStatus::Plain,
            None => RegistrationStatus::NoLyrics,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RegistrationStatus::Synced => "Auto/同期あり",
            RegistrationStatus::Plain => "Auto/同期なし",
            RegistrationStatus::NoLyrics => "歌詞の登録なし",
        }
    }
}

// ============================================================================
// Video Metadata (yt-dlp info JSON)
// ============================================================================

/// `artist` arrives either as a single string or as a list of credits.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ArtistField {
    One(String),
    Many(Vec<Option<String>>),
}

impl ArtistField {
    pub fn joined(&self) -> Option<String> {
        let joined = match self {
            ArtistField::One(s) => s.trim().to_string(),
            ArtistField::Many(list) => list
                .iter()
                .flatten()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", "),
        };
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Chapter {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub start_time: Option<f64>,
}

/// The subset of a video-search result the resolver consumes.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct VideoInfo {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub chapters: Option<Vec<Chapter>>,
    #[serde(default)]
    pub artist: Option<ArtistField>,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub release_year: Option<i32>,
}

impl VideoInfo {
    /// Uploader wins over channel, matching how the video site labels auto
    /// generated "Topic" uploads.
    pub fn channel_name(&self) -> Option<&str> {
        let present = |s: &&str| !s.trim().is_empty();
        self.uploader
            .as_deref()
            .filter(present)
            .or_else(|| self.channel.as_deref().filter(present))
    }

    pub fn chapters(&self) -> &[Chapter] {
        self.chapters.as_deref().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_requires_both_fields() {
        let mut meta = MusicMetadata {
            artist: Some("YOASOBI".into()),
            track: Some("夜に駆ける".into()),
            ..Default::default()
        };
        assert_eq!(meta.display().as_deref(), Some("YOASOBI – 夜に駆ける"));
        meta.artist = None;
        assert_eq!(meta.display(), None);
    }

    #[test]
    fn test_payload_prefers_cues() {
        let payload = LyricsPayload::from_parts(Some("plain".into()), vec![Cue::new(1.0, "a")]);
        assert!(payload.unwrap().is_synced());

        let payload = LyricsPayload::from_parts(Some("  plain \n".into()), vec![]);
        assert_eq!(payload, Some(LyricsPayload::Plain("plain".into())));

        assert_eq!(LyricsPayload::from_parts(Some("   ".into()), vec![]), None);
    }

    #[test]
    fn test_source_codes_are_stable() {
        assert_eq!(SourceId::Lrclib.code(), 1);
        assert_eq!(SourceId::Captions.code(), 2);
        assert_eq!(SourceId::PetitLyrics.code(), 3);
        assert_eq!(SourceId::from_code(3), Some(SourceId::PetitLyrics));
        assert_eq!(SourceId::from_code(9), None);
    }

    #[test]
    fn test_status_for_payload() {
        assert_eq!(RegistrationStatus::for_payload(None), RegistrationStatus::NoLyrics);
        let cues = LyricsPayload::Cues(vec![Cue::new(0.0, "x")]);
        assert_eq!(RegistrationStatus::for_payload(Some(&cues)), RegistrationStatus::Synced);
        let plain = LyricsPayload::Plain("x".into());
        assert_eq!(RegistrationStatus::for_payload(Some(&plain)), RegistrationStatus::Plain);
    }

    #[test]
    fn test_video_info_artist_list() {
        let info: VideoInfo = serde_json::from_str(
            r#"{"id":"abc","title":"t","artist":["A", null, "B"],"chapters":null}"#,
        )
        .unwrap();
        assert_eq!(info.artist.unwrap().joined().as_deref(), Some("A, B"));
        assert!(info.chapters.is_none());
    }

    #[test]
    fn test_video_info_channel_fallback() {
        let info = VideoInfo {
            id: "x".into(),
            channel: Some("Chan".into()),
            ..Default::default()
        };
        assert_eq!(info.channel_name(), Some("Chan"));

        let blank_uploader = VideoInfo {
            uploader: Some("  ".into()),
            ..info.clone()
        };
        assert_eq!(blank_uploader.channel_name(), Some("Chan"));

        let nothing = VideoInfo {
            id: "x".into(),
            uploader: Some(String::new()),
            channel: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(nothing.channel_name(), None);
    }
}
