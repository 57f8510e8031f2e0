//! Registration requests: "artist / title" in, a stored lyrics document and a
//! user-facing comment out.

use serde_json::Value;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{LyricsError, Result};
use crate::models::{RegistrationStatus, VideoInfo};
use crate::normalize::{canon_music_meta, display_title_for};
use crate::pipeline::Resolver;
use crate::safety::validate_identifier;
use crate::store::DocumentStore;
use crate::sync::{display_description, existing_lyrics, sync, SyncOutcome};

pub const FORMAT_ERROR_MESSAGE: &str =
    "フォーマットは以下の2行で入力してください：\n```text\nアーティスト名\n曲名\n```";

pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(7);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LyricsRequest {
    pub artist: String,
    pub title: String,
}

/// First non-empty line is the artist, second the title.
pub fn parse_request_body(text: &str) -> Result<LyricsRequest> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    match (lines.next(), lines.next()) {
        (Some(artist), Some(title)) => Ok(LyricsRequest {
            artist: artist.to_string(),
            title: title.to_string(),
        }),
        _ => Err(LyricsError::Parse(FORMAT_ERROR_MESSAGE.to_string())),
    }
}

pub fn search_query(artist: &str, title: &str) -> String {
    format!("{} {} official audio", artist, title)
}

/// Finds the video a request refers to.
pub trait VideoSearch: Send + Sync {
    fn search(&self, artist: &str, title: &str) -> Result<VideoInfo>;
}

/// Parse `--dump-json` output: one JSON object per line, or a playlist
/// object whose `entries` hold the results. The first video wins.
pub fn parse_video_info(output: &str) -> Result<VideoInfo> {
    let Some(line) = output.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Err(LyricsError::NotFound("video search returned nothing".into()));
    };
    let mut value: Value = serde_json::from_str(line)?;
    let first_entry = value
        .get_mut("entries")
        .and_then(Value::as_array_mut)
        .filter(|entries| !entries.is_empty())
        .map(|entries| entries.swap_remove(0));
    if let Some(first) = first_entry {
        value = first;
    }
    let info: VideoInfo = serde_json::from_value(value)?;
    if info.id.trim().is_empty() {
        return Err(LyricsError::NotFound("video search returned no video id".into()));
    }
    Ok(info)
}

/// Video search through the `yt-dlp` executable.
pub struct YtDlpSearch {
    program: String,
    socket_timeout: Duration,
}

impl YtDlpSearch {
    pub fn new(program: &str, socket_timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            socket_timeout,
        }
    }
}

impl VideoSearch for YtDlpSearch {
    fn search(&self, artist: &str, title: &str) -> Result<VideoInfo> {
        let target = format!("ytsearch1:{}", search_query(artist, title));
        debug!("Running {} for {:?}", self.program, target);
        let output = Command::new(&self.program)
            .args(["--dump-json", "--skip-download", "--no-playlist", "--quiet", "--no-warnings"])
            .arg("--socket-timeout")
            .arg(self.socket_timeout.as_secs().to_string())
            .arg(&target)
            .output()
            .map_err(|e| LyricsError::Config(format!("cannot run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LyricsError::NotFound(format!(
                "video search failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }
        parse_video_info(&String::from_utf8_lossy(&output.stdout))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A document already existed and was left alone.
    Already,
    Registered,
    /// Nothing found; a "no lyrics" document was written.
    NoLyrics,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub id: String,
    pub outcome: RegisterOutcome,
    pub url: String,
}

pub struct Registrar<'a> {
    store: &'a dyn DocumentStore,
    resolver: Resolver<'a>,
}

impl<'a> Registrar<'a> {
    pub fn new(store: &'a dyn DocumentStore, resolver: Resolver<'a>) -> Self {
        Self { store, resolver }
    }

    /// Search for the requested song, then register it.
    pub fn request(&self, search: &dyn VideoSearch, request: &LyricsRequest) -> Result<Registration> {
        let info = search.search(&request.artist, &request.title)?;
        info!("Request {:?} / {:?} matched video {}", request.artist, request.title, info.id);
        self.register(&info)
    }

    /// Resolve and store lyrics for one video unless it already has a document.
    pub fn register(&self, info: &VideoInfo) -> Result<Registration> {
        let id = info.id.trim();
        validate_identifier(id)?;
        let url = self.store.container_url(id);
        let done = |outcome| Registration {
            id: id.to_string(),
            outcome,
            url: url.clone(),
        };

        match existing_lyrics(self.store, id) {
            Ok(Some(_)) => {
                info!("{} already has lyrics", id);
                return Ok(done(RegisterOutcome::Already));
            }
            Ok(None) => {}
            Err(e) => warn!("Could not check existing lyrics for {}: {}", id, e),
        }

        let (display, meta) = canon_music_meta(info);
        debug!("{}: inferred {:?}", id, meta);
        let raw_title = info.title.clone().or(display).unwrap_or_default();

        let result = self.resolver.resolve(&meta, &raw_title);
        let payload = result.as_ref().map(|r| &r.payload);
        let status = RegistrationStatus::for_payload(payload);
        let title = display_title_for(info);
        let description = display_description(&meta, info.title.as_deref(), &title);

        let outcome = sync(
            self.store,
            id,
            &title,
            status,
            payload,
            result.as_ref().map(|r| r.source),
            &description,
        )?;

        Ok(done(match outcome {
            SyncOutcome::Created if payload.is_some() => RegisterOutcome::Registered,
            SyncOutcome::Created => RegisterOutcome::NoLyrics,
            SyncOutcome::SkippedExisting => RegisterOutcome::Already,
            SyncOutcome::Failed => RegisterOutcome::Failed,
        }))
    }
}

/// User-facing message for a finished registration.
pub fn comment_text(registration: &Registration) -> String {
    let url = &registration.url;
    match registration.outcome {
        RegisterOutcome::Already => format!("この曲の歌詞は既に登録されています。\n{}", url),
        RegisterOutcome::Registered => format!("歌詞の登録に成功しました。\n{}", url),
        RegisterOutcome::NoLyrics => format!(
            "歌詞を見つけられなかったため、『歌詞の登録なし』として登録しました。\n{}",
            url
        ),
        RegisterOutcome::Failed => format!("歌詞の保存に失敗しました。\n{}", url),
    }
}

/// User-facing message for a request that could not be processed at all.
pub fn error_comment(err: &LyricsError) -> String {
    match err {
        LyricsError::Parse(msg) if msg == FORMAT_ERROR_MESSAGE => FORMAT_ERROR_MESSAGE.to_string(),
        other => format!("歌詞登録中にエラーが発生しました。\n```\n{}\n```", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceId;
    use crate::sources::{LrclibRecord, LyricDatabase, ScrapedLyricSite, SearchRow};
    use crate::store::{SqliteStore, PRIMARY_RECORD};

    struct Database(Vec<LrclibRecord>);

    impl LyricDatabase for Database {
        fn search(&self, _: &str, _: Option<&str>) -> Result<Vec<LrclibRecord>> {
            Ok(self.0.clone())
        }
    }

    struct NoSite;

    impl ScrapedLyricSite for NoSite {
        fn search(&self, _: &str) -> Result<Vec<SearchRow>> {
            Ok(Vec::new())
        }
        fn fetch_text_by_id(&self, _: u64) -> Result<Option<String>> {
            Ok(None)
        }
    }

    struct FixedSearch(VideoInfo);

    impl VideoSearch for FixedSearch {
        fn search(&self, _: &str, _: &str) -> Result<VideoInfo> {
            Ok(self.0.clone())
        }
    }

    fn lemon_record() -> LrclibRecord {
        LrclibRecord {
            track_name: "Lemon".into(),
            artist_name: Some("米津玄師".into()),
            synced_lyrics: Some("[00:01.00]夢ならば".into()),
            ..Default::default()
        }
    }

    fn lemon_video() -> VideoInfo {
        VideoInfo {
            id: "SX_ViT4Ra7k".into(),
            title: Some("米津玄師 - Lemon".into()),
            uploader: Some("米津玄師".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_request_body() {
        let req = parse_request_body("\n  米津玄師 \n\nLemon\nextra").unwrap();
        assert_eq!(req.artist, "米津玄師");
        assert_eq!(req.title, "Lemon");

        let err = parse_request_body("only one line").unwrap_err();
        assert_eq!(error_comment(&err), FORMAT_ERROR_MESSAGE);
    }

    #[test]
    fn test_search_query() {
        assert_eq!(search_query("YOASOBI", "夜に駆ける"), "YOASOBI 夜に駆ける official audio");
    }

    #[test]
    fn test_parse_video_info_variants() {
        let single = r#"{"id":"abc","title":"T","uploader":"U"}"#;
        assert_eq!(parse_video_info(single).unwrap().id, "abc");

        let playlist = r#"{"id":"search","entries":[{"id":"first"},{"id":"second"}]}"#;
        assert_eq!(parse_video_info(playlist).unwrap().id, "first");

        assert!(parse_video_info("").unwrap_err().is_not_found());
        assert!(parse_video_info(r#"{"id":""}"#).unwrap_err().is_not_found());
    }

    #[test]
    fn test_register_then_already() {
        let store = SqliteStore::open_in_memory().unwrap();
        let db = Database(vec![lemon_record()]);
        let registrar = Registrar::new(&store, Resolver::new(&db, &NoSite));
        let search = FixedSearch(lemon_video());
        let request = LyricsRequest { artist: "米津玄師".into(), title: "Lemon".into() };

        let first = registrar.request(&search, &request).unwrap();
        assert_eq!(first.outcome, RegisterOutcome::Registered);
        assert_eq!(first.id, "SX_ViT4Ra7k");

        let doc = store.read_record("SX_ViT4Ra7k", PRIMARY_RECORD).unwrap().unwrap();
        assert!(doc.content.starts_with("# 米津玄師 – Lemon\n"));
        assert!(doc.content.contains("```lrc\n[00:01.00] 夢ならば\n```"));
        let flag_name = SourceId::Lrclib.code().to_string();
        assert_eq!(store.read_record("SX_ViT4Ra7k", &flag_name).unwrap().unwrap().content, "1\n");
        let container = store.container("SX_ViT4Ra7k").unwrap().unwrap();
        assert_eq!(container.description.as_deref(), Some("米津玄師 – Lemon"));

        let second = registrar.request(&search, &request).unwrap();
        assert_eq!(second.outcome, RegisterOutcome::Already);
        assert!(comment_text(&second).starts_with("この曲の歌詞は既に登録されています。"));
    }

    #[test]
    fn test_register_without_lyrics() {
        let store = SqliteStore::open_in_memory().unwrap();
        let db = Database(Vec::new());
        let registrar = Registrar::new(&store, Resolver::new(&db, &NoSite));

        let reg = registrar.register(&lemon_video()).unwrap();
        assert_eq!(reg.outcome, RegisterOutcome::NoLyrics);
        assert!(comment_text(&reg).contains("『歌詞の登録なし』"));
        assert!(comment_text(&reg).ends_with(&reg.url));
        assert_eq!(store.list_records("SX_ViT4Ra7k").unwrap(), vec![PRIMARY_RECORD]);
    }

    #[test]
    fn test_register_rejects_unsafe_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let db = Database(vec![lemon_record()]);
        let registrar = Registrar::new(&store, Resolver::new(&db, &NoSite));
        let video = VideoInfo { id: "../x".into(), ..lemon_video() };
        assert!(matches!(registrar.register(&video), Err(LyricsError::Config(_))));
        assert!(store.container("../x").unwrap().is_none());
    }
}
