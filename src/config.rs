//! Runtime configuration: CLI/env values resolved into `AppConfig`, plus
//! constructors for the clients and store it describes.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{LyricsError, Result};
use crate::request::{YtDlpSearch, DEFAULT_SOCKET_TIMEOUT};
use crate::scoring::FUZZY_TITLE_CUTOFF;
use crate::sources::{lrclib, petitlyrics, LrclibClient, PetitLyricsClient};
use crate::store::{github, DocumentStore, GithubStore, SqliteStore};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_SQLITE_PATH: &str = "lyrics-registry.sqlite3";
pub const DEFAULT_YT_DLP: &str = "yt-dlp";

/// Token variables in lookup order.
pub const TOKEN_ENV_VARS: [&str; 2] = ["LYRICS_GH_TOKEN", "GITHUB_TOKEN"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreKind {
    #[default]
    Github,
    Sqlite,
}

/// First non-empty token from the environment.
pub fn token_from_env() -> Option<String> {
    TOKEN_ENV_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|v| !v.trim().is_empty())
}

/// Values as given on the command line (or through env-backed flags).
/// `None` means "use the default".
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub store: StoreKind,
    pub github_token: Option<String>,
    pub github_api_base: Option<String>,
    pub branch: Option<String>,
    pub sqlite_path: Option<PathBuf>,
    pub lrclib_base_url: Option<String>,
    pub petitlyrics_base_url: Option<String>,
    pub user_agent: Option<String>,
    pub lrclib_timeout_sec: Option<u64>,
    pub petitlyrics_timeout_sec: Option<u64>,
    pub store_timeout_sec: Option<u64>,
    pub video_search_timeout_sec: Option<u64>,
    pub yt_dlp: Option<String>,
    pub fuzzy_cutoff: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreSettings {
    Github {
        token: String,
        api_base: String,
        branch: String,
        timeout: Duration,
    },
    Sqlite {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub store: StoreSettings,
    pub lrclib_base_url: String,
    pub petitlyrics_base_url: String,
    pub user_agent: String,
    pub lrclib_timeout: Duration,
    pub petitlyrics_timeout: Duration,
    pub video_search_timeout: Duration,
    pub yt_dlp: String,
    pub fuzzy_cutoff: f64,
}

fn timeout(value: Option<u64>, default: Duration, name: &str) -> Result<Duration> {
    match value {
        Some(0) => Err(LyricsError::Config(format!("{} must be at least 1 second", name))),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}

fn or_default(value: &Option<String>, default: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

impl AppConfig {
    pub fn resolve(cli: &CliConfig) -> Result<Self> {
        let store = match cli.store {
            StoreKind::Github => {
                let token = cli
                    .github_token
                    .clone()
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| {
                        LyricsError::Config(format!(
                            "{} or {} must be set for the GitHub store",
                            TOKEN_ENV_VARS[0], TOKEN_ENV_VARS[1]
                        ))
                    })?;
                StoreSettings::Github {
                    token,
                    api_base: or_default(&cli.github_api_base, github::DEFAULT_API_BASE),
                    branch: or_default(&cli.branch, DEFAULT_BRANCH),
                    timeout: timeout(cli.store_timeout_sec, github::DEFAULT_TIMEOUT, "store timeout")?,
                }
            }
            StoreKind::Sqlite => StoreSettings::Sqlite {
                path: cli
                    .sqlite_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SQLITE_PATH)),
            },
        };

        let fuzzy_cutoff = cli.fuzzy_cutoff.unwrap_or(FUZZY_TITLE_CUTOFF);
        if !(0.0..=100.0).contains(&fuzzy_cutoff) {
            return Err(LyricsError::Config(format!(
                "fuzzy cutoff {} is outside 0-100",
                fuzzy_cutoff
            )));
        }

        Ok(Self {
            store,
            lrclib_base_url: or_default(&cli.lrclib_base_url, lrclib::DEFAULT_BASE_URL),
            petitlyrics_base_url: or_default(&cli.petitlyrics_base_url, petitlyrics::DEFAULT_BASE_URL),
            user_agent: or_default(&cli.user_agent, DEFAULT_USER_AGENT),
            lrclib_timeout: timeout(cli.lrclib_timeout_sec, lrclib::DEFAULT_TIMEOUT, "LRCLIB timeout")?,
            petitlyrics_timeout: timeout(
                cli.petitlyrics_timeout_sec,
                petitlyrics::DEFAULT_TIMEOUT,
                "PetitLyrics timeout",
            )?,
            video_search_timeout: timeout(
                cli.video_search_timeout_sec,
                DEFAULT_SOCKET_TIMEOUT,
                "video search timeout",
            )?,
            yt_dlp: or_default(&cli.yt_dlp, DEFAULT_YT_DLP),
            fuzzy_cutoff,
        })
    }

    pub fn open_store(&self) -> Result<Box<dyn DocumentStore>> {
        match &self.store {
            StoreSettings::Github {
                token,
                api_base,
                branch,
                timeout,
            } => Ok(Box::new(GithubStore::connect(
                token,
                api_base,
                branch,
                &self.user_agent,
                *timeout,
            )?)),
            StoreSettings::Sqlite { path } => Ok(Box::new(SqliteStore::open(path)?)),
        }
    }

    pub fn lrclib_client(&self) -> Result<LrclibClient> {
        LrclibClient::new(&self.lrclib_base_url, &self.user_agent, self.lrclib_timeout)
    }

    pub fn petitlyrics_client(&self) -> Result<PetitLyricsClient> {
        PetitLyricsClient::new(&self.petitlyrics_base_url, &self.user_agent, self.petitlyrics_timeout)
    }

    pub fn video_search(&self) -> YtDlpSearch {
        YtDlpSearch::new(&self.yt_dlp, self.video_search_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_github_store_requires_token() {
        let err = AppConfig::resolve(&CliConfig::default()).unwrap_err();
        assert!(matches!(err, LyricsError::Config(_)));
        assert!(err.to_string().contains("LYRICS_GH_TOKEN"));

        let blank = CliConfig {
            github_token: Some("  ".into()),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&blank).is_err());
    }

    #[test]
    fn test_defaults() {
        let cli = CliConfig {
            github_token: Some("t".into()),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli).unwrap();
        assert_eq!(
            config.store,
            StoreSettings::Github {
                token: "t".into(),
                api_base: "https://api.github.com".into(),
                branch: "main".into(),
                timeout: Duration::from_secs(15),
            }
        );
        assert_eq!(config.lrclib_base_url, "https://lrclib.net");
        assert_eq!(config.petitlyrics_base_url, "https://petitlyrics.com");
        assert_eq!(config.user_agent, "Mozilla/5.0");
        assert_eq!(config.lrclib_timeout, Duration::from_secs(20));
        assert_eq!(config.petitlyrics_timeout, Duration::from_secs(10));
        assert_eq!(config.video_search_timeout, Duration::from_secs(7));
        assert_eq!(config.fuzzy_cutoff, 82.0);
    }

    #[test]
    fn test_sqlite_store_needs_no_token() {
        let cli = CliConfig {
            store: StoreKind::Sqlite,
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli).unwrap();
        assert_eq!(
            config.store,
            StoreSettings::Sqlite {
                path: PathBuf::from(DEFAULT_SQLITE_PATH)
            }
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        let zero_timeout = CliConfig {
            store: StoreKind::Sqlite,
            lrclib_timeout_sec: Some(0),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&zero_timeout).is_err());

        let bad_cutoff = CliConfig {
            store: StoreKind::Sqlite,
            fuzzy_cutoff: Some(120.0),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&bad_cutoff).is_err());
    }
}
