use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lyrics_registry::config::{token_from_env, AppConfig, CliConfig, StoreKind};
use lyrics_registry::error::{self, LyricsError};
use lyrics_registry::models::VideoInfo;
use lyrics_registry::pipeline::Resolver;
use lyrics_registry::progress::{self, BatchProgress};
use lyrics_registry::request::{
    comment_text, error_comment, parse_request_body, parse_video_info, LyricsRequest,
    RegisterOutcome, Registrar, Registration,
};
use lyrics_registry::safety::validate_identifier;
use lyrics_registry::sync::existing_lyrics;

#[derive(Parser)]
#[command(name = "lyrics-registry")]
#[command(about = "Find lyrics for songs on a video platform and register them in a document store")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ConfigArgs {
    /// Where lyrics documents are kept
    #[arg(long, global = true, value_enum, env = "LYRICS_STORE", default_value = "github")]
    store: StoreKind,

    /// GitHub token (falls back to GITHUB_TOKEN)
    #[arg(long, global = true, env = "LYRICS_GH_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    #[arg(long, global = true, env = "LYRICS_GH_API")]
    github_api: Option<String>,

    #[arg(long, global = true)]
    branch: Option<String>,

    #[arg(long, global = true, env = "LYRICS_SQLITE_PATH")]
    sqlite_path: Option<PathBuf>,

    #[arg(long, global = true, env = "LRCLIB_BASE_URL")]
    lrclib_url: Option<String>,

    #[arg(long, global = true, env = "PETITLYRICS_BASE_URL")]
    petitlyrics_url: Option<String>,

    #[arg(long, global = true)]
    user_agent: Option<String>,

    /// LRCLIB request timeout in seconds
    #[arg(long, global = true)]
    lrclib_timeout: Option<u64>,

    /// PetitLyrics request timeout in seconds
    #[arg(long, global = true)]
    petitlyrics_timeout: Option<u64>,

    /// Store request timeout in seconds
    #[arg(long, global = true)]
    store_timeout: Option<u64>,

    /// yt-dlp socket timeout in seconds
    #[arg(long, global = true)]
    search_timeout: Option<u64>,

    #[arg(long, global = true, env = "YT_DLP")]
    yt_dlp: Option<String>,

    /// Minimum fuzzy score (0-100) for PetitLyrics title matches
    #[arg(long, global = true)]
    fuzzy_cutoff: Option<f64>,
}

impl ConfigArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            store: self.store,
            github_token: self.github_token.clone().or_else(token_from_env),
            github_api_base: self.github_api.clone(),
            branch: self.branch.clone(),
            sqlite_path: self.sqlite_path.clone(),
            lrclib_base_url: self.lrclib_url.clone(),
            petitlyrics_base_url: self.petitlyrics_url.clone(),
            user_agent: self.user_agent.clone(),
            lrclib_timeout_sec: self.lrclib_timeout,
            petitlyrics_timeout_sec: self.petitlyrics_timeout,
            store_timeout_sec: self.store_timeout,
            video_search_timeout_sec: self.search_timeout,
            yt_dlp: self.yt_dlp.clone(),
            fuzzy_cutoff: self.fuzzy_cutoff,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Search for a song by artist and title, then register its lyrics
    Request {
        #[arg(long, requires = "title", conflicts_with = "body_file")]
        artist: Option<String>,

        #[arg(long, requires = "artist")]
        title: Option<String>,

        /// Two-line request body (artist, then title); "-" reads stdin
        #[arg(long)]
        body_file: Option<PathBuf>,
    },

    /// Register from a yt-dlp info JSON ("-" reads stdin)
    Info { path: PathBuf },

    /// Register every info record of a JSON-lines file
    Batch {
        path: PathBuf,

        #[arg(long, default_value = "0")]
        workers: usize,

        /// Hide the progress bar and log periodic progress lines instead
        #[arg(long)]
        log_only: bool,
    },

    /// Print the stored lyrics for an identifier
    Show { id: String },
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
    }
}

/// Print the comment for a finished registration; a failed save is an error exit.
fn report(outcome: error::Result<Registration>) -> Result<()> {
    match outcome {
        Ok(registration) => {
            println!("{}", comment_text(&registration));
            if registration.outcome == RegisterOutcome::Failed {
                bail!("Saving lyrics for {} failed", registration.id);
            }
            Ok(())
        }
        Err(e) => {
            println!("{}", error_comment(&e));
            Err(e).context("Registration failed")
        }
    }
}

fn run_batch(registrar: &Registrar, path: &Path, workers: usize) -> Result<()> {
    if workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    let text = read_input(path)?;
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    info!("Registering {} records from {:?}", lines.len(), path);

    let progress = BatchProgress::new(lines.len() as u64, "Registering");
    lines.par_iter().enumerate().for_each(|(n, line)| {
        let result = parse_video_info(line).and_then(|info: VideoInfo| registrar.register(&info));
        match result {
            Ok(registration) => progress.record(registration.outcome),
            Err(e) => {
                warn!("Line {}: {}", n + 1, e);
                progress.record_error();
            }
        }
    });

    let summary = progress.finish();
    println!("\n{:=<60}", "");
    println!("Batch complete!");
    println!("  Registered: {}", summary.registered);
    println!("  No lyrics: {}", summary.no_lyrics);
    println!("  Already present: {}", summary.already);
    println!("  Failed: {}", summary.failed);
    println!("  Errors: {}", summary.errors);
    println!("{:=<60}", "");

    if summary.has_failures() {
        bail!("{} of {} records were not registered", summary.failed + summary.errors, summary.total());
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Command::Batch { log_only: true, .. } = cli.command {
        progress::set_log_only(true);
    }

    let config = AppConfig::resolve(&cli.config.to_cli_config()).context("Invalid configuration")?;
    let store = config.open_store().context("Failed to open document store")?;

    let lrclib = config.lrclib_client().context("Failed to build LRCLIB client")?;
    let petitlyrics = config
        .petitlyrics_client()
        .context("Failed to build PetitLyrics client")?;
    let resolver = Resolver::new(&lrclib, &petitlyrics).with_fuzzy_cutoff(config.fuzzy_cutoff);
    let registrar = Registrar::new(store.as_ref(), resolver);

    match cli.command {
        Command::Request {
            artist,
            title,
            body_file,
        } => {
            let request = match (artist, title, body_file) {
                (Some(artist), Some(title), _) => Ok(LyricsRequest { artist, title }),
                (_, _, Some(path)) => parse_request_body(&read_input(&path)?),
                _ => bail!("Give --artist and --title, or --body-file"),
            };
            let request = match request {
                Ok(request) => request,
                Err(e) => {
                    println!("{}", error_comment(&e));
                    return Err(e).context("Malformed request");
                }
            };
            report(registrar.request(&config.video_search(), &request))
        }
        Command::Info { path } => {
            let text = read_input(&path)?;
            let info = match serde_json::from_str::<VideoInfo>(&text) {
                Ok(info) => info,
                Err(e) => {
                    let err = LyricsError::from(e);
                    println!("{}", error_comment(&err));
                    return Err(err).context("Invalid info JSON");
                }
            };
            report(registrar.register(&info))
        }
        Command::Batch { path, workers, .. } => run_batch(&registrar, &path, workers),
        Command::Show { id } => {
            validate_identifier(&id)?;
            match existing_lyrics(store.as_ref(), &id)? {
                Some(text) => {
                    println!("{}", text);
                    Ok(())
                }
                None => bail!("No lyrics stored for {}", id),
            }
        }
    }
}
