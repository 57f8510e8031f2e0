//! Dry run of lyrics resolution for a single video title: prints the inferred
//! metadata, which source answered and the body that would be stored.
//! Nothing is written anywhere.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use lyrics_registry::config::DEFAULT_USER_AGENT;
use lyrics_registry::lrc::serialize_payload;
use lyrics_registry::models::{RegistrationStatus, VideoInfo};
use lyrics_registry::normalize::{canon_music_meta, display_title_for};
use lyrics_registry::pipeline::Resolver;
use lyrics_registry::progress::format_duration;
use lyrics_registry::scoring::FUZZY_TITLE_CUTOFF;
use lyrics_registry::sources::{lrclib, petitlyrics, LrclibClient, PetitLyricsClient};

#[derive(Parser)]
#[command(name = "resolve-lyrics")]
#[command(about = "Show which lyrics would be registered for a video, without storing anything")]
struct Args {
    /// Video title as shown on the platform
    #[arg(long)]
    title: String,

    /// Uploader / channel name
    #[arg(long)]
    channel: Option<String>,

    /// File holding the video description
    #[arg(long)]
    description_file: Option<PathBuf>,

    #[arg(long, env = "LRCLIB_BASE_URL", default_value = lrclib::DEFAULT_BASE_URL)]
    lrclib_url: String,

    #[arg(long, env = "PETITLYRICS_BASE_URL", default_value = petitlyrics::DEFAULT_BASE_URL)]
    petitlyrics_url: String,

    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    user_agent: String,

    #[arg(long, default_value_t = FUZZY_TITLE_CUTOFF)]
    fuzzy_cutoff: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let description = match &args.description_file {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read description {:?}", path))?,
        ),
        None => None,
    };

    let info = VideoInfo {
        id: String::new(),
        title: Some(args.title.clone()),
        channel: args.channel.clone(),
        description,
        ..Default::default()
    };

    let (display, meta) = canon_music_meta(&info);
    println!("Title:   {}", display_title_for(&info));
    println!("Artist:  {}", meta.artist.as_deref().unwrap_or("-"));
    println!("Track:   {}", meta.track.as_deref().unwrap_or("-"));
    if let Some(display) = &display {
        println!("Display: {}", display);
    }

    let lrclib = LrclibClient::new(&args.lrclib_url, &args.user_agent, lrclib::DEFAULT_TIMEOUT)
        .context("Failed to build LRCLIB client")?;
    let petitlyrics = PetitLyricsClient::new(
        &args.petitlyrics_url,
        &args.user_agent,
        petitlyrics::DEFAULT_TIMEOUT,
    )
    .context("Failed to build PetitLyrics client")?;
    let resolver = Resolver::new(&lrclib, &petitlyrics).with_fuzzy_cutoff(args.fuzzy_cutoff);

    let start = Instant::now();
    let result = resolver.resolve(&meta, &args.title);
    let payload = result.as_ref().map(|r| &r.payload);

    println!("\n{:=<60}", "");
    match &result {
        Some(found) => println!("Source:  {}", found.source.label()),
        None => println!("Source:  none"),
    }
    println!("Status:  {}", RegistrationStatus::for_payload(payload).label());
    println!("Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    if let Some(payload) = payload {
        println!("{}", serialize_payload(payload));
    }
    Ok(())
}
