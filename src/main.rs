// SYNOID Scenes Main Entry Point
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use synoid_scenes::agent::clip_catalog::{ClipCatalog, UsedClipSet, UsedClipStore};
use synoid_scenes::agent::relevance_ranker::KeywordRelevanceRanker;
use synoid_scenes::agent::scene_composer::missing_media_tools;
use synoid_scenes::agent::scene_run::SceneGenerationRun;
use synoid_scenes::agent::tables;
use synoid_scenes::agent::video_stitcher::VideoStitcher;
use synoid_scenes::config::SceneConfig;
use synoid_scenes::error::SceneError;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "synoid-scenes")]
#[command(about = "SYNOID Scene Assembly", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every subcommand that reads the tables.
#[derive(Args)]
struct TableArgs {
    /// Scene config JSON (defaults to scene_config.json if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Clip table CSV
    #[arg(long)]
    clips: Option<PathBuf>,

    /// Narration table CSV
    #[arg(long)]
    narration: Option<PathBuf>,

    /// Persisted used-clip store
    #[arg(long)]
    used_store: Option<PathBuf>,

    /// Seed for the no-signal shuffle
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Select clips for every narration segment and render one scene per segment
    Generate {
        #[command(flatten)]
        tables: TableArgs,

        /// Folder for rendered scenes
        #[arg(long)]
        scenes_dir: Option<PathBuf>,

        /// Skip segments whose scene file already exists
        #[arg(long)]
        skip_existing: bool,

        /// Oracle model name
        #[arg(long)]
        model: Option<String>,

        /// OpenAI-compatible API base URL
        #[arg(long)]
        api_url: Option<String>,

        /// Max seconds a single clip contributes to a scene
        #[arg(long)]
        clip_cap: Option<f64>,

        /// Extra seconds of footage beyond the narration length
        #[arg(long)]
        margin: Option<f64>,
    },

    /// Join rendered scenes into the final video
    Combine {
        /// Scene config JSON
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output file name (".mp4" appended when missing)
        #[arg(short, long)]
        name: Option<String>,

        /// Folder holding the rendered scenes
        #[arg(long)]
        scenes_dir: Option<PathBuf>,

        /// Folder for the combined video
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Show the keyword ranking for one segment without calling the oracle
    Rank {
        #[command(flatten)]
        tables: TableArgs,

        /// Narration segment id
        #[arg(short, long)]
        segment: String,

        /// Number of candidates to print
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Check that ffmpeg and ffprobe are available
    Check,
}

impl TableArgs {
    fn load_config(&self) -> SceneConfig {
        let mut config = SceneConfig::load(self.config.as_deref());
        if let Some(clips) = &self.clips {
            config.clips_table = clips.clone();
        }
        if let Some(narration) = &self.narration {
            config.narration_table = narration.clone();
        }
        if let Some(store) = &self.used_store {
            config.used_clips_store = store.clone();
        }
        if self.seed.is_some() {
            config.shuffle_seed = self.seed;
        }
        config
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    info!("--- SYNOID SCENES v{} ---", env!("CARGO_PKG_VERSION"));

    let args = Cli::parse();
    let code = match run(args.command).await {
        Ok(code) => code,
        Err(e) => {
            error!("❌ {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

async fn run(command: Commands) -> anyhow::Result<i32> {
    match command {
        Commands::Generate {
            tables,
            scenes_dir,
            skip_existing,
            model,
            api_url,
            clip_cap,
            margin,
        } => {
            let mut config = tables.load_config();
            if let Some(dir) = scenes_dir {
                config.scenes_dir = dir;
            }
            if skip_existing {
                config.skip_existing = true;
            }
            if let Some(model) = model {
                config.model = model;
            }
            if let Some(url) = api_url {
                config.api_url = url;
            }
            if let Some(cap) = clip_cap {
                config.per_clip_cap_secs = cap;
            }
            if let Some(margin) = margin {
                config.safety_margin_secs = margin;
            }

            require_media_tools().await?;

            match config.masked_api_key() {
                Some(masked) => info!("🔑 Oracle key: {}", masked),
                None => warn!("⚠️ OPENAI_API_KEY is not set. Oracle calls will fail and segments will get no clips."),
            }
            info!("[RUN] Oracle: {} @ {}", config.model, config.api_url);

            let run = SceneGenerationRun::from_config(config);
            let summary = run.execute().await?;
            println!("{}", summary);
            for outcome in summary.outcomes.iter().filter(|o| !o.succeeded()) {
                println!("   ❌ {}: {:?}", outcome.segment_id, outcome.status);
            }
            Ok(summary.exit_code())
        }
        Commands::Combine {
            config,
            name,
            scenes_dir,
            output_dir,
        } => {
            let config = SceneConfig::load(config.as_deref());
            let scenes_dir = scenes_dir.unwrap_or(config.scenes_dir);
            let output_dir = output_dir.unwrap_or(config.output_dir);

            require_media_tools().await?;

            let output = VideoStitcher::combine(&scenes_dir, &output_dir, name.as_deref()).await?;
            println!("🎬 Combined video saved: {:?}", output);
            Ok(0)
        }
        Commands::Rank { tables, segment, limit } => {
            let config = tables.load_config();
            config.validate()?;

            let clips = tables::load_clips(&config.clips_table)?;
            let segments = tables::load_narration(&config.narration_table)?;
            let previous = UsedClipStore::new(&config.used_clips_store)
                .load()
                .map_err(SceneError::Store)?;
            let catalog = ClipCatalog::with_used(clips, UsedClipSet::from_previous(previous))?;

            let segment = segments
                .iter()
                .find(|s| s.id == segment)
                .with_context(|| format!("No narration segment with id {:?}", segment))?;
            let text = segment.read_transcript().await?;

            let ranker = KeywordRelevanceRanker::new(config.max_pool_size, config.shuffle_seed);
            let pool = catalog.unused();
            let ranked = ranker.rank(&text, &pool);

            println!(
                "🔎 Segment {} ({:.2}s): {} unused clips, {} ranked",
                segment.id,
                segment.target_duration_secs,
                pool.len(),
                ranked.len()
            );
            for (i, r) in ranked.iter().take(limit).enumerate() {
                println!(
                    "{:>4}. {:<24} score {:>2}  {:>6.2}s  [{}]",
                    i + 1,
                    r.clip.id,
                    r.score,
                    r.clip.duration_secs,
                    r.clip.keywords
                );
            }
            Ok(0)
        }
        Commands::Check => {
            let missing = missing_media_tools().await;
            if missing.is_empty() {
                println!("✅ ffmpeg and ffprobe are available.");
                Ok(0)
            } else {
                println!("❌ Missing: {}", missing.join(", "));
                Ok(1)
            }
        }
    }
}

async fn require_media_tools() -> Result<(), SceneError> {
    let missing = missing_media_tools().await;
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SceneError::Config(format!(
            "required media tools not found on PATH: {}",
            missing.join(", ")
        )))
    }
}
