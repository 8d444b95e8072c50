// SYNOID Scenes - Scene Generation Run
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Init -> LoadTables -> [per segment: Allocate -> Compose -> Record]
//      -> Persist -> Summarize
//
// Segments run strictly one after another because the used-clip set is
// shared between them. Only configuration problems abort a run; anything
// that goes wrong inside a segment is logged and the next segment starts.

use crate::agent::clip_catalog::{ClipCatalog, UsedClipSet, UsedClipStore};
use crate::agent::relevance_ranker::KeywordRelevanceRanker;
use crate::agent::scene_composer::{SceneComposer, SceneRenderer};
use crate::agent::segment_allocator::{AllocationPolicy, SegmentAllocator};
use crate::agent::semantic_matcher::{ClipOracle, OpenAiOracle, SemanticMatcher};
use crate::agent::tables::{self, NarrationSegment};
use crate::config::SceneConfig;
use crate::error::SceneError;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum SegmentStatus {
    Rendered,
    /// Scene file was already on disk and `skip_existing` is set.
    Skipped,
    Failed { stage: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct SegmentOutcome {
    pub segment_id: String,
    pub scene_path: PathBuf,
    pub clip_ids: Vec<String>,
    pub accumulated_secs: f64,
    pub target_secs: f64,
    pub status: SegmentStatus,
}

impl SegmentOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, SegmentStatus::Rendered | SegmentStatus::Skipped)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub clips_consumed: usize,
    pub persisted: usize,
    pub outcomes: Vec<SegmentOutcome>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.processed - self.succeeded
    }

    /// 0 when everything succeeded, 2 when the run completed with failures.
    pub fn exit_code(&self) -> i32 {
        if self.failed() == 0 {
            0
        } else {
            2
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scenes: {} processed, {} succeeded ({} already present), {} failed; {} unique clips consumed",
            self.processed,
            self.succeeded,
            self.skipped,
            self.failed(),
            self.clips_consumed
        )
    }
}

pub struct SceneGenerationRun {
    config: SceneConfig,
    allocator: SegmentAllocator,
    renderer: Arc<dyn SceneRenderer>,
}

impl SceneGenerationRun {
    pub fn new(config: SceneConfig, oracle: Arc<dyn ClipOracle>, renderer: Arc<dyn SceneRenderer>) -> Self {
        let allocator = SegmentAllocator::new(
            KeywordRelevanceRanker::new(config.max_pool_size, config.shuffle_seed),
            SemanticMatcher::new(oracle),
            AllocationPolicy::from_config(&config),
        );
        Self {
            config,
            allocator,
            renderer,
        }
    }

    /// Production wiring: OpenAI-compatible oracle and the ffmpeg composer.
    pub fn from_config(config: SceneConfig) -> Self {
        let oracle = Arc::new(OpenAiOracle::new(&config.api_url, &config.model, config.api_key.clone()));
        let renderer = Arc::new(SceneComposer::from_config(&config));
        Self::new(config, oracle, renderer)
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub async fn execute(&self) -> Result<RunSummary, SceneError> {
        self.config.validate()?;

        // LoadTables
        let clips = tables::load_clips(&self.config.clips_table)?;
        let segments = tables::load_narration(&self.config.narration_table)?;

        let store = UsedClipStore::new(&self.config.used_clips_store);
        let previous = store.load().map_err(SceneError::Store)?;
        let mut catalog = ClipCatalog::with_used(clips, UsedClipSet::from_previous(previous))?;

        std::fs::create_dir_all(&self.config.scenes_dir).map_err(|e| {
            SceneError::Config(format!("cannot create scenes dir {:?}: {}", self.config.scenes_dir, e))
        })?;

        info!(
            "[RUN] {} segments, {} clips ({} unused)",
            segments.len(),
            catalog.len(),
            catalog.unused().len()
        );

        // ForEachSegment
        let mut outcomes = Vec::with_capacity(segments.len());
        for segment in &segments {
            outcomes.push(self.process_segment(&mut catalog, segment).await);
        }

        // Persist
        let persisted = catalog.persist(&store).map_err(SceneError::Store)?;

        // Summarize
        let summary = RunSummary {
            processed: outcomes.len(),
            succeeded: outcomes.iter().filter(|o| o.succeeded()).count(),
            skipped: outcomes.iter().filter(|o| o.status == SegmentStatus::Skipped).count(),
            clips_consumed: catalog.used().added_this_run().len(),
            persisted,
            outcomes,
        };
        info!("[RUN] {}", summary);
        Ok(summary)
    }

    /// Allocate and compose a single segment. Never fails the run.
    pub async fn process_segment(&self, catalog: &mut ClipCatalog, segment: &NarrationSegment) -> SegmentOutcome {
        let scene_path = segment.scene_path(&self.config.scenes_dir);
        let mut outcome = SegmentOutcome {
            segment_id: segment.id.clone(),
            scene_path: scene_path.clone(),
            clip_ids: Vec::new(),
            accumulated_secs: 0.0,
            target_secs: segment.target_duration_secs,
            status: SegmentStatus::Rendered,
        };

        info!(
            "[RUN] Processing segment {} ({}) with target length {:.2}s",
            segment.id,
            segment.order_label(),
            segment.target_duration_secs
        );

        if self.config.skip_existing && scene_path.exists() {
            info!("[RUN] Segment {}: {:?} already exists, skipping", segment.id, scene_path);
            outcome.status = SegmentStatus::Skipped;
            return outcome;
        }

        let text = match segment.read_transcript().await {
            Ok(text) => text,
            Err(e) => return fail(outcome, SceneError::segment(&segment.id, "transcript", e)),
        };

        let allocation = self.allocator.allocate(catalog, segment, &text).await;
        outcome.clip_ids = allocation.clip_ids().into_iter().map(String::from).collect();
        outcome.accumulated_secs = allocation.accumulated_secs;

        if allocation.is_empty() {
            return fail(
                outcome,
                SceneError::segment(
                    &segment.id,
                    "allocate",
                    anyhow::anyhow!("no suitable unused clips found ({:?})", allocation.stop_reason),
                ),
            );
        }

        let goal = self.allocator.policy().goal(segment.target_duration_secs);
        if allocation.accumulated_secs < goal {
            warn!(
                "[RUN] Segment {}: under-allocated, {:.2}s of {:.2}s covered (short by {:.2}s)",
                segment.id,
                allocation.accumulated_secs,
                goal,
                goal - allocation.accumulated_secs
            );
        }

        match self
            .renderer
            .render(&allocation.selected, &segment.audio_file, &scene_path)
            .await
        {
            Ok(report) => {
                info!(
                    "[RUN] Segment {}: created {:?} from {} clips",
                    segment.id, report.output, report.clip_count
                );
                outcome
            }
            Err(e) => fail(outcome, SceneError::segment(&segment.id, "compose", e)),
        }
    }
}

fn fail(mut outcome: SegmentOutcome, err: SceneError) -> SegmentOutcome {
    match &err {
        SceneError::Segment { stage, source, .. } => {
            error!("[RUN] {}\n{:?}", err, source);
            outcome.status = SegmentStatus::Failed {
                stage: *stage,
                reason: format!("{:#}", source),
            };
        }
        other => {
            error!("[RUN] {}", other);
            outcome.status = SegmentStatus::Failed {
                stage: "unknown",
                reason: other.to_string(),
            };
        }
    }
    outcome
}
