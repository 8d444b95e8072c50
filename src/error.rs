// SYNOID Scenes - Error Taxonomy
// Copyright (c) 2026 Xing_The_Creator | SYNOID

use thiserror::Error;

/// Failures that surface from a scene generation run.
///
/// Only `Config` and `Store` stop a run. `Segment` is isolated to one narration
/// segment, and `Oracle` never leaves the semantic matcher.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("segment {segment_id} failed during {stage}: {source:#}")]
    Segment {
        segment_id: String,
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("oracle unavailable: {0}")]
    Oracle(String),

    #[error("used-clip store error: {0:#}")]
    Store(anyhow::Error),
}

impl SceneError {
    pub fn segment(segment_id: &str, stage: &'static str, source: anyhow::Error) -> Self {
        Self::Segment {
            segment_id: segment_id.to_string(),
            stage,
            source,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Store(_))
    }
}

/// Why an oracle reply could not be turned into clip ids.
#[derive(Debug, Error, PartialEq)]
pub enum MatchParseError {
    #[error("reply contains no bracketed array")]
    NoArray,

    #[error("array is not a JSON list of ids: {0}")]
    InvalidJson(String),
}
