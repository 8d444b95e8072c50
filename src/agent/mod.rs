// SYNOID Agent Modules
// Copyright (c) 2026 Xing_The_Creator | SYNOID

pub mod clip_catalog;
pub mod relevance_ranker;
pub mod scene_composer;
pub mod scene_run;
pub mod segment_allocator;
pub mod semantic_matcher;
pub mod tables;
pub mod video_stitcher;
