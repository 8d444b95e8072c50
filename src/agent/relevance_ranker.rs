// SYNOID Scenes - Keyword Relevance Ranker
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Cheap pre-filter in front of the semantic matcher. Scores each unused clip
// by how many of its tags occur in the narration text, then keeps the top
// slice so the oracle payload stays bounded.

use crate::agent::clip_catalog::Clip;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

/// A clip annotated with its keyword hit count.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedClip<'a> {
    pub clip: &'a Clip,
    pub score: usize,
}

pub struct KeywordRelevanceRanker {
    max_pool_size: usize,
    seed: Option<u64>,
}

impl KeywordRelevanceRanker {
    pub fn new(max_pool_size: usize, seed: Option<u64>) -> Self {
        Self { max_pool_size, seed }
    }

    /// Number of clip tags found as substrings of the lower-cased text.
    pub fn score(text_lower: &str, clip: &Clip) -> usize {
        clip.tokens
            .iter()
            .filter(|token| text_lower.contains(token.as_str()))
            .count()
    }

    /// Rank `pool` against `text`. Ties keep table order. If nothing scores,
    /// the pool is shuffled instead so the oracle doesn't keep seeing the
    /// same head of the table.
    pub fn rank<'a>(&self, text: &str, pool: &[&'a Clip]) -> Vec<RankedClip<'a>> {
        let text_lower = text.to_lowercase();

        let mut ranked: Vec<RankedClip<'a>> = pool
            .iter()
            .map(|&clip| RankedClip {
                clip,
                score: Self::score(&text_lower, clip),
            })
            .collect();

        if ranked.iter().all(|r| r.score == 0) {
            debug!("[RANKER] No keyword signal across {} clips, shuffling", ranked.len());
            let mut rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            ranked.shuffle(&mut rng);
        } else {
            // sort_by is stable
            ranked.sort_by(|a, b| b.score.cmp(&a.score));
        }

        ranked.truncate(self.max_pool_size);
        debug!(
            "[RANKER] Top candidates: {:?}",
            ranked.iter().take(5).map(|r| (&r.clip.id, r.score)).collect::<Vec<_>>()
        );
        ranked
    }
}
