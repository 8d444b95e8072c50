// SYNOID Scenes - Segment Allocator
// Copyright (c) 2026 Xing_The_Creator | SYNOID
//
// Fills one narration segment with clips. Each round re-reads the unused
// pool, ranks it, asks the oracle, and commits every accepted clip to the
// catalog on the spot. Rounds continue until the accumulated duration
// clears target + margin, the pool runs dry, or a round makes no progress.

use crate::agent::clip_catalog::{Clip, ClipCatalog};
use crate::agent::relevance_ranker::KeywordRelevanceRanker;
use crate::agent::semantic_matcher::{MatchRequest, SemanticMatcher};
use crate::agent::tables::NarrationSegment;
use crate::config::SceneConfig;
use std::collections::HashSet;
use tracing::{info, warn};

/// Rounds without a new clip before the loop gives up.
pub const NO_PROGRESS_LIMIT: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllocationPolicy {
    pub per_clip_cap_secs: f64,
    pub safety_margin_secs: f64,
    pub max_rounds: usize,
}

impl AllocationPolicy {
    pub fn from_config(config: &SceneConfig) -> Self {
        Self {
            per_clip_cap_secs: config.per_clip_cap_secs,
            safety_margin_secs: config.safety_margin_secs,
            max_rounds: config.max_rounds,
        }
    }

    /// Duration the allocator tries to cover for a segment.
    pub fn goal(&self, target_secs: f64) -> f64 {
        target_secs + self.safety_margin_secs
    }

    pub fn contribution(&self, clip: &Clip) -> f64 {
        clip.duration_secs.min(self.per_clip_cap_secs)
    }
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self::from_config(&SceneConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    PoolExhausted,
    NoProgress,
    RoundLimit,
}

/// Mutable bookkeeping threaded through the allocation rounds.
#[derive(Debug, Clone, Default)]
pub struct AllocationState {
    pub selected: Vec<Clip>,
    pub accumulated_secs: f64,
    pub no_progress_strikes: usize,
    pub rounds: usize,
}

impl AllocationState {
    pub fn goal_reached(&self, goal_secs: f64) -> bool {
        self.accumulated_secs >= goal_secs
    }

    /// Whether the loop must stop before starting another round.
    /// Pool exhaustion is checked separately since it depends on the catalog.
    pub fn stop_reason(&self, goal_secs: f64, max_rounds: usize) -> Option<StopReason> {
        if self.goal_reached(goal_secs) {
            Some(StopReason::TargetReached)
        } else if self.no_progress_strikes >= NO_PROGRESS_LIMIT {
            Some(StopReason::NoProgress)
        } else if self.rounds >= max_rounds {
            Some(StopReason::RoundLimit)
        } else {
            None
        }
    }

    fn push(&mut self, clip: Clip, contribution: f64) {
        self.accumulated_secs += contribution;
        self.selected.push(clip);
    }

    /// Record the outcome of one oracle round.
    fn finish_round(&mut self, added: usize) {
        self.rounds += 1;
        if added == 0 {
            self.no_progress_strikes += 1;
        } else {
            self.no_progress_strikes = 0;
        }
    }
}

/// Clips chosen for one segment, in screen order.
#[derive(Debug, Clone)]
pub struct SceneAllocation {
    pub selected: Vec<Clip>,
    pub accumulated_secs: f64,
    pub rounds: usize,
    pub stop_reason: StopReason,
}

impl SceneAllocation {
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn clip_ids(&self) -> Vec<&str> {
        self.selected.iter().map(|c| c.id.as_str()).collect()
    }
}

pub struct SegmentAllocator {
    ranker: KeywordRelevanceRanker,
    matcher: SemanticMatcher,
    policy: AllocationPolicy,
}

impl SegmentAllocator {
    pub fn new(ranker: KeywordRelevanceRanker, matcher: SemanticMatcher, policy: AllocationPolicy) -> Self {
        Self {
            ranker,
            matcher,
            policy,
        }
    }

    pub fn policy(&self) -> &AllocationPolicy {
        &self.policy
    }

    /// Allocate clips for `segment` whose narration reads `text`.
    /// Never fails; an empty or short allocation is the caller's to judge.
    pub async fn allocate(
        &self,
        catalog: &mut ClipCatalog,
        segment: &NarrationSegment,
        text: &str,
    ) -> SceneAllocation {
        let goal = self.policy.goal(segment.target_duration_secs);
        let mut state = AllocationState::default();

        info!(
            "[ALLOCATOR] Segment {}: covering {:.2}s (target {:.2}s + margin {:.2}s)",
            segment.id, goal, segment.target_duration_secs, self.policy.safety_margin_secs
        );

        let stop_reason = loop {
            if let Some(reason) = state.stop_reason(goal, self.policy.max_rounds) {
                break reason;
            }

            let pool = catalog.unused();
            if pool.is_empty() {
                info!("[ALLOCATOR] Segment {}: clip pool exhausted", segment.id);
                break StopReason::PoolExhausted;
            }
            let pool_ids: HashSet<String> = pool.iter().map(|c| c.id.clone()).collect();

            let ranked = self.ranker.rank(text, &pool);
            let proposed = self
                .matcher
                .select(&MatchRequest {
                    narration_text: text,
                    narration_keywords: segment.keywords.as_deref(),
                    target_duration_secs: goal - state.accumulated_secs,
                    candidates: &ranked,
                })
                .await;

            let mut added = 0;
            for id in &proposed {
                if state.goal_reached(goal) {
                    break;
                }
                if !pool_ids.contains(id) || catalog.is_used(id) {
                    continue;
                }
                let Some(clip) = catalog.get(id).cloned() else {
                    continue;
                };
                catalog.mark_used(id);
                let contribution = self.policy.contribution(&clip);
                state.push(clip, contribution);
                added += 1;
            }
            state.finish_round(added);

            if added == 0 {
                warn!(
                    "[ALLOCATOR] Segment {}: round {} produced no usable clips ({} proposed)",
                    segment.id,
                    state.rounds,
                    proposed.len()
                );
            } else {
                info!(
                    "[ALLOCATOR] Segment {}: round {} added {} clips, {:.2}s/{:.2}s",
                    segment.id, state.rounds, added, state.accumulated_secs, goal
                );
            }
        };

        info!(
            "[ALLOCATOR] Segment {}: {} clips, {:.2}s after {} rounds ({:?})",
            segment.id,
            state.selected.len(),
            state.accumulated_secs,
            state.rounds,
            stop_reason
        );

        SceneAllocation {
            selected: state.selected,
            accumulated_secs: state.accumulated_secs,
            rounds: state.rounds,
            stop_reason,
        }
    }
}
