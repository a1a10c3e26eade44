//! Consensus voting across repeated extraction attempts
//!
//! The extractor is nondeterministic, so one answer proves nothing. The
//! voter asks it several times, normalizes each response, and accepts a
//! value only when two attempts agree exactly, falling back to the longest
//! survivor when they never do. Extractor failures of any kind are dropped
//! candidates, never errors: an item that produces nothing stays incomplete
//! and is retried on a later round.

use std::sync::Arc;

use crate::models::WorkItem;
use crate::services::extractor::Extractor;
use crate::services::validator::Normalizer;

/// How an accepted value earned acceptance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consensus {
    /// Both initial attempts agreed exactly
    Strong,
    /// Two of the collected attempts agreed exactly after a tie-break
    Weak,
    /// No two attempts agreed; the longest survivor was taken.
    /// A known approximation; these values are surfaced for manual review.
    LongestFallback,
}

impl Consensus {
    pub fn label(&self) -> &'static str {
        match self {
            Consensus::Strong => "strong",
            Consensus::Weak => "weak",
            Consensus::LongestFallback => "longest_fallback",
        }
    }
}

/// One accepted value with its provenance
#[derive(Debug, Clone)]
pub struct VoteOutcome {
    pub value: String,
    pub consensus: Consensus,
    /// Extractor calls spent on this item
    pub attempts: u32,
}

/// Runs the vote for one work item
pub struct ConsensusVoter {
    extractor: Arc<dyn Extractor>,
    normalizer: Normalizer,
    /// Initial attempts before any tie-break (default 2)
    initial_votes: u32,
}

impl ConsensusVoter {
    pub fn new(extractor: Arc<dyn Extractor>, normalizer: Normalizer, initial_votes: u32) -> Self {
        Self {
            extractor,
            normalizer,
            initial_votes: initial_votes.max(1),
        }
    }

    /// Vote one item to an accepted value, or `None` when no candidate
    /// survives. Never returns an error.
    pub async fn vote(
        &self,
        item: &WorkItem,
        image: &[u8],
        prompt: &str,
    ) -> Option<VoteOutcome> {
        let mut attempts = 0u32;
        let mut candidates: Vec<String> = Vec::new();

        for _ in 0..self.initial_votes {
            attempts += 1;
            if let Some(text) = self.attempt(item, image, prompt, attempts).await {
                candidates.push(text);
            }
        }

        // Nothing survived the initial round; the item stays incomplete
        if candidates.is_empty() {
            return None;
        }

        // Strong consensus: exactly two candidates, textually identical
        if candidates.len() == 2 && candidates[0] == candidates[1] {
            tracing::debug!(item = %item, attempts, "Strong consensus");
            return Some(VoteOutcome {
                value: candidates.swap_remove(0),
                consensus: Consensus::Strong,
                attempts,
            });
        }

        // Tie-break: one more attempt
        attempts += 1;
        if let Some(text) = self.attempt(item, image, prompt, attempts).await {
            candidates.push(text);
        }

        // Weak consensus: first pairwise exact match in collection order
        for i in 0..candidates.len() {
            for j in (i + 1)..candidates.len() {
                if candidates[i] == candidates[j] {
                    tracing::debug!(item = %item, attempts, "Weak consensus");
                    return Some(VoteOutcome {
                        value: candidates.swap_remove(i),
                        consensus: Consensus::Weak,
                        attempts,
                    });
                }
            }
        }

        // No two attempts ever agreed; take the longest survivor
        let longest = candidates
            .iter()
            .max_by_key(|c| c.chars().count())
            .cloned()?;

        let max_similarity = max_pairwise_similarity(&candidates);
        tracing::warn!(
            item = %item,
            candidates = candidates.len(),
            max_similarity,
            chosen_chars = longest.chars().count(),
            "No consensus; accepting longest candidate"
        );

        Some(VoteOutcome {
            value: longest,
            consensus: Consensus::LongestFallback,
            attempts,
        })
    }

    /// One extract + normalize attempt; any failure becomes a dropped
    /// candidate
    async fn attempt(
        &self,
        item: &WorkItem,
        image: &[u8],
        prompt: &str,
        attempt: u32,
    ) -> Option<String> {
        match self.extractor.extract(image, prompt).await {
            Ok(raw) => match self.normalizer.normalize(&raw) {
                Ok(text) => Some(text),
                Err(reason) => {
                    tracing::debug!(
                        item = %item,
                        attempt,
                        rule = reason.rule_name(),
                        "Candidate rejected"
                    );
                    None
                }
            },
            Err(e) => {
                tracing::warn!(
                    item = %item,
                    attempt,
                    extractor = self.extractor.name(),
                    error = %e,
                    "Extraction attempt failed"
                );
                None
            }
        }
    }
}

/// Highest normalized Levenshtein similarity among any candidate pair;
/// diagnostic for near-miss consensus
fn max_pairwise_similarity(candidates: &[String]) -> f64 {
    let mut max = 0.0f64;
    for i in 0..candidates.len() {
        for j in (i + 1)..candidates.len() {
            let similarity = strsim::normalized_levenshtein(&candidates[i], &candidates[j]);
            if similarity > max {
                max = similarity;
            }
        }
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionField;
    use crate::services::extractor::{ExtractError, RawCandidate};
    use crate::services::validator::DEFAULT_MIN_LENGTH;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    const TEXT_A: &str = "看图口算，从左到右依次作答";
    const TEXT_B: &str = "听算练习，每题限时五秒";
    const TEXT_C: &str = "连加连减，列竖式计算并写出完整过程";

    /// Replays a fixed sequence of extractor responses
    struct ScriptedExtractor {
        responses: Mutex<VecDeque<Result<RawCandidate, ExtractError>>>,
        calls: AtomicU32,
    }

    impl ScriptedExtractor {
        fn new(script: Vec<Result<RawCandidate, ExtractError>>) -> Self {
            Self {
                responses: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Extractor for ScriptedExtractor {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn extract(
            &self,
            _image: &[u8],
            _prompt: &str,
        ) -> Result<RawCandidate, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .await
                .pop_front()
                .expect("script exhausted")
        }
    }

    fn ok(text: &str) -> Result<RawCandidate, ExtractError> {
        Ok(RawCandidate {
            text: Some(text.to_string()),
            refused: false,
        })
    }

    fn refused() -> Result<RawCandidate, ExtractError> {
        Ok(RawCandidate {
            text: None,
            refused: true,
        })
    }

    fn voter(script: Vec<Result<RawCandidate, ExtractError>>) -> (ConsensusVoter, Arc<ScriptedExtractor>) {
        let extractor = Arc::new(ScriptedExtractor::new(script));
        let normalizer = Normalizer::new(ExtractionField::Description, DEFAULT_MIN_LENGTH);
        (
            ConsensusVoter::new(extractor.clone(), normalizer, 2),
            extractor,
        )
    }

    fn item() -> WorkItem {
        WorkItem::new(3, 1)
    }

    #[tokio::test]
    async fn test_strong_consensus_skips_tie_break() {
        // Given: two identical responses
        let (voter, extractor) = voter(vec![ok(TEXT_A), ok(TEXT_A)]);

        // When: the item is voted
        let outcome = voter.vote(&item(), b"img", "prompt").await.unwrap();

        // Then: the value is accepted without a third call
        assert_eq!(outcome.value, TEXT_A);
        assert_eq!(outcome.consensus, Consensus::Strong);
        assert_eq!(extractor.calls(), 2);
    }

    #[tokio::test]
    async fn test_tie_break_recovers_weak_consensus() {
        // A, B, then A on the tie-break must accept A
        let (voter, extractor) = voter(vec![ok(TEXT_A), ok(TEXT_B), ok(TEXT_A)]);

        let outcome = voter.vote(&item(), b"img", "prompt").await.unwrap();

        assert_eq!(outcome.value, TEXT_A);
        assert_eq!(outcome.consensus, Consensus::Weak);
        assert_eq!(extractor.calls(), 3);
    }

    #[tokio::test]
    async fn test_no_match_accepts_longest() {
        // A, B, C with no pairwise match must accept the longest
        let (voter, extractor) = voter(vec![ok(TEXT_A), ok(TEXT_B), ok(TEXT_C)]);

        let outcome = voter.vote(&item(), b"img", "prompt").await.unwrap();

        assert_eq!(outcome.value, TEXT_C);
        assert_eq!(outcome.consensus, Consensus::LongestFallback);
        assert_eq!(extractor.calls(), 3);
    }

    #[tokio::test]
    async fn test_all_refused_yields_no_value_without_tie_break() {
        let (voter, extractor) = voter(vec![refused(), refused()]);

        let outcome = voter.vote(&item(), b"img", "prompt").await;

        assert!(outcome.is_none());
        assert_eq!(extractor.calls(), 2);
    }

    #[tokio::test]
    async fn test_transport_failure_is_a_dropped_candidate() {
        // First attempt times out, second and tie-break agree
        let (voter, extractor) = voter(vec![
            Err(ExtractError::Network("timeout".to_string())),
            ok(TEXT_A),
            ok(TEXT_A),
        ]);

        let outcome = voter.vote(&item(), b"img", "prompt").await.unwrap();

        assert_eq!(outcome.value, TEXT_A);
        assert_eq!(outcome.consensus, Consensus::Weak);
        assert_eq!(extractor.calls(), 3);
    }

    #[tokio::test]
    async fn test_rejected_candidates_never_win_consensus() {
        // Two identical placeholder responses must not be accepted
        let placeholder = "按图示完成本页练习";
        let (voter, extractor) = voter(vec![ok(placeholder), ok(placeholder)]);

        let outcome = voter.vote(&item(), b"img", "prompt").await;

        assert!(outcome.is_none());
        assert_eq!(extractor.calls(), 2);
    }

    #[tokio::test]
    async fn test_single_survivor_is_accepted_via_fallback() {
        // One valid answer among refusals still converges the item
        let (voter, extractor) = voter(vec![refused(), ok(TEXT_A), refused()]);

        let outcome = voter.vote(&item(), b"img", "prompt").await.unwrap();

        assert_eq!(outcome.value, TEXT_A);
        assert_eq!(outcome.consensus, Consensus::LongestFallback);
        assert_eq!(extractor.calls(), 3);
    }
}
