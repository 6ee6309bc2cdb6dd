//! Answer extraction over ranked search hits, with rank-decayed confidence
//! and an early cutoff that bounds calls to the extraction model.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collaborator::AnswerExtractor;
use crate::error::{QaError, QaResult};
use crate::hit::{AnswerCandidate, Extraction, SearchHit};

/// Rank at which the positional decay reaches zero.
const RANK_HORIZON: f32 = 10.0;

/// Tunables for confidence adjustment and early cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingPolicy {
    /// Adjusted confidence below which processing may stop.
    pub cutoff_threshold: f32,
    /// Candidates that must be accepted before the cutoff can trigger.
    pub min_candidates: usize,
    /// Clamp adjusted confidence at zero for hits ranked past the horizon.
    pub clamp_negative: bool,
}

impl Default for RankingPolicy {
    fn default() -> Self {
        Self {
            cutoff_threshold: 0.3,
            min_candidates: 4,
            clamp_negative: true,
        }
    }
}

impl RankingPolicy {
    /// `confidence * (10 - rank) / 10`, optionally floored at zero.
    pub fn adjust(&self, confidence: f32, rank: usize) -> f32 {
        let adjusted = confidence * (RANK_HORIZON - rank as f32) / RANK_HORIZON;
        if self.clamp_negative {
            adjusted.max(0.0)
        } else {
            adjusted
        }
    }

    fn should_stop(&self, adjusted: f32, accepted: usize) -> bool {
        adjusted < self.cutoff_threshold && accepted >= self.min_candidates
    }
}

/// Character offsets of `answer` inside `context`.
pub fn locate_answer(context: &str, answer: &str) -> QaResult<(usize, usize)> {
    if answer.is_empty() {
        return Err(QaError::AnswerNotLocatable(String::new()));
    }
    let byte_start = context
        .find(answer)
        .ok_or_else(|| QaError::AnswerNotLocatable(answer.to_string()))?;
    let start = context[..byte_start].chars().count();
    Ok((start, start + answer.chars().count()))
}

pub struct AnswerAggregator<'a> {
    extractor: &'a dyn AnswerExtractor,
    policy: RankingPolicy,
}

impl<'a> AnswerAggregator<'a> {
    pub fn new(extractor: &'a dyn AnswerExtractor, policy: RankingPolicy) -> Self {
        Self { extractor, policy }
    }

    pub fn policy(&self) -> &RankingPolicy {
        &self.policy
    }

    /// Extract an answer from each hit in order and return the accepted
    /// candidates, best adjusted confidence first.
    pub fn answer(&self, question: &str, hits: &[SearchHit]) -> Vec<AnswerCandidate> {
        let mut accepted: Vec<AnswerCandidate> = Vec::new();

        for hit in hits {
            let extraction = self.extract(question, hit);
            let adjusted = self.policy.adjust(extraction.confidence, hit.rank);

            if self.policy.should_stop(adjusted, accepted.len()) {
                debug!(
                    url = %hit.url,
                    adjusted,
                    accepted = accepted.len(),
                    "early cutoff, skipping remaining hits"
                );
                break;
            }

            match locate_answer(&extraction.context, &extraction.answer) {
                Ok((start_offset, end_offset)) => accepted.push(AnswerCandidate {
                    hit: hit.clone(),
                    answer: extraction.answer,
                    confidence: extraction.confidence,
                    adjusted_confidence: adjusted,
                    start_offset,
                    end_offset,
                    retokenized_snippet: extraction.context,
                }),
                Err(e) => debug!(url = %hit.url, "skipping hit: {e}"),
            }
        }

        accepted.sort_by(|a, b| b.adjusted_confidence.total_cmp(&a.adjusted_confidence));
        accepted
    }

    fn extract(&self, question: &str, hit: &SearchHit) -> Extraction {
        match self.extractor.extract(question, &hit.snippet) {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!(url = %hit.url, "extraction failed: {e}");
                Extraction::empty(&hit.snippet)
            }
        }
    }
}
