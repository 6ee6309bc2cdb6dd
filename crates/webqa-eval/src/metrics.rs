//! Corpus-level QA metrics: MRR over the first retrieved annotated
//! document, exact match of the best overlapping answer, and character
//! precision/recall/F1 of that overlap.

use std::fmt;

use serde::Serialize;

use webqa_core::AnswerCandidate;

use crate::ground_truth::GroundTruthExample;
use crate::overlap::SpanOverlap;

// ---------------------------------------------------------------------------
// Metric
// ---------------------------------------------------------------------------

/// A ratio that may have had a zero denominator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Metric {
    Value(f64),
    Undefined,
}

impl Metric {
    pub fn ratio(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 {
            Self::Undefined
        } else {
            Self::Value(numerator / denominator)
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(v),
            Self::Undefined => None,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v:.5}"),
            Self::Undefined => write!(f, "undefined"),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-example scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExampleOutcome {
    Unanswerable,
    NotFound,
    Found {
        rank: usize,
        best: Option<SpanOverlap>,
    },
}

/// Score one example against the answers the system returned for it.
pub fn score_example(example: &GroundTruthExample, answers: &[AnswerCandidate]) -> ExampleOutcome {
    if example.is_unanswerable() {
        return ExampleOutcome::Unanswerable;
    }
    let documents = example.documents();

    let found = answers
        .iter()
        .position(|a| documents.iter().any(|d| d.url == a.url()));
    let Some(rank) = found else {
        return ExampleOutcome::NotFound;
    };

    let mut best: Option<SpanOverlap> = None;
    for candidate in answers {
        for doc in documents.iter().filter(|d| d.url == candidate.url()) {
            for annotated in &doc.answers {
                let span = SpanOverlap::between(&candidate.answer, annotated);
                let best_chars = best.as_ref().map_or(0, SpanOverlap::overlap_chars);
                if span.overlap_chars() > best_chars {
                    best = Some(span);
                }
            }
        }
    }

    ExampleOutcome::Found { rank, best }
}

// ---------------------------------------------------------------------------
// Accumulation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EvaluationAccumulator {
    pub reciprocal_rank_sum: f64,
    pub exact_match_count: usize,
    pub overlap_chars_sum: usize,
    pub predicted_chars_sum: usize,
    pub annotated_chars_sum: usize,
    pub example_count: usize,
    pub found_count: usize,
    pub unanswerable_count: usize,
}

impl EvaluationAccumulator {
    /// Unanswerable and not-found examples only count towards the example
    /// total, which still normalizes MRR and exact match.
    pub fn record(&mut self, outcome: &ExampleOutcome) {
        self.example_count += 1;
        match outcome {
            ExampleOutcome::Unanswerable => self.unanswerable_count += 1,
            ExampleOutcome::NotFound => {}
            ExampleOutcome::Found { rank, best } => {
                self.found_count += 1;
                self.reciprocal_rank_sum += 1.0 / (*rank as f64 + 1.0);
                if let Some(span) = best {
                    if span.is_exact() {
                        self.exact_match_count += 1;
                    }
                    self.overlap_chars_sum += span.overlap_chars();
                    self.predicted_chars_sum += span.predicted_chars();
                    self.annotated_chars_sum += span.annotated_chars();
                }
            }
        }
    }

    pub fn report(&self) -> MetricsReport {
        let examples = self.example_count as f64;
        let overlap = self.overlap_chars_sum as f64;
        let precision = Metric::ratio(overlap, self.predicted_chars_sum as f64);
        let recall = Metric::ratio(overlap, self.annotated_chars_sum as f64);
        let f1 = match (precision, recall) {
            (Metric::Value(p), Metric::Value(r)) => Metric::ratio(2.0 * p * r, p + r),
            _ => Metric::Undefined,
        };

        MetricsReport {
            examples: self.example_count,
            found: self.found_count,
            unanswerable: self.unanswerable_count,
            mrr: Metric::ratio(self.reciprocal_rank_sum, examples),
            exact_match: Metric::ratio(self.exact_match_count as f64, examples),
            precision,
            recall,
            f1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub examples: usize,
    pub found: usize,
    pub unanswerable: usize,
    pub mrr: Metric,
    pub exact_match: Metric,
    pub precision: Metric,
    pub recall: Metric,
    pub f1: Metric,
}

impl fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Examples    = {}", self.examples)?;
        writeln!(f, "Found       = {}", self.found)?;
        writeln!(f, "Unanswerable = {}", self.unanswerable)?;
        writeln!(f, "MRR         = {}", self.mrr)?;
        writeln!(f, "Exact       = {}", self.exact_match)?;
        writeln!(f, "P(overlap)  = {}", self.precision)?;
        writeln!(f, "R(overlap)  = {}", self.recall)?;
        write!(f, "F1(overlap) = {}", self.f1)
    }
}

/// Scores examples one at a time and keeps the running totals.
#[derive(Debug, Default)]
pub struct EvaluationAggregator {
    totals: EvaluationAccumulator,
}

impl EvaluationAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        example: &GroundTruthExample,
        answers: &[AnswerCandidate],
    ) -> ExampleOutcome {
        let outcome = score_example(example, answers);
        self.totals.record(&outcome);
        outcome
    }

    pub fn totals(&self) -> &EvaluationAccumulator {
        &self.totals
    }

    pub fn report(&self) -> MetricsReport {
        self.totals.report()
    }
}
