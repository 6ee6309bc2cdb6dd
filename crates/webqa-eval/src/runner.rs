use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use webqa_core::{AnswerCandidate, QaResult};

use crate::ground_truth::GroundTruthExample;
use crate::metrics::{EvaluationAggregator, ExampleOutcome, MetricsReport};

/// Run every example's question through `answer` and score the results.
///
/// `pause` is slept between questions to stay under the live services' rate
/// limits; `on_outcome` sees each example as soon as it is scored. The first
/// error returned by `answer` stops the run.
pub fn evaluate<A, O>(
    examples: &[GroundTruthExample],
    pause: Duration,
    mut answer: A,
    mut on_outcome: O,
) -> QaResult<MetricsReport>
where
    A: FnMut(&str) -> QaResult<Vec<AnswerCandidate>>,
    O: FnMut(&GroundTruthExample, &ExampleOutcome),
{
    let mut aggregator = EvaluationAggregator::new();

    for (i, example) in examples.iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            thread::sleep(pause);
        }
        info!(question = %example.question, "running question {}/{}", i + 1, examples.len());
        let answers = answer(&example.question)?;
        let outcome = aggregator.add(example, &answers);
        debug!(?outcome, "scored example");
        on_outcome(example, &outcome);
    }

    Ok(aggregator.report())
}
