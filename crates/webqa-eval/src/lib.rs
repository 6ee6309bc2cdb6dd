pub mod ground_truth;
pub mod metrics;
pub mod overlap;
pub mod runner;

pub use ground_truth::{
    parse_test_set, read_test_file, read_test_folder, AnnotatedDocument, Annotation,
    GroundTruthExample,
};
pub use metrics::{
    score_example, EvaluationAccumulator, EvaluationAggregator, ExampleOutcome, Metric,
    MetricsReport,
};
pub use overlap::{longest_common_word_run, SpanOverlap};
pub use runner::evaluate;
