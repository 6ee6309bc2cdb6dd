pub mod answer;
pub mod collaborator;
pub mod dedup;
pub mod error;
pub mod hit;
pub mod query;
pub mod text;

pub use answer::{locate_answer, AnswerAggregator, RankingPolicy};
pub use collaborator::{AnswerExtractor, QuestionAnalyzer, WebSearch};
pub use dedup::dedupe;
pub use error::{QaError, QaResult};
pub use hit::{AnswerCandidate, Extraction, SearchHit, Token};
pub use query::{build_query, query_variants};
pub use text::{normalize_text, normalize_words, remove_diacritics};
