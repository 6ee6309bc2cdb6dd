use crate::error::QaResult;
use crate::hit::{Extraction, SearchHit, Token};

/// Tokenizes, tags and dependency-parses a question.
pub trait QuestionAnalyzer: Send + Sync {
    fn analyze(&self, question: &str) -> QaResult<Vec<Token>>;
}

/// Runs a web search. Hits come back in ranked order with `rank` set.
pub trait WebSearch: Send + Sync {
    fn search(&self, query: &str) -> QaResult<Vec<SearchHit>>;
}

/// Highlights the answer to `question` inside `context`.
pub trait AnswerExtractor: Send + Sync {
    fn extract(&self, question: &str, context: &str) -> QaResult<Extraction>;
}
