use tracing::{debug, info, warn};

use webqa_cache::{CachedSearch, ResultCache};
use webqa_core::{
    build_query, AnswerAggregator, AnswerCandidate, AnswerExtractor, QaResult, QuestionAnalyzer,
    RankingPolicy, WebSearch,
};

/// One question through the whole chain: analysis, query building, cached
/// web search and ranked answer extraction.
pub struct QaSystem<'a> {
    analyzer: &'a dyn QuestionAnalyzer,
    search: CachedSearch<'a>,
    aggregator: AnswerAggregator<'a>,
}

impl<'a> QaSystem<'a> {
    pub fn new(
        analyzer: &'a dyn QuestionAnalyzer,
        engine: &'a dyn WebSearch,
        extractor: &'a dyn AnswerExtractor,
        cache: &'a ResultCache,
        policy: RankingPolicy,
        strip_diacritics: bool,
    ) -> Self {
        Self {
            analyzer,
            search: CachedSearch::new(cache, engine, strip_diacritics),
            aggregator: AnswerAggregator::new(extractor, policy),
        }
    }

    /// The search query for `question`, or `None` when analysis fails with a
    /// collaborator error or leaves no content words.
    pub fn query_for(&self, question: &str) -> QaResult<Option<String>> {
        let tokens = match self.analyzer.analyze(question) {
            Ok(tokens) => tokens,
            Err(e) if e.is_recoverable() => {
                warn!(question, "analysis failed: {e}");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let query = build_query(&tokens);
        if query.is_empty() {
            debug!(question, "no content words in question");
            Ok(None)
        } else {
            Ok(Some(query))
        }
    }

    /// Ranked answers, best first. Empty when nothing answerable was found.
    pub fn answer(&self, question: &str) -> QaResult<Vec<AnswerCandidate>> {
        let Some(query) = self.query_for(question)? else {
            return Ok(Vec::new());
        };
        let hits = self.search.search(&query)?;
        info!(query = %query, hits = hits.len(), "searched");
        Ok(self.aggregator.answer(question, &hits))
    }
}
