use tracing::{debug, info, warn};

use webqa_core::{dedupe, query_variants, QaResult, SearchHit, WebSearch};

use crate::cache::ResultCache;

/// Web search through the result cache, over every query variant.
pub struct CachedSearch<'a> {
    cache: &'a ResultCache,
    engine: &'a dyn WebSearch,
    strip_diacritics: bool,
}

impl<'a> CachedSearch<'a> {
    pub fn new(cache: &'a ResultCache, engine: &'a dyn WebSearch, strip_diacritics: bool) -> Self {
        Self {
            cache,
            engine,
            strip_diacritics,
        }
    }

    /// Hits for `query` and its diacritic-free variant, concatenated in
    /// variant order with duplicate URLs removed. A collaborator failure
    /// leaves that variant empty; any other error is returned.
    pub fn search(&self, query: &str) -> QaResult<Vec<SearchHit>> {
        let mut hits = Vec::new();
        for variant in query_variants(query, self.strip_diacritics) {
            hits.extend(self.search_variant(&variant)?);
        }
        Ok(dedupe(hits))
    }

    fn search_variant(&self, query: &str) -> QaResult<Vec<SearchHit>> {
        if let Some(hits) = self.cache.get(query) {
            debug!(query, hits = hits.len(), "cache hit");
            return Ok(hits);
        }

        info!(query, "querying web search");
        match self.engine.search(query) {
            Ok(hits) => {
                if let Err(e) = self.cache.put(query, hits.clone()) {
                    warn!(query, "cannot persist search results: {e}");
                }
                Ok(hits)
            }
            Err(e) if e.is_recoverable() => {
                warn!(query, "search failed: {e}");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}
