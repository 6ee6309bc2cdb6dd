use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// SearchHit
// ---------------------------------------------------------------------------

/// One web search result. `rank` is its 0-based position in the result list
/// of the query variant that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub crawl_date: String,
    pub rank: usize,
}

impl SearchHit {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
        crawl_date: impl Into<String>,
        rank: usize,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
            crawl_date: crawl_date.into(),
            rank,
        }
    }
}

impl fmt::Display for SearchHit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} <{}>", self.rank, self.title, self.url)
    }
}

// ---------------------------------------------------------------------------
// AnswerCandidate
// ---------------------------------------------------------------------------

/// A search hit with the answer span the extraction model highlighted in it.
///
/// `start_offset..end_offset` are character offsets of `answer` inside
/// `retokenized_snippet`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerCandidate {
    #[serde(flatten)]
    pub hit: SearchHit,
    pub answer: String,
    pub confidence: f32,
    pub adjusted_confidence: f32,
    pub start_offset: usize,
    pub end_offset: usize,
    pub retokenized_snippet: String,
}

impl AnswerCandidate {
    pub fn url(&self) -> &str {
        &self.hit.url
    }
}

// ---------------------------------------------------------------------------
// Collaborator payloads
// ---------------------------------------------------------------------------

/// One analyzed question token: position, surface form, lemma, POS tag and
/// dependency attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: usize,
    pub wordform: String,
    pub lemma: String,
    pub tag: String,
    pub head: usize,
    pub relation: String,
}

impl Token {
    pub fn new(
        id: usize,
        wordform: impl Into<String>,
        lemma: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            id,
            wordform: wordform.into(),
            lemma: lemma.into(),
            tag: tag.into(),
            head: 0,
            relation: String::new(),
        }
    }
}

/// What the extraction model returned for one `(question, context)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub answer: String,
    pub confidence: f32,
    /// The context as the model tokenized it; the answer is located in this.
    pub context: String,
}

impl Extraction {
    /// The stand-in for a failed or timed-out extraction.
    pub fn empty(context: &str) -> Self {
        Self {
            answer: String::new(),
            confidence: 0.0,
            context: context.to_string(),
        }
    }
}
