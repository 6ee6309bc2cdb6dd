//! HTTP adapters for the question analyzer, web search and answer
//! extraction services.
//!
//! The response parsers are plain functions over `serde_json::Value` so they
//! can be tested without a network.

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use webqa_core::{
    AnswerExtractor, Extraction, QaError, QaResult, QuestionAnalyzer, SearchHit, Token, WebSearch,
};

const ANALYZER: &str = "question analyzer";
const SEARCH: &str = "web search";
const EXTRACTOR: &str = "answer extractor";

fn agent(timeout_secs: u64) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Dependency-parsing client for the TEPROLIN text processing service.
pub struct TeprolinAnalyzer {
    agent: ureq::Agent,
    url: String,
    timeout_secs: u64,
}

impl TeprolinAnalyzer {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            agent: agent(timeout_secs),
            url: url.into(),
            timeout_secs,
        }
    }
}

impl QuestionAnalyzer for TeprolinAnalyzer {
    fn analyze(&self, question: &str) -> QaResult<Vec<Token>> {
        debug!(url = %self.url, "analyzing question");
        let body = self
            .agent
            .post(&self.url)
            .send_form(&[("text", question), ("exec", "dependency-parsing")])
            .map_err(|e| map_ureq_error(ANALYZER, e, self.timeout_secs))?
            .into_json::<Value>()
            .map_err(|e| map_body_error(ANALYZER, e, self.timeout_secs))?;
        parse_teprolin_tokens(&body)
    }
}

/// Tokens of the first sentence in a TEPROLIN response.
pub fn parse_teprolin_tokens(body: &Value) -> QaResult<Vec<Token>> {
    let sentence = body
        .pointer("/teprolin-result/tokenized/0")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(ANALYZER, "missing teprolin-result.tokenized[0]"))?;

    sentence
        .iter()
        .map(|t| {
            Ok(Token {
                id: number_field(t, "_id")
                    .ok_or_else(|| malformed(ANALYZER, "token without _id"))?,
                wordform: string_field(t, "_wordform"),
                lemma: string_field(t, "_lemma"),
                tag: string_field(t, "_ctg"),
                head: number_field(t, "_head").unwrap_or(0),
                relation: string_field(t, "_deprel"),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Bing Web Search v7 client.
pub struct BingSearch {
    agent: ureq::Agent,
    url: String,
    market: String,
    key: String,
    timeout_secs: u64,
}

impl BingSearch {
    pub fn new(
        url: impl Into<String>,
        market: impl Into<String>,
        key: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            agent: agent(timeout_secs),
            url: url.into(),
            market: market.into(),
            key: key.into(),
            timeout_secs,
        }
    }
}

impl WebSearch for BingSearch {
    fn search(&self, query: &str) -> QaResult<Vec<SearchHit>> {
        debug!(query, "live web search");
        let body = self
            .agent
            .get(&self.url)
            .query("q", query)
            .query("cc", &self.market)
            .set("Ocp-Apim-Subscription-Key", &self.key)
            .call()
            .map_err(|e| map_ureq_error(SEARCH, e, self.timeout_secs))?
            .into_json::<Value>()
            .map_err(|e| map_body_error(SEARCH, e, self.timeout_secs))?;
        Ok(parse_bing_hits(&body))
    }
}

/// Web page results in response order. A response without `webPages` has no
/// results.
pub fn parse_bing_hits(body: &Value) -> Vec<SearchHit> {
    body.pointer("/webPages/value")
        .and_then(Value::as_array)
        .map(|pages| {
            pages
                .iter()
                .enumerate()
                .map(|(rank, page)| {
                    SearchHit::new(
                        string_field(page, "name"),
                        string_field(page, "url"),
                        string_field(page, "snippet"),
                        string_field(page, "dateLastCrawled"),
                        rank,
                    )
                })
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Client for the extractive QA model server.
pub struct BertExtractor {
    agent: ureq::Agent,
    url: String,
    timeout_secs: u64,
}

impl BertExtractor {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            agent: agent(timeout_secs),
            url: url.into(),
            timeout_secs,
        }
    }
}

impl AnswerExtractor for BertExtractor {
    fn extract(&self, question: &str, context: &str) -> QaResult<Extraction> {
        let body = self
            .agent
            .post(&self.url)
            .send_json(json!({ "document": context, "question": question }))
            .map_err(|e| map_ureq_error(EXTRACTOR, e, self.timeout_secs))?
            .into_json::<Value>()
            .map_err(|e| map_body_error(EXTRACTOR, e, self.timeout_secs))?;
        Ok(parse_bert_result(&body, context))
    }
}

/// The answer span `document[start..=end]` and the retokenized document.
/// A missing or empty `result` means the model found no answer.
pub fn parse_bert_result(body: &Value, context: &str) -> Extraction {
    let Some(result) = body.get("result").filter(|r| r.is_object()) else {
        return Extraction::empty(context);
    };

    let tokens: Vec<&str> = result
        .get("document")
        .and_then(Value::as_array)
        .map(|doc| doc.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if tokens.is_empty() {
        return Extraction::empty(context);
    }

    let start = number_field(result, "start").unwrap_or(0);
    let end = number_field(result, "end")
        .unwrap_or(0)
        .min(tokens.len() - 1);
    let answer = if start <= end {
        tokens[start..=end].join(" ")
    } else {
        String::new()
    };

    Extraction {
        answer,
        confidence: result
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.0) as f32,
        context: tokens.join(" "),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn string_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Numbers may arrive as JSON numbers or numeric strings.
fn number_field(v: &Value, key: &str) -> Option<usize> {
    match v.get(key)? {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn malformed(service: &'static str, reason: &str) -> QaError {
    QaError::CollaboratorUnavailable {
        service,
        reason: format!("malformed response: {reason}"),
    }
}

/// Status errors are unavailability; transport errors caused by an I/O
/// timeout are timeouts.
pub fn map_ureq_error(service: &'static str, err: ureq::Error, timeout_secs: u64) -> QaError {
    match err {
        ureq::Error::Status(code, _) => QaError::CollaboratorUnavailable {
            service,
            reason: format!("HTTP {code}"),
        },
        ureq::Error::Transport(t) => {
            if is_timeout(&t) {
                QaError::CollaboratorTimeout {
                    service,
                    secs: timeout_secs,
                }
            } else {
                QaError::CollaboratorUnavailable {
                    service,
                    reason: t.to_string(),
                }
            }
        }
    }
}

fn map_body_error(service: &'static str, err: io::Error, timeout_secs: u64) -> QaError {
    if is_timeout_kind(err.kind()) {
        QaError::CollaboratorTimeout {
            service,
            secs: timeout_secs,
        }
    } else {
        malformed(service, &err.to_string())
    }
}

fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(e) = source {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if is_timeout_kind(io_err.kind()) {
                return true;
            }
        }
        source = e.source();
    }
    false
}

fn is_timeout_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}
