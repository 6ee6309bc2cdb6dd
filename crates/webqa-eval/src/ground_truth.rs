//! Human-annotated test sets.
//!
//! A test file is a sequence of examples:
//!
//! ```text
//! <question>
//! <url>
//! <snippet with the answer(s) in [brackets]>
//! ...more url/snippet pairs...
//! <blank line>
//! ```
//!
//! An unanswerable question has `N/A` where the first URL would be, followed
//! by one ignored line.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use webqa_core::QaResult;

const UNANSWERABLE_MARKER: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotatedDocument {
    pub url: String,
    /// The snippet with annotation brackets removed.
    pub snippet: String,
    pub answers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Annotation {
    Documents(Vec<AnnotatedDocument>),
    Unanswerable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroundTruthExample {
    pub question: String,
    pub annotation: Annotation,
}

impl GroundTruthExample {
    pub fn is_unanswerable(&self) -> bool {
        matches!(self.annotation, Annotation::Unanswerable)
    }

    pub fn documents(&self) -> &[AnnotatedDocument] {
        match &self.annotation {
            Annotation::Documents(docs) => docs,
            Annotation::Unanswerable => &[],
        }
    }
}

/// Split an annotated snippet into its plain text and the bracketed answers,
/// in order of appearance. An unclosed `[` ends answer collection.
pub fn extract_bracketed(snippet: &str) -> (String, Vec<String>) {
    let mut answers = Vec::new();
    let mut rest = snippet;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else {
            break;
        };
        answers.push(after[..close].to_string());
        rest = &after[close + 1..];
    }
    let plain = snippet.replace(['[', ']'], "");
    (plain, answers)
}

/// Parse every example in a test file's contents. Parsing stops at the
/// first empty question line.
pub fn parse_test_set(content: &str) -> Vec<GroundTruthExample> {
    let mut lines = content.lines().map(str::trim);
    let mut examples = Vec::new();

    loop {
        let question = match lines.next() {
            Some(q) if !q.is_empty() => q,
            _ => break,
        };

        let mut documents = Vec::new();
        let mut url = lines.next().unwrap_or("");
        while url.starts_with("http") {
            let (snippet, answers) = extract_bracketed(lines.next().unwrap_or(""));
            documents.push(AnnotatedDocument {
                url: url.to_string(),
                snippet,
                answers,
            });
            url = lines.next().unwrap_or("");
        }

        let annotation = if url == UNANSWERABLE_MARKER {
            lines.next();
            Annotation::Unanswerable
        } else {
            Annotation::Documents(documents)
        };
        examples.push(GroundTruthExample {
            question: question.to_string(),
            annotation,
        });
    }

    examples
}

pub fn read_test_file(path: &Path) -> QaResult<Vec<GroundTruthExample>> {
    let content = fs::read_to_string(path)?;
    let examples = parse_test_set(&content);
    debug!(file = %path.display(), examples = examples.len(), "read test file");
    Ok(examples)
}

/// Read every `*.txt` test file in `dir`, in filename order.
pub fn read_test_folder(dir: &Path) -> QaResult<Vec<GroundTruthExample>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            files.push(path);
        }
    }
    files.sort();

    let mut examples = Vec::new();
    for file in &files {
        examples.extend(read_test_file(file)?);
    }
    Ok(examples)
}
