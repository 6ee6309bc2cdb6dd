use serde::Serialize;

use webqa_core::normalize_text;

/// Longest run of consecutive words shared by both sequences, measured in
/// characters rather than words. Start pairs are tried in ascending
/// `(i, j)` order and only a strictly longer run replaces the current best.
pub fn longest_common_word_run<P, G>(predicted: &[P], ground_truth: &[G]) -> Vec<String>
where
    P: AsRef<str>,
    G: AsRef<str>,
{
    let mut best_start = 0;
    let mut best_words = 0;
    let mut best_chars = 0;

    for i in 0..predicted.len() {
        for j in 0..ground_truth.len() {
            let mut k = 0;
            let mut chars = 0;
            while i + k < predicted.len()
                && j + k < ground_truth.len()
                && predicted[i + k].as_ref() == ground_truth[j + k].as_ref()
            {
                chars += predicted[i + k].as_ref().chars().count();
                k += 1;
            }
            if chars > best_chars {
                best_start = i;
                best_words = k;
                best_chars = chars;
            }
        }
    }

    predicted[best_start..best_start + best_words]
        .iter()
        .map(|w| w.as_ref().to_string())
        .collect()
}

/// A predicted answer compared with one annotated answer, each as its
/// normalized words rejoined with single spaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpanOverlap {
    pub overlap: String,
    pub predicted: String,
    pub annotated: String,
}

impl SpanOverlap {
    pub fn between(predicted: &str, annotated: &str) -> Self {
        let predicted_words = normalize_text(predicted);
        let annotated_words = normalize_text(annotated);
        let run = longest_common_word_run(&predicted_words, &annotated_words);
        Self {
            overlap: run.join(" "),
            predicted: predicted_words.join(" "),
            annotated: annotated_words.join(" "),
        }
    }

    pub fn overlap_chars(&self) -> usize {
        self.overlap.chars().count()
    }

    pub fn predicted_chars(&self) -> usize {
        self.predicted.chars().count()
    }

    pub fn annotated_chars(&self) -> usize {
        self.annotated.chars().count()
    }

    pub fn is_exact(&self) -> bool {
        self.predicted == self.annotated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_run() {
        let run = longest_common_word_run(
            &["the", "quick", "brown", "fox"],
            &["a", "quick", "brown", "dog"],
        );
        assert_eq!(run, vec!["quick", "brown"]);
    }

    #[test]
    fn test_crossed_words_single_run() {
        let run = longest_common_word_run(&["x", "y"], &["y", "x"]);
        assert_eq!(run, vec!["x"]);
    }

    #[test]
    fn test_longest_by_characters_not_words() {
        let run = longest_common_word_run(
            &["aa", "bb", "cc", "spital"],
            &["aa", "bb", "cc", "zz", "spital"],
        );
        assert_eq!(run, vec!["aa", "bb", "cc"]);

        let run = longest_common_word_run(
            &["aa", "bb", "internare"],
            &["aa", "bb", "zz", "internare"],
        );
        assert_eq!(run, vec!["internare"]);
    }

    #[test]
    fn test_no_common_words() {
        let run = longest_common_word_run(&["alfa"], &["beta"]);
        assert!(run.is_empty());
        let empty: [&str; 0] = [];
        assert!(longest_common_word_run(&empty, &["beta"]).is_empty());
    }

    #[test]
    fn test_span_overlap_normalizes() {
        let span = SpanOverlap::between(
            "Purtați masca de protecție!",
            "masca de protectie",
        );
        assert_eq!(span.overlap, "masca protectie");
        assert_eq!(span.predicted, "purtati masca protectie");
        assert_eq!(span.annotated, "masca protectie");
        assert!(!span.is_exact());
        assert_eq!(span.overlap_chars(), 15);
    }
}
