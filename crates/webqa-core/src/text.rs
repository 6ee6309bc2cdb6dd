//! Text normalization for Romanian queries and answer overlap.

/// Words this short carry no answer signal and are dropped before overlap.
const MIN_WORD_CHARS: usize = 4;

/// Replace Romanian diacritics with their base letters. Both the comma-below
/// and the legacy cedilla forms of s/t are handled.
pub fn remove_diacritics(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'ă' | 'â' => 'a',
            'Ă' | 'Â' => 'A',
            'î' => 'i',
            'Î' => 'I',
            'ș' | 'ş' => 's',
            'Ș' | 'Ş' => 'S',
            'ț' | 'ţ' => 't',
            'Ț' | 'Ţ' => 'T',
            other => other,
        })
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Prepare a word sequence for overlap comparison: strip diacritics and
/// surrounding punctuation, drop words of three characters or fewer and
/// lowercase the rest.
pub fn normalize_words<'a, I>(words: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    words
        .into_iter()
        .filter_map(|w| {
            let plain = remove_diacritics(w);
            let trimmed = plain.trim_matches(|c: char| !is_word_char(c));
            if trimmed.chars().count() >= MIN_WORD_CHARS {
                Some(trimmed.to_lowercase())
            } else {
                None
            }
        })
        .collect()
}

/// Whitespace-split and normalize a free-text answer.
pub fn normalize_text(text: &str) -> Vec<String> {
    normalize_words(text.split_whitespace())
}
