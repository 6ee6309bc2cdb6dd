use crate::hit::Token;
use crate::text::remove_diacritics;

/// POS tags whose wordforms make it into the search query.
const CONTENT_TAGS: &[&str] = &["NOUN", "PROPN", "ADJ", "VERB"];

/// Verbs frequent enough in questions to be useless as search terms.
const FREQUENT_VERBS: &[&str] = &["fi", "avea", "putea"];

/// Build a web search query from an analyzed question: content words in
/// question order, joined by single spaces.
pub fn build_query(tokens: &[Token]) -> String {
    tokens
        .iter()
        .filter(|t| CONTENT_TAGS.contains(&t.tag.as_str()))
        .filter(|t| !(t.tag == "VERB" && FREQUENT_VERBS.contains(&t.lemma.as_str())))
        .map(|t| t.wordform.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The distinct query variants to search: the query as built, then its
/// diacritic-free form when that differs.
pub fn query_variants(query: &str, strip_diacritics: bool) -> Vec<String> {
    let mut variants = vec![query.to_string()];
    if strip_diacritics {
        let plain = remove_diacritics(query);
        if plain != query {
            variants.push(plain);
        }
    }
    variants
}
