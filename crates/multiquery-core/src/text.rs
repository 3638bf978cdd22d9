//! Whole-token text handling shared by the text predicates.
//!
//! Tokenization is deliberately simple and deterministic:
//! - A token is a maximal run of alphanumeric characters.
//! - Digits stay attached to adjacent letters (`1funny` is one token).
//! - Everything is case-folded.
//! - Separators are discarded; no stopwords, no stemming.

/// Shortest query token that `CONTAINS` keeps.
pub const MIN_QUERY_TOKEN_LEN: usize = 2;

/// Case-fold a string the same way tokens are folded.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Split `text` into case-folded alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
            continue;
        }
        if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Tokenize a `CONTAINS` query: tokens shorter than
/// [`MIN_QUERY_TOKEN_LEN`] characters are dropped.
pub fn tokenize_query(query: &str) -> Vec<String> {
    tokenize(query)
        .into_iter()
        .filter(|t| t.chars().count() >= MIN_QUERY_TOKEN_LEN)
        .collect()
}

/// Whether `c` can appear inside a token.
pub fn is_token_char(c: char) -> bool {
    c.is_alphanumeric()
}
