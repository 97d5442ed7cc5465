//! Tokenizer and token-overlap relevance score.
//!
//! Rows are short structured records, so plain overlap counting is the only
//! relevance signal. The same tokenizer runs on questions and rows.

use std::collections::HashSet;

fn is_token_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '%' | '-' | '_' | '/')
}

/// Lowercase `text` and split it into runs of `[a-z0-9%-_/]` at least two
/// characters long. Everything else is a separator.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !is_token_char(c))
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_string())
        .collect()
}

/// Count the document tokens that also occur in the query.
///
/// Repeated document tokens count each time; repeated query tokens do not.
pub fn token_overlap_score(query: &str, doc: &str) -> usize {
    let query_tokens: HashSet<String> = tokenize(query).into_iter().collect();
    if query_tokens.is_empty() {
        return 0;
    }
    tokenize(doc)
        .iter()
        .filter(|t| query_tokens.contains(*t))
        .count()
}
