//! Entity name matching helpers
//!
//! Free-form names ("Jos Buttler", "jos  buttler", "JOS-BUTTLER") are folded
//! into a stable key and a token set. Both are written into document text and
//! metadata so lexical variants of a name retrieve the same records.
//!
//! Everything here is pure and deterministic.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Anything that is not a Unicode word character.
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w]").expect("static regex is valid"));

/// Fold a name into a lowercase key with every non-word character removed.
///
/// ```
/// use askcorpus_lib::names::normalize_key;
///
/// assert_eq!(normalize_key("Jos Buttler"), "josbuttler");
/// assert_eq!(normalize_key("JOS-BUTTLER"), "josbuttler");
/// ```
#[must_use]
pub fn normalize_key(name: &str) -> String {
    NON_WORD.replace_all(&name.to_lowercase(), "").into_owned()
}

/// Lowercase whitespace-separated tokens of `name`, punctuation stripped,
/// plus the full [`normalize_key`] as one extra token.
#[must_use]
pub fn name_tokens(name: &str) -> BTreeSet<String> {
    let mut tokens: BTreeSet<String> = name
        .split_whitespace()
        .map(normalize_key)
        .filter(|t| !t.is_empty())
        .collect();

    let key = normalize_key(name);
    if !key.is_empty() {
        tokens.insert(key);
    }
    tokens
}

/// Space-joined [`name_tokens`], in sorted order.
#[must_use]
pub fn name_tokens_text(name: &str) -> String {
    name_tokens(name).into_iter().collect::<Vec<_>>().join(" ")
}
