//! Token-set similarity shared by the query cache and the within-run tool
//! cache: lowercase, strip punctuation (underscores survive, they are
//! identifier glue), split on whitespace, Jaccard over the sets.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]").expect("punctuation pattern compiles"));

pub fn normalize_tokens(text: &str) -> BTreeSet<String> {
    let lowered = text.to_lowercase();
    PUNCTUATION
        .replace_all(&lowered, " ")
        .split_whitespace()
        .map(str::to_owned)
        .collect()
}

pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

pub fn prompt_similarity(a: &str, b: &str) -> f64 {
    jaccard(&normalize_tokens(a), &normalize_tokens(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_and_punctuation_are_ignored() {
        let similarity = prompt_similarity("how does X work", "How Does X WORK");
        assert!(similarity >= 0.8);
        assert!((similarity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn underscores_keep_identifiers_whole() {
        let tokens = normalize_tokens("why does handle_hmr_update re-run?");
        assert!(tokens.contains("handle_hmr_update"));
        assert!(tokens.contains("re"));
        assert!(tokens.contains("run"));
    }

    #[test]
    fn unrelated_prompts_score_low() {
        let similarity = prompt_similarity(
            "how does the module graph handle cycles",
            "where is the websocket server started",
        );
        assert!(similarity < 0.8);
    }
}
