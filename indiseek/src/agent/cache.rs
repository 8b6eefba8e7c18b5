//! Within-run memoization of tool calls. read_file repeats are exact-match;
//! search_code repeats match on near-identical queries so the model cannot
//! burn its budget re-phrasing the same search.

use std::collections::BTreeSet;
use std::collections::HashMap;

use super::similarity::{jaccard, normalize_tokens};

const SEARCH_SIMILARITY_THRESHOLD: f64 = 0.8;

struct CachedSearch {
    tokens: BTreeSet<String>,
    mode: String,
    result: String,
}

#[derive(Default)]
pub struct ToolCallCache {
    reads: HashMap<String, String>,
    searches: Vec<CachedSearch>,
}

impl ToolCallCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup_read(&self, args_key: &str) -> Option<&str> {
        self.reads.get(args_key).map(String::as_str)
    }

    pub fn store_read(&mut self, args_key: String, result: String) {
        self.reads.insert(args_key, result);
    }

    pub fn lookup_search(&self, query: &str, mode: &str) -> Option<&str> {
        let tokens = normalize_tokens(query);
        self.searches
            .iter()
            .filter(|cached| cached.mode == mode)
            .find(|cached| jaccard(&cached.tokens, &tokens) >= SEARCH_SIMILARITY_THRESHOLD)
            .map(|cached| cached.result.as_str())
    }

    pub fn store_search(&mut self, query: &str, mode: &str, result: String) {
        self.searches.push(CachedSearch {
            tokens: normalize_tokens(query),
            mode: mode.to_owned(),
            result,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn near_identical_searches_hit() {
        let mut cache = ToolCallCache::new();
        cache.store_search("module graph cycles", "hybrid", "result-a".to_owned());
        assert_eq!(
            cache.lookup_search("Module Graph cycles", "hybrid"),
            Some("result-a")
        );
        // different mode is a different call
        assert!(cache.lookup_search("module graph cycles", "lexical").is_none());
        // a genuinely different query misses
        assert!(cache
            .lookup_search("websocket reconnect backoff", "hybrid")
            .is_none());
    }

    #[test]
    fn reads_are_exact_match() {
        let mut cache = ToolCallCache::new();
        cache.store_read("src/a.ts:1:100".to_owned(), "body".to_owned());
        assert_eq!(cache.lookup_read("src/a.ts:1:100"), Some("body"));
        assert!(cache.lookup_read("src/a.ts:1:101").is_none());
    }
}
