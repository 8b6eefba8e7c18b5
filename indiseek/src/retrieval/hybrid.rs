//! search_code: semantic, lexical, or both fused by reciprocal rank. The
//! fused score for a chunk is Σ 1/(k_rrf + rank_in_list); a chunk ranked by
//! both backends is marked `hybrid` and naturally floats to the top.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::application::application::Application;
use crate::db::chunks;
use crate::lexical::LexicalError;

use super::RetrievalError;

const PREVIEW_CHARS: usize = 240;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Semantic,
    Lexical,
    Hybrid,
}

impl SearchMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "semantic" => Some(SearchMode::Semantic),
            "lexical" => Some(SearchMode::Lexical),
            "hybrid" => Some(SearchMode::Hybrid),
            _ => None,
        }
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Semantic,
    Lexical,
    Hybrid,
}

#[derive(Serialize, Clone, Debug)]
pub struct SearchHit {
    pub chunk_id: i64,
    pub file_path: String,
    pub symbol_name: Option<String>,
    pub chunk_type: String,
    pub start_line: i64,
    pub end_line: i64,
    pub preview: String,
    pub match_type: MatchType,
    pub score: f64,
}

/// Ranked chunk ids from each backend, fused.
struct RankedIds {
    semantic: Option<Vec<i64>>,
    lexical: Option<Vec<i64>>,
}

pub(crate) fn rrf_score(rrf_k: u32, ranks: &[usize]) -> f64 {
    ranks
        .iter()
        .map(|rank| 1.0 / (rrf_k as f64 + *rank as f64))
        .sum()
}

fn fuse(ids: RankedIds, rrf_k: u32, k: usize) -> Vec<(i64, f64, MatchType)> {
    let mut ranks: HashMap<i64, Vec<usize>> = HashMap::new();
    let mut seen_in: HashMap<i64, (bool, bool)> = HashMap::new();

    if let Some(semantic) = &ids.semantic {
        for (index, chunk_id) in semantic.iter().enumerate() {
            ranks.entry(*chunk_id).or_default().push(index + 1);
            seen_in.entry(*chunk_id).or_default().0 = true;
        }
    }
    if let Some(lexical) = &ids.lexical {
        for (index, chunk_id) in lexical.iter().enumerate() {
            ranks.entry(*chunk_id).or_default().push(index + 1);
            seen_in.entry(*chunk_id).or_default().1 = true;
        }
    }

    let mut fused: Vec<(i64, f64, MatchType)> = ranks
        .into_iter()
        .map(|(chunk_id, rank_list)| {
            let score = rrf_score(rrf_k, &rank_list);
            let match_type = match seen_in.get(&chunk_id) {
                Some((true, true)) => MatchType::Hybrid,
                Some((true, false)) => MatchType::Semantic,
                _ => MatchType::Lexical,
            };
            (chunk_id, score, match_type)
        })
        .collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused.truncate(k);
    fused
}

async fn semantic_ids(
    app: &Application,
    repo_id: i64,
    query: &str,
    k: usize,
) -> Result<Vec<i64>, RetrievalError> {
    let embedder = app.config.embedder().ok_or(RetrievalError::NoEmbedder)?;
    let vectors = embedder.embed_batch(&[query.to_owned()]).await?;
    let vector = vectors
        .into_iter()
        .next()
        .ok_or_else(|| RetrievalError::BadRequest("empty embedding response".to_owned()))?;
    let hits = app.semantic.search(repo_id, &vector, k).await?;
    Ok(hits.into_iter().map(|hit| hit.chunk_id).collect())
}

fn lexical_ids(
    app: &Application,
    repo_id: i64,
    query: &str,
    k: usize,
) -> Result<Option<Vec<i64>>, RetrievalError> {
    match app.lexical.search(repo_id, query, k) {
        Ok(hits) => Ok(Some(hits.into_iter().map(|hit| hit.chunk_id).collect())),
        Err(LexicalError::Missing(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

pub async fn search_code(
    app: &Application,
    repo_id: i64,
    query: &str,
    mode: SearchMode,
    k: usize,
) -> Result<Vec<SearchHit>, RetrievalError> {
    let ranked = match mode {
        SearchMode::Semantic => RankedIds {
            semantic: Some(semantic_ids(app, repo_id, query, k).await?),
            lexical: None,
        },
        SearchMode::Lexical => RankedIds {
            semantic: None,
            lexical: lexical_ids(app, repo_id, query, k)?.or(Some(vec![])),
        },
        SearchMode::Hybrid => {
            // degrade to whichever backend is available
            let semantic = match semantic_ids(app, repo_id, query, k).await {
                Ok(ids) => Some(ids),
                Err(RetrievalError::NoEmbedder) => None,
                Err(err) => return Err(err),
            };
            let lexical = lexical_ids(app, repo_id, query, k)?;
            if semantic.is_none() && lexical.is_none() {
                return Ok(vec![]);
            }
            RankedIds { semantic, lexical }
        }
    };

    let fused = fuse(ranked, app.config.rrf_k, k);
    let ids: Vec<i64> = fused.iter().map(|(chunk_id, _, _)| *chunk_id).collect();
    let rows = chunks::by_ids(&app.sql, repo_id, &ids).await?;
    let by_id: HashMap<i64, _> = rows.into_iter().map(|chunk| (chunk.id, chunk)).collect();

    let mut hits = vec![];
    for (chunk_id, score, match_type) in fused {
        let Some(chunk) = by_id.get(&chunk_id) else {
            continue;
        };
        let mut preview = chunk.content.clone();
        if preview.len() > PREVIEW_CHARS {
            crate::strings::truncate_at_boundary(&mut preview, PREVIEW_CHARS);
            preview.push_str("...");
        }
        hits.push(SearchHit {
            chunk_id,
            file_path: chunk.file_path.clone(),
            symbol_name: chunk.symbol_name.clone(),
            chunk_type: chunk.chunk_type.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            preview,
            match_type,
            score,
        });
    }
    Ok(hits)
}

/// Plain-text rendering for the agent's tool result.
pub fn render_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No matches.".to_owned();
    }
    let mut out = String::new();
    for (index, hit) in hits.iter().enumerate() {
        out.push_str(&format!(
            "{}. {}:{}-{} [{}] {}{}\n   {}\n",
            index + 1,
            hit.file_path,
            hit.start_line,
            hit.end_line,
            match hit.match_type {
                MatchType::Semantic => "semantic",
                MatchType::Lexical => "lexical",
                MatchType::Hybrid => "hybrid",
            },
            hit.symbol_name.as_deref().unwrap_or("<no symbol>"),
            if hit.chunk_type.is_empty() {
                String::new()
            } else {
                format!(" ({})", hit.chunk_type)
            },
            hit.preview.replace('\n', " "),
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rrf_matches_the_spec_formula() {
        // rank 2 in lexical, rank 1 in semantic, k = 60
        let score = rrf_score(60, &[1, 2]);
        assert!((score - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-12);
    }

    #[test]
    fn chunks_in_both_lists_rank_hybrid_and_first() {
        let fused = fuse(
            RankedIds {
                semantic: Some(vec![10, 20, 30]),
                lexical: Some(vec![40, 20, 50]),
            },
            60,
            10,
        );
        let (top_id, top_score, top_type) = fused[0];
        assert_eq!(top_id, 20);
        assert_eq!(top_type, MatchType::Hybrid);
        assert!((top_score - (1.0 / 62.0 + 1.0 / 62.0)).abs() < 1e-12);

        let semantic_only = fused.iter().find(|(id, _, _)| *id == 10).unwrap();
        assert_eq!(semantic_only.2, MatchType::Semantic);
        let lexical_only = fused.iter().find(|(id, _, _)| *id == 40).unwrap();
        assert_eq!(lexical_only.2, MatchType::Lexical);
    }

    #[test]
    fn single_backend_fusion_keeps_list_order() {
        let fused = fuse(
            RankedIds {
                semantic: None,
                lexical: Some(vec![3, 1, 2]),
            },
            60,
            2,
        );
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].0, 3);
        assert_eq!(fused[1].0, 1);
    }
}
