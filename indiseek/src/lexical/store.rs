//! Full rebuild is the only mutation: the index is written into a fresh
//! temp directory and renamed over the live one, so readers always see
//! either the old or the new complete index.

use std::fs;
use std::path::{Path, PathBuf};

use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::{doc, Index};
use thiserror::Error;
use tracing::debug;

use crate::db::chunks::Chunk;

use super::schema::ChunkSchema;

const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Debug, Error)]
pub enum LexicalError {
    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("index io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no lexical index for repo {0}")]
    Missing(i64),
}

#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub chunk_id: i64,
    pub file_path: String,
    pub symbol_name: Option<String>,
    pub chunk_type: String,
    pub start_line: i64,
    pub end_line: i64,
    pub score: f32,
}

pub struct LexicalStore {
    root: PathBuf,
    schema: ChunkSchema,
}

impl LexicalStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_owned(),
            schema: ChunkSchema::new(),
        }
    }

    pub fn index_dir(&self, repo_id: i64) -> PathBuf {
        self.root.join(format!("tantivy_{repo_id}"))
    }

    pub fn exists(&self, repo_id: i64) -> bool {
        self.index_dir(repo_id).join("meta.json").exists()
    }

    /// Rebuild from scratch and swap into place.
    pub fn build(&self, repo_id: i64, chunks: &[Chunk]) -> Result<usize, LexicalError> {
        let target = self.index_dir(repo_id);
        let tmp = self
            .root
            .join(format!("tantivy_{repo_id}.tmp-{}", uuid::Uuid::new_v4().simple()));
        fs::create_dir_all(&tmp)?;

        let index = Index::create_in_dir(&tmp, self.schema.schema.clone())?;
        let mut writer = index.writer(WRITER_HEAP_BYTES)?;
        for chunk in chunks {
            writer.add_document(doc!(
                self.schema.chunk_id => chunk.id,
                self.schema.file_path => chunk.file_path.as_str(),
                self.schema.symbol_name => chunk.symbol_name.as_deref().unwrap_or(""),
                self.schema.chunk_type => chunk.chunk_type.as_str(),
                self.schema.start_line => chunk.start_line,
                self.schema.end_line => chunk.end_line,
                self.schema.content => chunk.content.as_str(),
            ))?;
        }
        writer.commit()?;
        drop(writer);

        // swap: retire the live directory, move the fresh one in, clean up
        let retired = self
            .root
            .join(format!("tantivy_{repo_id}.old-{}", uuid::Uuid::new_v4().simple()));
        if target.exists() {
            fs::rename(&target, &retired)?;
        }
        fs::rename(&tmp, &target)?;
        if retired.exists() {
            let _ = fs::remove_dir_all(&retired);
        }

        debug!(repo_id, documents = chunks.len(), "lexical index rebuilt");
        Ok(chunks.len())
    }

    pub fn open(&self, repo_id: i64) -> Result<Index, LexicalError> {
        let dir = self.index_dir(repo_id);
        if !self.exists(repo_id) {
            return Err(LexicalError::Missing(repo_id));
        }
        Ok(Index::open_in_dir(dir)?)
    }

    pub fn search(
        &self,
        repo_id: i64,
        query: &str,
        k: usize,
    ) -> Result<Vec<LexicalHit>, LexicalError> {
        let index = self.open(repo_id)?;
        let reader = index.reader()?;
        let searcher = reader.searcher();

        let parser =
            QueryParser::for_index(&index, vec![self.schema.content, self.schema.symbol_name]);
        // user queries are natural language, drop unparsable operators
        let (parsed, _errors) = parser.parse_query_lenient(query);
        let top = searcher.search(&parsed, &TopDocs::with_limit(k))?;

        let mut hits = Vec::with_capacity(top.len());
        for (score, address) in top {
            let document = searcher.doc(address)?;
            let get_i64 = |field| {
                document
                    .get_first(field)
                    .and_then(|value| value.as_i64())
                    .unwrap_or(0)
            };
            let get_text = |field| {
                document
                    .get_first(field)
                    .and_then(|value| value.as_text())
                    .unwrap_or("")
                    .to_owned()
            };
            let symbol_name = {
                let raw = get_text(self.schema.symbol_name);
                if raw.is_empty() {
                    None
                } else {
                    Some(raw)
                }
            };
            hits.push(LexicalHit {
                chunk_id: get_i64(self.schema.chunk_id),
                file_path: get_text(self.schema.file_path),
                symbol_name,
                chunk_type: get_text(self.schema.chunk_type),
                start_line: get_i64(self.schema.start_line),
                end_line: get_i64(self.schema.end_line),
                score,
            });
        }
        Ok(hits)
    }

    pub fn remove(&self, repo_id: i64) -> Result<(), LexicalError> {
        let dir = self.index_dir(repo_id);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn doc_count(&self, repo_id: i64) -> Result<u64, LexicalError> {
        let index = self.open(repo_id)?;
        let reader = index.reader()?;
        Ok(reader.searcher().num_docs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(id: i64, file_path: &str, symbol: Option<&str>, content: &str) -> Chunk {
        Chunk {
            id,
            repo_id: 1,
            file_path: file_path.to_owned(),
            symbol_name: symbol.map(str::to_owned),
            chunk_type: "function".to_owned(),
            start_line: 1,
            end_line: 12,
            content: content.to_owned(),
            token_estimate: None,
        }
    }

    #[test]
    fn build_then_search_finds_stemmed_terms() {
        let dir = TempDir::new().unwrap();
        let store = LexicalStore::new(dir.path());
        store
            .build(
                1,
                &[
                    chunk(1, "src/hmr.ts", Some("handleHMRUpdate"), "propagating hmr updates"),
                    chunk(2, "src/css.ts", None, "css plugin transform"),
                ],
            )
            .unwrap();

        // "propagation" stems to the same root as "propagating"
        let hits = store.search(1, "propagation", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, 1);
        assert_eq!(hits[0].symbol_name.as_deref(), Some("handleHMRUpdate"));
    }

    #[test]
    fn rebuild_atomically_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let store = LexicalStore::new(dir.path());
        store
            .build(1, &[chunk(1, "a.ts", None, "alpha contents")])
            .unwrap();
        store
            .build(1, &[chunk(2, "b.ts", None, "beta contents")])
            .unwrap();

        assert!(store.search(1, "alpha", 10).unwrap().is_empty());
        assert_eq!(store.search(1, "beta", 10).unwrap().len(), 1);
        assert_eq!(store.doc_count(1).unwrap(), 1);
        // no temp or retired directories left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.contains(".tmp-") || name.contains(".old-")
            })
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn missing_index_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = LexicalStore::new(dir.path());
        assert!(matches!(
            store.search(99, "anything", 5).unwrap_err(),
            LexicalError::Missing(99)
        ));
    }
}
