use thiserror::Error;

use crate::db::chunks::NewChunk;
use crate::db::symbols::NewSymbol;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no parser registered for extension {0}")]
    UnsupportedExtension(String),

    #[error("tree-sitter could not parse {0}")]
    TreeSitterFailed(String),
}

/// Output of parsing one file: symbols with ranges plus the AST-scoped
/// chunks that feed embedding and BM25 indexing. Every parsed file yields
/// at least one chunk.
#[derive(Debug, Default)]
pub struct ParsedFile {
    pub language: Option<String>,
    pub symbols: Vec<NewSymbol>,
    pub chunks: Vec<NewChunk>,
}

/// The AST parser is an external collaborator behind this seam; the
/// tree-sitter implementation in `languages` is the in-process default.
pub trait SourceParser: Send + Sync {
    fn supports_extension(&self, extension: &str) -> bool;

    fn parse(&self, file_path: &str, content: &str) -> Result<ParsedFile, ParseError>;
}

pub fn token_estimate(content: &str) -> i64 {
    (content.len() / 4) as i64
}
