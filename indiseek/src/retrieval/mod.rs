pub mod file;
pub mod hybrid;
pub mod map;
pub mod symbols;

use thiserror::Error;

use crate::db::StoreError;
use crate::lexical::LexicalError;
use crate::semantic::SemanticError;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("vector store error: {0}")]
    Semantic(#[from] SemanticError),

    #[error("lexical store error: {0}")]
    Lexical(#[from] LexicalError),

    #[error("embedding provider not configured")]
    NoEmbedder,

    #[error("llm client error: {0}")]
    Llm(#[from] llm_client::clients::types::LLMClientError),

    #[error("bad request: {0}")]
    BadRequest(String),
}
