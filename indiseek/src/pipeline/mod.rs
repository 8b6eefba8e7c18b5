pub mod embed;
pub mod lexical;
pub mod parse;
pub mod progress;
pub mod summarize;
pub mod xrefs;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::db::StoreError;
use crate::lexical::LexicalError;
use crate::semantic::SemanticError;
use crate::xref::XrefError;

/// Per-stage summary counters, rendered into the task result payload.
pub type StageCounts = BTreeMap<String, u64>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("vector store error: {0}")]
    Semantic(#[from] SemanticError),

    #[error("lexical store error: {0}")]
    Lexical(#[from] LexicalError),

    #[error("cross-reference error: {0}")]
    Xref(#[from] XrefError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("provider credentials rejected")]
    ProviderAuth,

    #[error("missing credential: {0}")]
    MissingKey(String),

    #[error("{0}")]
    Fatal(String),
}
