pub mod store;

pub use store::{SemanticError, VectorHit, VectorStore};
