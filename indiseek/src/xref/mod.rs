pub mod loader;

pub use loader::{load_index_file, XrefCounts, XrefError};
