pub mod cache;
pub mod query_cache;
pub mod service;
pub mod similarity;
pub mod strategies;
pub mod tools;
pub mod types;
