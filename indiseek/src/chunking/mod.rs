pub mod go;
pub mod javascript;
pub mod languages;
pub mod python;
pub mod rust_lang;
pub mod types;
pub mod typescript;
