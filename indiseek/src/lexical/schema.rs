use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, INDEXED, STORED, STRING,
};

/// A schema for the per-repo BM25 index, one document per chunk. Paths and
/// symbol names stay raw; only the content field goes through the English
/// stemmer.
#[derive(Clone)]
pub struct ChunkSchema {
    pub schema: Schema,

    /// Relational chunk row this document mirrors
    pub chunk_id: Field,

    /// Path to the file, relative to the repo root
    pub file_path: Field,
    pub symbol_name: Field,
    pub chunk_type: Field,

    pub start_line: Field,
    pub end_line: Field,

    pub content: Field,
}

impl ChunkSchema {
    pub fn new() -> Self {
        let mut builder = tantivy::schema::SchemaBuilder::new();
        let stemmed = TextOptions::default().set_stored().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("en_stem")
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );

        let chunk_id = builder.add_i64_field("chunk_id", INDEXED | STORED);
        let file_path = builder.add_text_field("file_path", STRING | STORED);
        let symbol_name = builder.add_text_field("symbol_name", STRING | STORED);
        let chunk_type = builder.add_text_field("chunk_type", STRING | STORED);
        let start_line = builder.add_i64_field("start_line", STORED);
        let end_line = builder.add_i64_field("end_line", STORED);
        let content = builder.add_text_field("content", stemmed);

        Self {
            schema: builder.build(),
            chunk_id,
            file_path,
            symbol_name,
            chunk_type,
            start_line,
            end_line,
            content,
        }
    }
}

impl Default for ChunkSchema {
    fn default() -> Self {
        Self::new()
    }
}
