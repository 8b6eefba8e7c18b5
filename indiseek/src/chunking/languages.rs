//! Tree-sitter backed implementation of the parser seam. Each language
//! carries a small table of declaration node kinds; symbol extraction is a
//! scope-limited walk (we never descend into function bodies), and chunks
//! are cut along the top-level declaration boundaries.

use crate::db::chunks::NewChunk;
use crate::db::symbols::NewSymbol;

use super::go::go_language_config;
use super::javascript::javascript_language_config;
use super::python::python_language_config;
use super::rust_lang::rust_language_config;
use super::types::{token_estimate, ParseError, ParsedFile, SourceParser};
use super::typescript::{tsx_language_config, typescript_language_config};

/// Chunks longer than this get split on line boundaries; embedding inputs
/// degrade past a few thousand characters.
const MAX_CHUNK_CHARS: usize = 6000;
const SIGNATURE_MAX_CHARS: usize = 200;

#[derive(Clone)]
pub struct TSLanguageConfig {
    /// A list of language names that can be processed by this config,
    /// e.g.: ["Typescript", "TSX"], ["Rust"]
    pub language_ids: &'static [&'static str],

    /// Extensions that classify the file: rs, ts, py, etc
    pub file_extensions: &'static [&'static str],

    /// tree-sitter grammar for this language
    pub grammar: fn() -> tree_sitter::Language,

    /// node kind -> symbol kind for named declarations
    pub declaration_kinds: &'static [(&'static str, &'static str)],

    /// declaration kinds whose children nest further declarations
    pub container_kinds: &'static [&'static str],

    /// kinds re-labelled `method` when they appear inside a container
    pub method_kinds: &'static [&'static str],

    /// kinds we descend through without emitting anything
    pub transparent_kinds: &'static [&'static str],

    /// value kinds that promote a variable declarator to a function
    pub function_value_kinds: &'static [&'static str],
}

impl TSLanguageConfig {
    pub fn language_id(&self) -> &'static str {
        self.language_ids[0]
    }
}

#[derive(Clone)]
pub struct TSLanguageParsing {
    configs: Vec<TSLanguageConfig>,
}

impl TSLanguageParsing {
    pub fn init() -> Self {
        Self {
            configs: vec![
                typescript_language_config(),
                tsx_language_config(),
                javascript_language_config(),
                python_language_config(),
                rust_language_config(),
                go_language_config(),
            ],
        }
    }

    pub fn for_extension(&self, extension: &str) -> Option<&TSLanguageConfig> {
        self.configs
            .iter()
            .find(|config| config.file_extensions.contains(&extension))
    }

    pub fn supported_extensions(&self) -> Vec<&'static str> {
        self.configs
            .iter()
            .flat_map(|config| config.file_extensions.iter().copied())
            .collect()
    }
}

impl SourceParser for TSLanguageParsing {
    fn supports_extension(&self, extension: &str) -> bool {
        self.for_extension(extension).is_some()
    }

    fn parse(&self, file_path: &str, content: &str) -> Result<ParsedFile, ParseError> {
        let extension = file_path.rsplit('.').next().unwrap_or_default();
        let config = self
            .for_extension(extension)
            .ok_or_else(|| ParseError::UnsupportedExtension(extension.to_owned()))?;

        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language((config.grammar)())
            .map_err(|_| ParseError::TreeSitterFailed(file_path.to_owned()))?;
        let tree = parser
            .parse(content.as_bytes(), None)
            .ok_or_else(|| ParseError::TreeSitterFailed(file_path.to_owned()))?;

        let mut symbols = vec![];
        collect_symbols(tree.root_node(), content, config, None, &mut symbols);
        let chunks = cut_chunks(file_path, content, &symbols);

        Ok(ParsedFile {
            language: Some(config.language_id().to_owned()),
            symbols,
            chunks,
        })
    }
}

fn declaration_kind(config: &TSLanguageConfig, node_kind: &str) -> Option<&'static str> {
    config
        .declaration_kinds
        .iter()
        .find(|(kind, _)| *kind == node_kind)
        .map(|(_, symbol_kind)| *symbol_kind)
}

fn node_name(node: tree_sitter::Node, source: &str) -> Option<String> {
    let name_node = node.child_by_field_name("name").or_else(|| {
        let mut cursor = node.walk();
        let found = node.named_children(&mut cursor).find(|child| {
            matches!(
                child.kind(),
                "identifier" | "type_identifier" | "property_identifier" | "field_identifier"
            )
        });
        found
    })?;
    name_node
        .utf8_text(source.as_bytes())
        .ok()
        .map(str::to_owned)
}

fn signature_of(node: tree_sitter::Node, source: &str) -> Option<String> {
    let text = node.utf8_text(source.as_bytes()).ok()?;
    let first_line = text.lines().next()?.trim_end();
    let mut signature = first_line
        .trim_end_matches('{')
        .trim_end_matches(':')
        .trim_end()
        .to_owned();
    crate::strings::truncate_at_boundary(&mut signature, SIGNATURE_MAX_CHARS);
    if signature.is_empty() {
        None
    } else {
        Some(signature)
    }
}

fn collect_symbols(
    node: tree_sitter::Node,
    source: &str,
    config: &TSLanguageConfig,
    parent: Option<usize>,
    symbols: &mut Vec<NewSymbol>,
) {
    let mut cursor = node.walk();
    let children: Vec<_> = node.named_children(&mut cursor).collect();
    for child in children {
        let kind = child.kind();
        if let Some(mapped) = declaration_kind(config, kind) {
            let Some(name) = node_name(child, source) else {
                continue;
            };
            let mut symbol_kind = mapped;
            if parent.is_some() && config.method_kinds.contains(&kind) {
                symbol_kind = "method";
            }
            if symbol_kind == "variable" && has_function_value(child, config) {
                symbol_kind = "function";
            }
            let start = child.start_position();
            let end = child.end_position();
            symbols.push(NewSymbol {
                name,
                kind: symbol_kind.to_owned(),
                start_line: start.row as i64 + 1,
                start_col: start.column as i64,
                end_line: end.row as i64 + 1,
                end_col: end.column as i64,
                signature: signature_of(child, source),
                parent,
            });
            if config.container_kinds.contains(&kind) {
                let index = symbols.len() - 1;
                collect_symbols(child, source, config, Some(index), symbols);
            }
        } else if config.transparent_kinds.contains(&kind) {
            collect_symbols(child, source, config, parent, symbols);
        }
    }
}

fn has_function_value(node: tree_sitter::Node, config: &TSLanguageConfig) -> bool {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .any(|child| config.function_value_kinds.contains(&child.kind()))
}

/// One chunk per top-level declaration, a header chunk for the import
/// prelude, and a whole-file fallback so every file yields at least one.
fn cut_chunks(file_path: &str, content: &str, symbols: &[NewSymbol]) -> Vec<NewChunk> {
    let lines: Vec<&str> = content.lines().collect();
    let slice = |start_line: i64, end_line: i64| -> String {
        let start = (start_line - 1).max(0) as usize;
        let end = (end_line as usize).min(lines.len());
        lines[start.min(end)..end].join("\n")
    };

    let mut chunks = vec![];
    let top_level: Vec<&NewSymbol> = symbols.iter().filter(|s| s.parent.is_none()).collect();

    if let Some(first) = top_level.first() {
        let header = slice(1, first.start_line - 1);
        if header.lines().filter(|l| !l.trim().is_empty()).count() >= 3 {
            chunks.push(NewChunk {
                file_path: file_path.to_owned(),
                symbol_name: None,
                chunk_type: "module".to_owned(),
                start_line: 1,
                end_line: first.start_line - 1,
                content: header,
                token_estimate: None,
            });
        }
    }

    for symbol in &top_level {
        let content = slice(symbol.start_line, symbol.end_line);
        if content.trim().is_empty() {
            continue;
        }
        chunks.push(NewChunk {
            file_path: file_path.to_owned(),
            symbol_name: Some(symbol.name.clone()),
            chunk_type: symbol.kind.clone(),
            start_line: symbol.start_line,
            end_line: symbol.end_line,
            content,
            token_estimate: None,
        });
    }

    if chunks.is_empty() && !content.trim().is_empty() {
        chunks.push(NewChunk {
            file_path: file_path.to_owned(),
            symbol_name: None,
            chunk_type: "file".to_owned(),
            start_line: 1,
            end_line: lines.len() as i64,
            content: content.to_owned(),
            token_estimate: None,
        });
    }

    let mut sized = vec![];
    for chunk in chunks {
        if chunk.content.len() > MAX_CHUNK_CHARS {
            sized.extend(split_oversized(chunk));
        } else {
            sized.push(chunk);
        }
    }
    for chunk in &mut sized {
        chunk.token_estimate = Some(token_estimate(&chunk.content));
    }
    sized
}

fn split_oversized(chunk: NewChunk) -> Vec<NewChunk> {
    let lines: Vec<&str> = chunk.content.lines().collect();
    let mut parts = vec![];
    let mut buffer: Vec<&str> = vec![];
    let mut buffer_len = 0usize;
    let mut part_start = chunk.start_line;
    let mut line_no = chunk.start_line;

    for line in &lines {
        if buffer_len + line.len() > MAX_CHUNK_CHARS && !buffer.is_empty() {
            parts.push(NewChunk {
                file_path: chunk.file_path.clone(),
                symbol_name: chunk.symbol_name.clone(),
                chunk_type: chunk.chunk_type.clone(),
                start_line: part_start,
                end_line: line_no - 1,
                content: buffer.join("\n"),
                token_estimate: None,
            });
            buffer.clear();
            buffer_len = 0;
            part_start = line_no;
        }
        buffer.push(line);
        buffer_len += line.len() + 1;
        line_no += 1;
    }
    if !buffer.is_empty() {
        parts.push(NewChunk {
            file_path: chunk.file_path,
            symbol_name: chunk.symbol_name,
            chunk_type: chunk.chunk_type,
            start_line: part_start,
            end_line: line_no - 1,
            content: buffer.join("\n"),
            token_estimate: None,
        });
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(file: &str, source: &str) -> ParsedFile {
        TSLanguageParsing::init().parse(file, source).unwrap()
    }

    #[test]
    fn typescript_classes_nest_methods() {
        let parsed = parse(
            "src/graph.ts",
            r#"import { x } from './x';

export class ModuleGraph {
    invalidate(mod: ModuleNode): void {
        this.seen.delete(mod);
    }
}

export function createGraph(): ModuleGraph {
    return new ModuleGraph();
}
"#,
        );
        let names: Vec<_> = parsed
            .symbols
            .iter()
            .map(|s| (s.name.as_str(), s.kind.as_str()))
            .collect();
        assert!(names.contains(&("ModuleGraph", "class")));
        assert!(names.contains(&("invalidate", "method")));
        assert!(names.contains(&("createGraph", "function")));

        let method = parsed
            .symbols
            .iter()
            .find(|s| s.name == "invalidate")
            .unwrap();
        let class_index = parsed
            .symbols
            .iter()
            .position(|s| s.name == "ModuleGraph")
            .unwrap();
        assert_eq!(method.parent, Some(class_index));
    }

    #[test]
    fn arrow_function_consts_are_functions() {
        let parsed = parse(
            "src/util.ts",
            "export const toPosix = (p: string) => p.replace(/\\\\/g, '/');\nconst LIMIT = 10;\n",
        );
        let to_posix = parsed.symbols.iter().find(|s| s.name == "toPosix").unwrap();
        assert_eq!(to_posix.kind, "function");
        let limit = parsed.symbols.iter().find(|s| s.name == "LIMIT").unwrap();
        assert_eq!(limit.kind, "variable");
    }

    #[test]
    fn every_file_yields_at_least_one_chunk() {
        let parsed = parse("src/flat.ts", "console.log('no declarations here');\n");
        assert_eq!(parsed.chunks.len(), 1);
        assert_eq!(parsed.chunks[0].chunk_type, "file");
        assert!(parsed.chunks[0].token_estimate.is_some());
    }

    #[test]
    fn rust_items_map_onto_symbol_kinds() {
        let parsed = parse(
            "src/lib.rs",
            r#"pub struct Graph { nodes: Vec<u32> }

pub trait Visit {
    fn visit(&self);
}

pub fn build() -> Graph {
    Graph { nodes: vec![] }
}
"#,
        );
        let kinds: Vec<_> = parsed
            .symbols
            .iter()
            .map(|s| (s.name.as_str(), s.kind.as_str()))
            .collect();
        assert!(kinds.contains(&("Graph", "class")));
        assert!(kinds.contains(&("Visit", "interface")));
        assert!(kinds.contains(&("visit", "method")));
        assert!(kinds.contains(&("build", "function")));
    }

    #[test]
    fn local_variables_are_not_indexed() {
        let parsed = parse(
            "src/local.ts",
            "export function outer() {\n    const inner = 1;\n    return inner;\n}\n",
        );
        assert!(parsed.symbols.iter().all(|s| s.name != "inner"));
    }

    #[test]
    fn oversized_chunks_split_on_line_boundaries() {
        let body: String = (0..500)
            .map(|i| format!("    console.log('filler line number {i}');\n"))
            .collect();
        let source = format!("export function huge() {{\n{body}}}\n");
        let parsed = parse("src/huge.ts", &source);
        assert!(parsed.chunks.len() > 1);
        assert!(parsed.chunks.iter().all(|c| c.content.len() <= 6000));
        assert!(parsed
            .chunks
            .iter()
            .all(|c| c.symbol_name.as_deref() == Some("huge")));
    }
}
