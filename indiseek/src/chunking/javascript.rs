use super::languages::TSLanguageConfig;

pub fn javascript_language_config() -> TSLanguageConfig {
    TSLanguageConfig {
        language_ids: &["Javascript", "JSX"],
        file_extensions: &["js", "jsx", "mjs", "cjs"],
        grammar: tree_sitter_javascript::language,
        declaration_kinds: &[
            ("function_declaration", "function"),
            ("generator_function_declaration", "function"),
            ("class_declaration", "class"),
            ("method_definition", "function"),
            ("variable_declarator", "variable"),
        ],
        container_kinds: &["class_declaration"],
        method_kinds: &["method_definition"],
        transparent_kinds: &[
            "export_statement",
            "lexical_declaration",
            "variable_declaration",
            "class_body",
        ],
        function_value_kinds: &["arrow_function", "function", "function_expression"],
    }
}
