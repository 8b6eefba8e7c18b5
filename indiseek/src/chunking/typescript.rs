use super::languages::TSLanguageConfig;

fn typescript_declarations() -> &'static [(&'static str, &'static str)] {
    &[
        ("function_declaration", "function"),
        ("generator_function_declaration", "function"),
        ("class_declaration", "class"),
        ("abstract_class_declaration", "class"),
        ("method_definition", "function"),
        ("interface_declaration", "interface"),
        ("type_alias_declaration", "type"),
        ("enum_declaration", "enum"),
        ("variable_declarator", "variable"),
    ]
}

pub fn typescript_language_config() -> TSLanguageConfig {
    TSLanguageConfig {
        language_ids: &["Typescript"],
        file_extensions: &["ts", "mts", "cts"],
        grammar: tree_sitter_typescript::language_typescript,
        declaration_kinds: typescript_declarations(),
        container_kinds: &["class_declaration", "abstract_class_declaration"],
        method_kinds: &["method_definition"],
        transparent_kinds: &[
            "export_statement",
            "lexical_declaration",
            "variable_declaration",
            "class_body",
            "ambient_declaration",
        ],
        function_value_kinds: &["arrow_function", "function", "function_expression"],
    }
}

pub fn tsx_language_config() -> TSLanguageConfig {
    TSLanguageConfig {
        language_ids: &["TSX"],
        file_extensions: &["tsx"],
        grammar: tree_sitter_typescript::language_tsx,
        declaration_kinds: typescript_declarations(),
        container_kinds: &["class_declaration", "abstract_class_declaration"],
        method_kinds: &["method_definition"],
        transparent_kinds: &[
            "export_statement",
            "lexical_declaration",
            "variable_declaration",
            "class_body",
            "ambient_declaration",
        ],
        function_value_kinds: &["arrow_function", "function", "function_expression"],
    }
}
