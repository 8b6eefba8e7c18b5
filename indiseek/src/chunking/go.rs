use super::languages::TSLanguageConfig;

pub fn go_language_config() -> TSLanguageConfig {
    TSLanguageConfig {
        language_ids: &["Go"],
        file_extensions: &["go"],
        grammar: tree_sitter_go::language,
        declaration_kinds: &[
            ("function_declaration", "function"),
            ("method_declaration", "method"),
            ("type_spec", "type"),
            ("const_spec", "variable"),
            ("var_spec", "variable"),
        ],
        container_kinds: &[],
        method_kinds: &["method_declaration"],
        transparent_kinds: &[
            "type_declaration",
            "const_declaration",
            "var_declaration",
        ],
        function_value_kinds: &[],
    }
}
