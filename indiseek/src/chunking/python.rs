use super::languages::TSLanguageConfig;

pub fn python_language_config() -> TSLanguageConfig {
    TSLanguageConfig {
        language_ids: &["Python"],
        file_extensions: &["py"],
        grammar: tree_sitter_python::language,
        declaration_kinds: &[
            ("function_definition", "function"),
            ("class_definition", "class"),
        ],
        container_kinds: &["class_definition"],
        method_kinds: &["function_definition"],
        transparent_kinds: &["decorated_definition", "block"],
        function_value_kinds: &[],
    }
}
