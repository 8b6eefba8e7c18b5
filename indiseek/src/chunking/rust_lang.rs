use super::languages::TSLanguageConfig;

pub fn rust_language_config() -> TSLanguageConfig {
    TSLanguageConfig {
        language_ids: &["Rust"],
        file_extensions: &["rs"],
        grammar: tree_sitter_rust::language,
        declaration_kinds: &[
            ("function_item", "function"),
            ("function_signature_item", "function"),
            ("struct_item", "class"),
            ("trait_item", "interface"),
            ("enum_item", "enum"),
            ("type_item", "type"),
            ("const_item", "variable"),
            ("static_item", "variable"),
        ],
        container_kinds: &["trait_item"],
        method_kinds: &["function_item", "function_signature_item"],
        transparent_kinds: &["impl_item", "declaration_list", "mod_item"],
        function_value_kinds: &[],
    }
}
