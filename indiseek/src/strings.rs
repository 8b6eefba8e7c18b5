//! Byte-budget string truncation that never splits a UTF-8 character.
//! Source files and model output are full of multibyte text; a plain
//! `String::truncate` at a byte offset panics on them.

pub fn truncate_at_boundary(text: &mut String, max_bytes: usize) {
    if text.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

pub fn truncated(text: &str, max_bytes: usize) -> String {
    let mut owned = text.to_owned();
    truncate_at_boundary(&mut owned, max_bytes);
    owned
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_truncates_exactly() {
        let mut text = "abcdef".to_owned();
        truncate_at_boundary(&mut text, 4);
        assert_eq!(text, "abcd");
    }

    #[test]
    fn multibyte_backs_off_to_a_boundary() {
        // 'é' is two bytes, a cut at 3 would land mid-character
        let mut text = "aéé".to_owned();
        truncate_at_boundary(&mut text, 2);
        assert_eq!(text, "a");

        let mut text = "日本語のコメント".to_owned();
        truncate_at_boundary(&mut text, 7);
        assert_eq!(text, "日本");
    }

    #[test]
    fn short_strings_are_untouched()  {
        let mut text = "short".to_owned();
        truncate_at_boundary(&mut text, 100);
        assert_eq!(text, "short");
    }
}
