//! Word counting and target parsing.
//!
//! Counting is locale-agnostic: tokens are runs of non-whitespace, so
//! mixed Hindi/English text is counted the same way a newsroom would
//! eyeball it, with no attempt at linguistic segmentation.

/// Count whitespace-delimited words in `text`.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Extract a numeric word target from a display value like `"300 (Brief)"`.
///
/// All non-digit characters are discarded before parsing. Returns `None`
/// when no digits remain or the target is zero, which callers treat as
/// "no length discipline requested".
pub fn parse_target_words(raw: &str) -> Option<u32> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.parse::<u32>() {
        Ok(n) if n > 0 => Some(n),
        _ => None,
    }
}
