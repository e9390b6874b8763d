//! UTF-8 safe string previews.
//!
//! Byte slicing (`&s[..n]`) panics on multibyte characters; these helpers
//! count Unicode scalar values instead.

/// Return the first `n` characters of `s` (no ellipsis).
pub fn prefix_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Return `s` cut to `n` characters, with a trailing `...` when it was longer.
pub fn preview(s: &str, n: usize) -> String {
    let mut prefix = prefix_chars(s, n);
    if s.chars().nth(n).is_some() {
        prefix.push_str("...");
    }
    prefix
}
