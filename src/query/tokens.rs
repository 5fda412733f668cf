//! Token estimation for budgeted rendering

/// Average characters per token assumed for code and structured text
pub const CHARS_PER_TOKEN: f64 = 3.5;

/// Approximate token count of `text`: `ceil(chars / 3.5)`
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() as f64 / CHARS_PER_TOKEN).ceil() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcdefg"), 2);
        assert_eq!(estimate_tokens("abcdefgh"), 3);
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        assert_eq!(estimate_tokens("ééééééé"), 2);
    }
}
