//! String utilities for the domain layer.

/// Truncate a string to a maximum length with ellipsis (UTF-8 safe)
///
/// Uses byte length for max_len but ensures truncation occurs at valid
/// UTF-8 character boundaries.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let target = max_len.saturating_sub(3);
        let mut end = target.min(s.len());
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_ascii() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 8), "hello...");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("café au lait", 30), "café au lait");
        // 'é' is 2 bytes: "caf" + 'é' ends at byte 5, target 4 backs up to 3
        assert_eq!(truncate("café au lait", 7), "caf...");
    }

    #[test]
    fn test_truncate_emoji() {
        // Each emoji is 4 bytes: 12 bytes total
        let s = "\u{1F44B}\u{1F30D}\u{1F389}";
        // max_len=10 -> target=7 -> back to char boundary at 4
        assert_eq!(truncate(s, 10), "\u{1F44B}...");
        // max_len=11 -> target=8 -> boundary at 8
        assert_eq!(truncate(s, 11), "\u{1F44B}\u{1F30D}...");
    }
}
