//! Output clipping
//!
//! Worker output and model replies are shown to the agent and written to
//! logs; both need a bound. Clipping keeps the head and the tail, since
//! errors tend to sit at the end of a traceback.

use std::borrow::Cow;

/// Clip `content` to about `max_bytes`, keeping both ends on UTF-8 boundaries
pub fn clip_middle(content: &str, max_bytes: usize) -> Cow<'_, str> {
    if content.len() <= max_bytes {
        return Cow::Borrowed(content);
    }
    if max_bytes == 0 {
        return Cow::Owned(format!("[{} bytes clipped]", content.len()));
    }

    let half = max_bytes / 2;
    let head_end = floor_boundary(content, half);
    let tail_start = ceil_boundary(content, content.len() - half).max(head_end);
    let clipped = tail_start - head_end;

    Cow::Owned(format!(
        "{}\n... [{} bytes clipped] ...\n{}",
        &content[..head_end],
        clipped,
        &content[tail_start..]
    ))
}

/// Last non-empty line, if any
pub fn last_line(content: &str) -> Option<&str> {
    content.lines().rev().map(str::trim).find(|l| !l.is_empty())
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(s: &str, mut idx: usize) -> usize {
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_content_untouched() {
        assert!(matches!(clip_middle("hello", 10), Cow::Borrowed("hello")));
    }

    #[test]
    fn test_keeps_head_and_tail() {
        let text = format!("{}{}", "a".repeat(50), "z".repeat(50));
        let out = clip_middle(&text, 20);
        assert!(out.starts_with("aaaaaaaaaa\n"));
        assert!(out.ends_with("\nzzzzzzzzzz"));
        assert!(out.contains("[80 bytes clipped]"));
    }

    #[test]
    fn test_multibyte_boundaries() {
        let text = "é".repeat(40);
        let out = clip_middle(&text, 11);
        assert!(out.contains("bytes clipped"));
    }

    #[test]
    fn test_last_line() {
        assert_eq!(last_line("a\n{\"ok\":true}\n\n"), Some("{\"ok\":true}"));
        assert_eq!(last_line("  \n"), None);
    }
}
