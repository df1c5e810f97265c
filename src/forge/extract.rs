//! Artifact Extractor
//!
//! Reduces a raw model completion to the single code fragment worth keeping.
//! When the model iterates ("Step 1: ... Step 2: ..."), only the last step
//! counts; within it, the last fenced block wins.

use regex::Regex;
use std::sync::OnceLock;

fn step_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)\bstep\s*\d+\s*:").expect("static regex"))
}

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Optional language tag on the opening fence, content up to the next fence
    RE.get_or_init(|| Regex::new(r"```[A-Za-z0-9_+-]*[ \t]*\r?\n?([\s\S]*?)```").expect("static regex"))
}

/// Select the candidate fragment from a completion. Returns an empty string
/// when nothing usable is present.
pub fn extract_candidate(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let tail = match step_marker().find_iter(raw).last() {
        Some(last) => &raw[last.end()..],
        None => raw,
    };

    let fragment = match fenced_block().captures_iter(tail).last() {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or_default(),
        None => tail,
    };

    strip_code_fences(fragment)
}

/// Remove a dangling opening/closing fence and a leading language tag.
/// Handles fragments whose fences were never closed, which the primary pass
/// cannot match.
pub fn strip_code_fences(code: &str) -> String {
    let mut s = code.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = rest;
        if s.get(..6).is_some_and(|tag| tag.eq_ignore_ascii_case("python")) {
            s = &s[6..];
        }
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_step_wins() {
        let raw = "Step 1: first try\n```python\ndef run(x):\n    return 1\n```\n\
                   Step 2: fixed it\n```python\ndef run(x):\n    return 2\n```\n";
        let out = extract_candidate(raw);
        assert!(out.contains("return 2"));
        assert!(!out.contains("return 1"));
    }

    #[test]
    fn test_last_fence_wins_without_markers() {
        let raw = "Here is a draft:\n```python\nA = 1\n```\nOn reflection, better:\n```python\nB = 2\n```";
        assert_eq!(extract_candidate(raw), "B = 2");
    }

    #[test]
    fn test_step_marker_case_and_spacing() {
        let raw = "STEP 1 : junk\nstep   2:\nfinal_code = True";
        assert_eq!(extract_candidate(raw), "final_code = True");
    }

    #[test]
    fn test_plain_text_is_trimmed() {
        assert_eq!(extract_candidate("\n\n  x = 1  \n"), "x = 1");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(extract_candidate(""), "");
        assert_eq!(extract_candidate("   \n"), "");
    }

    #[test]
    fn test_unclosed_fence_is_stripped() {
        assert_eq!(extract_candidate("```python\nx = 1\n"), "x = 1");
        assert_eq!(extract_candidate("x = 1\n```"), "x = 1");
    }

    #[test]
    fn test_fence_without_language_tag() {
        assert_eq!(extract_candidate("```\nprint('hi')\n```"), "print('hi')");
    }

    #[test]
    fn test_step_without_code_falls_back_to_tail() {
        let raw = "Step 1:\n```python\nold = 1\n```\nStep 2: I give up";
        assert_eq!(extract_candidate(raw), "I give up");
    }
}
