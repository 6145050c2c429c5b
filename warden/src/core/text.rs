//! Text helpers for model replies and document search.

use std::sync::LazyLock;

use regex::Regex;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?\s*```\s*$")
        .expect("fence regex should be valid")
});

static CODE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\r?\n(.*?)```")
        .expect("code block regex should be valid")
});

/// Strip one markdown fence wrapping the whole reply, if present.
pub fn strip_json_fence(raw: &str) -> &str {
    match FENCE_RE.captures(raw).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str().trim(),
        None => raw.trim(),
    }
}

/// A fenced code block found in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// Fence info string, lowercased; empty when absent.
    pub language: String,
    pub code: String,
}

pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    CODE_BLOCK_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let language = caps.get(1)?.as_str().to_ascii_lowercase();
            let code = caps.get(2)?.as_str().to_string();
            (!code.trim().is_empty()).then_some(CodeBlock { language, code })
        })
        .collect()
}

/// Truncate to at most `limit` bytes on a char boundary, noting the cut.
pub fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n[truncated {} bytes]", &text[..end], text.len() - end)
}

/// Lowercased words of `text`, with punctuation treated as separators.
pub fn search_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Case-insensitive search for `query` words as a contiguous run in `page`.
pub fn page_contains(page: &str, query: &str) -> bool {
    let needle = search_words(query);
    if needle.is_empty() {
        return false;
    }
    let hay = search_words(page);
    hay.windows(needle.len()).any(|window| window == needle.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_json_fence(raw), "{\"a\": 1}");
        assert_eq!(strip_json_fence("  {\"a\": 1}\n"), "{\"a\": 1}");
        assert_eq!(strip_json_fence("```\n{}\n```\n"), "{}");
    }

    #[test]
    fn extracts_code_blocks_with_language() {
        let text = "Run this:\n```python\nprint('hi')\n```\nthen\n```sh\nls\n```";
        let blocks = extract_code_blocks(text);
        assert_eq!(
            blocks,
            vec![
                CodeBlock {
                    language: "python".to_string(),
                    code: "print('hi')\n".to_string(),
                },
                CodeBlock {
                    language: "sh".to_string(),
                    code: "ls\n".to_string(),
                },
            ]
        );
    }

    #[test]
    fn empty_code_blocks_are_skipped() {
        assert!(extract_code_blocks("```\n\n```").is_empty());
        assert!(extract_code_blocks("no code here").is_empty());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        let cut = truncate("ééé", 3);
        assert!(cut.starts_with('é'));
        assert!(cut.ends_with("[truncated 4 bytes]"));
    }

    #[test]
    fn page_search_ignores_case_and_punctuation() {
        let page = "The Quick, brown fox jumps.";
        assert!(page_contains(page, "quick brown"));
        assert!(page_contains(page, "FOX"));
        assert!(!page_contains(page, "brown quick"));
        assert!(!page_contains(page, "   "));
    }
}
