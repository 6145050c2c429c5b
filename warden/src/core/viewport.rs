//! Viewport pagination over document text.

use std::ops::Range;

/// Cursor over the pages of the current document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewportState {
    pub current_page: usize,
    pub find_query: Option<String>,
    /// Page on which `find_query` last matched.
    pub find_viewport: Option<usize>,
}

/// Split `content` into byte ranges of roughly `size` bytes.
///
/// A page ends at a char boundary and is extended to the next whitespace so
/// words are not cut in half. Empty content yields a single empty page.
pub fn split_pages(content: &str, size: usize) -> Vec<Range<usize>> {
    let size = size.max(1);
    if content.is_empty() {
        return vec![0..0];
    }

    let mut pages = Vec::new();
    let mut start = 0;
    while start < content.len() {
        let mut end = (start + size).min(content.len());
        while !content.is_char_boundary(end) {
            end += 1;
        }
        if let Some(offset) = content[end..].find(char::is_whitespace) {
            end += offset;
        } else {
            end = content.len();
        }
        // Keep the whitespace run with the page it ends.
        let rest = &content[end..];
        let trimmed = rest.trim_start();
        end += rest.len() - trimmed.len();

        pages.push(start..end);
        start = end;
    }
    pages
}
