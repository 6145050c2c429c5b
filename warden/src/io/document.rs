//! Document session: current document, viewport cursor and visit history.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::core::text::page_contains;
use crate::core::viewport::{ViewportState, split_pages};
use crate::io::path_guard::PathResolver;

/// Turns a resolved path into displayable text.
pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<String>;
}

/// Reads files as lossy UTF-8 and renders directories as a markdown listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextLoader;

impl DocumentLoader for PlainTextLoader {
    fn load(&self, path: &Path) -> Result<String> {
        if path.is_dir() {
            return render_directory(path);
        }
        let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn render_directory(path: &Path) -> Result<String> {
    let mut names = Vec::new();
    for entry in fs::read_dir(path).with_context(|| format!("read directory {}", path.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", path.display()))?;
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.path().is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();

    let mut out = format!("# Index of {}\n\n", path.display());
    out.push_str("- ../\n");
    for name in names {
        out.push_str(&format!("- {name}\n"));
    }
    Ok(out)
}

/// One visit recorded by [`DocumentSession::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub path: PathBuf,
    pub visited_at: DateTime<Utc>,
}

/// Browser-like view over local documents.
///
/// History is append-only: every successful `open` adds exactly one entry,
/// and a rejected path adds none.
pub struct DocumentSession {
    resolver: PathResolver,
    loader: Box<dyn DocumentLoader + Send + Sync>,
    viewport_size: usize,
    current: Option<PathBuf>,
    history: Vec<PathEntry>,
    viewport: ViewportState,
    content: String,
    pages: Vec<Range<usize>>,
}

impl DocumentSession {
    pub fn new(
        resolver: PathResolver,
        loader: Box<dyn DocumentLoader + Send + Sync>,
        viewport_size: usize,
    ) -> Self {
        Self {
            resolver,
            loader,
            viewport_size,
            current: None,
            history: Vec::new(),
            viewport: ViewportState::default(),
            content: String::new(),
            pages: vec![0..0],
        }
    }

    /// Open `input`, resolved relative to the current document.
    ///
    /// Fails with a `SecurityViolation` (wrapped in `anyhow`) before anything
    /// is read when the path escapes the confinement root. A document that
    /// cannot be loaded still becomes current, showing the load error.
    #[instrument(skip_all, fields(input = %input))]
    pub fn open(&mut self, input: &str) -> Result<()> {
        let path = self.resolver.resolve(input, self.current.as_deref())?;

        self.history.push(PathEntry {
            path: path.clone(),
            visited_at: Utc::now(),
        });
        self.viewport = ViewportState::default();

        let content = match self.loader.load(&path) {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %path.display(), err = %format!("{err:#}"), "failed to load document");
                format!("# Error\n\n{err:#}\n")
            }
        };
        self.pages = split_pages(&content, self.viewport_size);
        self.content = content;
        debug!(path = %path.display(), pages = self.pages.len(), "opened document");
        self.current = Some(path);
        Ok(())
    }

    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn history(&self) -> &[PathEntry] {
        &self.history
    }

    pub fn viewport_state(&self) -> &ViewportState {
        &self.viewport
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Text of the current page.
    pub fn viewport(&self) -> &str {
        self.page_text(self.viewport.current_page)
    }

    pub fn page_down(&mut self) {
        self.viewport.current_page = (self.viewport.current_page + 1).min(self.pages.len() - 1);
    }

    pub fn page_up(&mut self) {
        self.viewport.current_page = self.viewport.current_page.saturating_sub(1);
    }

    /// Move to the first page at or after the current one (wrapping) that
    /// contains `query`. Returns false and stays put when nothing matches.
    pub fn find_on_page(&mut self, query: &str) -> bool {
        self.viewport.find_query = Some(query.to_string());
        self.search_from(self.viewport.current_page)
    }

    /// Repeat the last search starting after the page of its last match.
    pub fn find_next(&mut self) -> bool {
        if self.viewport.find_query.is_none() {
            return false;
        }
        let start = match self.viewport.find_viewport {
            Some(page) => page + 1,
            None => self.viewport.current_page,
        };
        self.search_from(start)
    }

    /// Header describing the current document and page position.
    pub fn state_header(&self) -> String {
        let address = self
            .current
            .as_ref()
            .map_or_else(|| "(none)".to_string(), |p| p.display().to_string());
        format!(
            "Path: {address}\nViewport position: Showing page {} of {}.\n",
            self.viewport.current_page + 1,
            self.pages.len()
        )
    }

    fn search_from(&mut self, start: usize) -> bool {
        let Some(query) = self.viewport.find_query.clone() else {
            return false;
        };
        let count = self.pages.len();
        for offset in 0..count {
            let page = (start + offset) % count;
            if page_contains(self.page_text(page), &query) {
                self.viewport.current_page = page;
                self.viewport.find_viewport = Some(page);
                return true;
            }
        }
        self.viewport.find_viewport = None;
        false
    }

    fn page_text(&self, page: usize) -> &str {
        self.pages
            .get(page)
            .and_then(|range| self.content.get(range.clone()))
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::path_guard::PathGuard;

    fn guarded(root: &Path, viewport_size: usize) -> DocumentSession {
        let guard = PathGuard::new(root).expect("guard");
        DocumentSession::new(
            PathResolver::Guarded(guard),
            Box::new(PlainTextLoader),
            viewport_size,
        )
    }

    #[test]
    fn open_appends_history_and_resets_viewport() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.md"), "one two three four five six").expect("write");
        let mut session = guarded(temp.path(), 8);
        let path = temp.path().join("a.md");
        let path = path.to_str().expect("utf8");

        session.open(path).expect("open");
        session.page_down();
        assert_eq!(session.viewport_state().current_page, 1);

        session.open(path).expect("open again");
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[0].path, session.history()[1].path);
        assert_eq!(session.viewport_state(), &ViewportState::default());
    }

    #[test]
    fn rejected_path_leaves_history_untouched() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut session = guarded(temp.path(), 64);
        let err = session.open("/etc/passwd").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::SessionError>(),
            Some(crate::error::SessionError::SecurityViolation { .. })
        ));
        assert!(session.history().is_empty());
        assert!(session.current().is_none());
    }

    #[test]
    fn missing_file_becomes_error_page() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut session = guarded(temp.path(), 64);
        let path = temp.path().join("missing.md");
        session.open(path.to_str().expect("utf8")).expect("open");
        assert!(session.viewport().starts_with("# Error"));
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn directories_render_as_listing() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir(temp.path().join("sub")).expect("mkdir");
        fs::write(temp.path().join("b.txt"), "b").expect("write");
        let mut session = guarded(temp.path(), 1024);
        session.open(temp.path().to_str().expect("utf8")).expect("open");
        assert!(session.viewport().contains("- b.txt"));
        assert!(session.viewport().contains("- sub/"));
    }

    #[test]
    fn find_wraps_around_and_find_next_advances() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join("doc.md"),
            "needle aaaa bbbb cccc needle dddd",
        )
        .expect("write");
        let mut session = guarded(temp.path(), 6);
        let path = temp.path().join("doc.md");
        session.open(path.to_str().expect("utf8")).expect("open");
        assert!(session.page_count() > 2);

        session.page_down();
        assert!(session.find_on_page("NEEDLE"));
        let first = session.viewport_state().current_page;
        assert!(first >= 1);

        assert!(session.find_next());
        assert_eq!(session.viewport_state().current_page, 0);
        assert!(!session.find_on_page("absent"));
    }

    #[test]
    fn paging_is_clamped() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.md"), "short").expect("write");
        let mut session = guarded(temp.path(), 1024);
        session.open(temp.path().join("a.md").to_str().expect("utf8")).expect("open");
        session.page_up();
        session.page_down();
        assert_eq!(session.viewport_state().current_page, 0);
        assert!(session.state_header().contains("page 1 of 1"));
    }
}
