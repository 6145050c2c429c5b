//! Lexical path arithmetic used by the confinement guard.
//!
//! Everything here works on path components only; nothing touches the
//! filesystem. Symlink resolution lives in `io::path_guard`.

use std::path::{Component, Path, PathBuf};

/// Expand a leading `~` (either `~` alone or `~/...`) to `home`.
///
/// Inputs such as `~user/x` are returned unchanged, as is everything when
/// `home` is unknown.
pub fn expand_home(input: &str, home: Option<&Path>) -> PathBuf {
    let Some(home) = home else {
        return PathBuf::from(input);
    };
    if input == "~" {
        return home.to_path_buf();
    }
    match input.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None => PathBuf::from(input),
    }
}

/// Fold `.` and `..` components without consulting the filesystem.
///
/// `..` at the root of an absolute path stays at the root. Leading `..` of a
/// relative path are kept since there is nothing to pop.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    out.pop();
                    depth -= 1;
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(name) => {
                out.push(name);
                depth += 1;
            }
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// True if `path` is `root` or a component-wise descendant of it.
///
/// Both inputs must already be absolute and normalized. Siblings that only
/// share a string prefix (`/work2` vs `/work`) are not descendants.
pub fn is_within(root: &Path, path: &Path) -> bool {
    root.is_absolute() && path.is_absolute() && path.starts_with(root)
}
