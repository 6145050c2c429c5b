//! Path confinement for the file surfer.
//!
//! A [`PathGuard`] owns an immutable confinement root. Every candidate path is
//! resolved (home expansion, joining onto the current document), folded
//! lexically, then the longest existing ancestor is canonicalized so symlinks
//! that leave the root are caught before any content is read.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use crate::core::path::{expand_home, is_within, normalize};
use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Establish the confinement root. The root must be absolute; it is
    /// canonicalized when it exists.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_absolute() {
            bail!("confinement root must be absolute: {}", root.display());
        }
        let root = match fs::canonicalize(root) {
            Ok(canonical) => canonical,
            Err(err) if err.kind() == io::ErrorKind::NotFound => normalize(root),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("canonicalize confinement root {}", root.display()));
            }
        };
        debug!(root = %root.display(), "path guard ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True if `path` resolves to the root or one of its descendants.
    pub fn is_safe(&self, path: &Path) -> bool {
        if !path.is_absolute() {
            return false;
        }
        is_within(&self.root, &resolve_existing(&normalize(path)))
    }

    /// Return the normalized path, or a security violation naming it.
    pub fn check(&self, path: &Path) -> Result<PathBuf, SessionError> {
        if self.is_safe(path) {
            Ok(normalize(path))
        } else {
            warn!(
                path = %path.display(),
                root = %self.root.display(),
                "path outside confinement root"
            );
            Err(SessionError::security_violation(path.to_path_buf()))
        }
    }
}

/// Resolve `input` the way the file browser does before opening it.
///
/// `~` expands to the user's home; absolute paths are used as-is; relative
/// paths join onto the parent of the current file or onto the current
/// directory. With no current document a relative path stays relative.
pub fn resolve(input: &str, current: Option<&Path>) -> PathBuf {
    let home = dirs::home_dir();
    let path = expand_home(input, home.as_deref());
    if path.is_absolute() {
        return path;
    }
    match current {
        Some(current) if current.is_file() => match current.parent() {
            Some(parent) => parent.join(path),
            None => path,
        },
        Some(current) if current.is_dir() => current.join(path),
        _ => path,
    }
}

/// How the document session turns a requested path into the one it opens.
#[derive(Debug, Clone)]
pub enum PathResolver {
    /// Confined to a root; escapes are security violations.
    Guarded(PathGuard),
    /// No confinement; relative paths resolve against the working directory.
    Unguarded,
}

impl PathResolver {
    pub fn resolve(&self, input: &str, current: Option<&Path>) -> Result<PathBuf> {
        let path = resolve(input, current);
        match self {
            PathResolver::Guarded(guard) => Ok(guard.check(&path)?),
            PathResolver::Unguarded => {
                if path.is_absolute() {
                    return Ok(normalize(&path));
                }
                let cwd = std::env::current_dir().context("read current directory")?;
                Ok(normalize(&cwd.join(path)))
            }
        }
    }
}

/// Canonicalize the longest existing ancestor and re-append the rest.
fn resolve_existing(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = fs::canonicalize(&existing) {
            let mut out = canonical;
            out.extend(rest.iter().rev());
            return normalize(&out);
        }
        match (existing.file_name().map(ToOwned::to_owned), existing.parent()) {
            (Some(name), Some(parent)) => {
                rest.push(name);
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}
