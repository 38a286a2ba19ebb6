//! Sandbox resolver.
//!
//! Maps a client-visible `/storage/...` path onto the caller's private
//! directory. Traversal is refused rather than normalized: a `..` anywhere
//! in the remainder is an escape attempt, and so is any symlink whose
//! target leaves the sandbox.

use std::path::{Component, Path, PathBuf};

use sharebox_types::Identity;
use tokio::fs;

use crate::vfs::error::{VfsError, VfsResult};

/// Client-visible prefix of the storage region.
pub const STORAGE_PREFIX: &str = "/storage";

/// What the caller is about to do with the resolved path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Inspect or read; nothing is created.
    Read,
    /// Create or modify; missing parent directories are created.
    Write,
}

/// Resolves storage paths into per-identity sandboxes under one root.
///
/// Every sandbox lives at `<root>/<sha256(credential)>`. The root is fixed
/// at construction.
#[derive(Debug, Clone)]
pub struct SandboxResolver {
    root: PathBuf,
}

impl SandboxResolver {
    /// Create a resolver whose sandboxes live under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding every sandbox.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Real directory of `identity`'s sandbox.
    pub fn sandbox_root(&self, identity: &Identity) -> PathBuf {
        self.root.join(identity.sandbox_name())
    }

    /// Resolve `visible` (which must be `/storage` or below) to a real path
    /// inside `identity`'s sandbox.
    pub async fn resolve(
        &self,
        identity: &Identity,
        visible: &str,
        intent: Intent,
    ) -> VfsResult<PathBuf> {
        let rest = storage_remainder(visible).ok_or_else(|| VfsError::not_found(visible))?;
        let relative = confine(rest).ok_or_else(|| VfsError::out_of_sandbox(visible))?;

        let sandbox = self.sandbox_root(identity);
        fs::create_dir_all(&sandbox).await?;

        let full = sandbox.join(&relative);
        ensure_within(&sandbox, &full, visible)?;

        if intent == Intent::Write {
            if let Some(parent) = full.parent() {
                if parent != sandbox {
                    fs::create_dir_all(parent).await?;
                }
            }
        }

        tracing::trace!(user_id = %identity.id, visible, real = %full.display(), "resolved");
        Ok(full)
    }
}

/// The part of `visible` after `/storage`, without leading slashes.
///
/// `None` when the path is not in the storage region at all
/// (`/storagex` is not `/storage/x`).
fn storage_remainder(visible: &str) -> Option<&str> {
    let rest = visible.strip_prefix(STORAGE_PREFIX)?;
    if rest.is_empty() {
        return Some("");
    }
    rest.strip_prefix('/').map(|r| r.trim_start_matches('/'))
}

/// Keep only plain name components; any `..`, root or prefix component
/// rejects the whole path.
fn confine(rest: &str) -> Option<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(rest).components() {
        match component {
            Component::Normal(name) => relative.push(name),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(relative)
}

/// Check that the deepest existing ancestor of `full` (following symlinks)
/// is still inside `sandbox`.
fn ensure_within(sandbox: &Path, full: &Path, visible: &str) -> VfsResult<()> {
    let canonical_sandbox = dunce::canonicalize(sandbox)?;

    let mut probe = full;
    while probe.symlink_metadata().is_err() {
        probe = match probe.parent() {
            Some(parent) => parent,
            None => return Err(VfsError::out_of_sandbox(visible)),
        };
    }

    // A dangling symlink fails to canonicalize; treat it as an escape.
    let canonical = dunce::canonicalize(probe).map_err(|_| VfsError::out_of_sandbox(visible))?;
    if !canonical.starts_with(&canonical_sandbox) {
        return Err(VfsError::out_of_sandbox(visible));
    }
    Ok(())
}
