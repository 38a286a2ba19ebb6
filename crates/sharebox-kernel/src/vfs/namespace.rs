//! The client-visible namespace.
//!
//! Exactly three regions exist, and every request is routed by a pure
//! classification of its path:
//!
//! ```text
//! /                    directory: storage, config
//! /storage             directory: the caller's own sandbox name only
//! /storage/<anything>  the caller's sandbox tree (via SandboxResolver)
//! /config              the caller's share document (via ConfigChannel)
//! ```
//!
//! Anything else is NotFound. So is everything, for a session without an
//! identity.

use std::sync::Arc;

use tokio::fs;

use crate::registry::Registry;
use crate::vfs::config_channel::{self, CONFIG_PATH, ChannelMode, ConfigChannel};
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::handle::OpenFile;
use crate::vfs::sandbox::{Intent, STORAGE_PREFIX, SandboxResolver};
use crate::vfs::session::SessionContext;
use crate::vfs::types::{CONFIG_FILE_PERM, DirEntry, FileAttr, OpenFlags, VIRTUAL_DIR_PERM};

/// Which region a normalized path falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region<'a> {
    /// `/`
    Root,
    /// `/storage`
    ///
    /// Lists a single entry named after the caller's sandbox. That entry is
    /// a label only: `/storage/<name>` maps to `<sandbox>/<name>` like any
    /// other storage path, not to the sandbox root.
    StorageRoot,
    /// `/storage/...`, carrying the full visible path.
    Storage(&'a str),
    /// `/config`
    Config,
    /// Everything else.
    Invalid,
}

impl<'a> Region<'a> {
    /// Classify a path produced by [`normalize`].
    pub fn classify(path: &'a str) -> Self {
        match path {
            "/" => Region::Root,
            STORAGE_PREFIX => Region::StorageRoot,
            CONFIG_PATH => Region::Config,
            p if p
                .strip_prefix(STORAGE_PREFIX)
                .is_some_and(|rest| rest.starts_with('/')) =>
            {
                Region::Storage(p)
            }
            _ => Region::Invalid,
        }
    }
}

/// Make a client path absolute and collapse empty and `.` segments.
///
/// `..` segments are kept as-is: whether they escape is the sandbox
/// resolver's decision, not something to paper over here.
pub fn normalize(path: &str) -> String {
    let mut out = String::from("/");
    for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if out.len() > 1 {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

/// Lexical canonical form for clients resolving a working directory.
///
/// Unlike [`normalize`], `..` is folded (and clamped at `/`). The result is
/// only a name; operations on it still go through the resolver.
pub fn realpath(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Routes file operations to the sandbox or the config channel.
#[derive(Debug, Clone)]
pub struct Namespace {
    registry: Arc<Registry>,
    sandbox: SandboxResolver,
}

impl Namespace {
    pub fn new(registry: Arc<Registry>, sandbox: SandboxResolver) -> Self {
        Self { registry, sandbox }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn sandbox(&self) -> &SandboxResolver {
        &self.sandbox
    }

    /// List a directory.
    pub async fn readdir(&self, session: &SessionContext, path: &str) -> VfsResult<Vec<DirEntry>> {
        let identity = session.identity()?;
        let path = normalize(path);

        match Region::classify(&path) {
            Region::Root => Ok(vec![
                DirEntry::new("storage", FileAttr::directory(VIRTUAL_DIR_PERM)),
                DirEntry::new("config", self.config_attr(session)?),
            ]),
            Region::StorageRoot => {
                let real = self.sandbox.resolve(identity, STORAGE_PREFIX, Intent::Read).await?;
                let meta = fs::metadata(&real).await?;
                Ok(vec![DirEntry::new(
                    identity.sandbox_name(),
                    FileAttr::from_metadata(&meta),
                )])
            }
            Region::Storage(visible) => {
                let real = self.sandbox.resolve(identity, visible, Intent::Read).await?;
                if !fs::metadata(&real).await?.is_dir() {
                    return Err(VfsError::not_a_directory(visible));
                }
                let mut dir = fs::read_dir(&real).await?;
                let mut entries = Vec::new();
                while let Some(entry) = dir.next_entry().await? {
                    let meta = entry.metadata().await?;
                    entries.push(DirEntry::new(
                        entry.file_name().to_string_lossy().into_owned(),
                        FileAttr::from_metadata(&meta),
                    ));
                }
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(entries)
            }
            Region::Config | Region::Invalid => Err(VfsError::not_found(path)),
        }
    }

    /// Attributes of a path.
    pub async fn stat(&self, session: &SessionContext, path: &str) -> VfsResult<FileAttr> {
        let identity = session.identity()?;
        let path = normalize(path);

        match Region::classify(&path) {
            Region::Root | Region::StorageRoot => Ok(FileAttr::directory(VIRTUAL_DIR_PERM)),
            Region::Storage(visible) => {
                let real = self.sandbox.resolve(identity, visible, Intent::Read).await?;
                let meta = fs::metadata(&real).await?;
                Ok(FileAttr::from_metadata(&meta))
            }
            Region::Config => self.config_attr(session),
            Region::Invalid => Err(VfsError::not_found(path)),
        }
    }

    /// Open a file. Any write intent on `/config` opens it in write mode.
    pub async fn open(
        &self,
        session: &SessionContext,
        path: &str,
        flags: OpenFlags,
    ) -> VfsResult<OpenFile> {
        let identity = session.identity()?;
        let path = normalize(path);

        match Region::classify(&path) {
            Region::Root | Region::StorageRoot => Err(VfsError::IsADirectory(path)),
            Region::Storage(visible) => {
                let intent = if flags.wants_write() {
                    Intent::Write
                } else {
                    Intent::Read
                };
                let real = self.sandbox.resolve(identity, visible, intent).await?;
                let file = fs::OpenOptions::new()
                    .read(flags.read)
                    .write(flags.write && !flags.append)
                    .append(flags.append)
                    .create(flags.create && !flags.exclusive)
                    .create_new(flags.exclusive)
                    .truncate(flags.truncate)
                    .open(&real)
                    .await?;
                tracing::debug!(user_id = %identity.id, path = visible, ?flags, "opened file");
                Ok(OpenFile::Storage(file))
            }
            Region::Config => {
                let mode = if flags.wants_write() {
                    ChannelMode::Write
                } else {
                    ChannelMode::Read
                };
                let channel = ConfigChannel::open(self.registry.clone(), identity.id, mode)?;
                Ok(OpenFile::Config(channel))
            }
            Region::Invalid => Err(VfsError::not_found(path)),
        }
    }

    /// Create a directory (and any missing parents) in the sandbox.
    pub async fn mkdir(&self, session: &SessionContext, path: &str) -> VfsResult<()> {
        let identity = session.identity()?;
        let path = normalize(path);

        match Region::classify(&path) {
            Region::Storage(visible) => {
                let real = self.sandbox.resolve(identity, visible, Intent::Write).await?;
                fs::create_dir_all(&real).await?;
                tracing::debug!(user_id = %identity.id, path = visible, "mkdir");
                Ok(())
            }
            Region::Root | Region::StorageRoot | Region::Config => {
                Err(VfsError::permission_denied(path))
            }
            Region::Invalid => Err(VfsError::not_found(path)),
        }
    }

    /// Remove a file from the sandbox.
    pub async fn remove(&self, session: &SessionContext, path: &str) -> VfsResult<()> {
        let identity = session.identity()?;
        let path = normalize(path);

        match Region::classify(&path) {
            Region::Storage(visible) => {
                let real = self.sandbox.resolve(identity, visible, Intent::Read).await?;
                fs::remove_file(&real).await?;
                tracing::debug!(user_id = %identity.id, path = visible, "remove");
                Ok(())
            }
            Region::Root | Region::StorageRoot | Region::Config => {
                Err(VfsError::permission_denied(path))
            }
            Region::Invalid => Err(VfsError::not_found(path)),
        }
    }

    /// Remove an empty directory from the sandbox.
    pub async fn rmdir(&self, session: &SessionContext, path: &str) -> VfsResult<()> {
        let identity = session.identity()?;
        let path = normalize(path);

        match Region::classify(&path) {
            Region::Storage(visible) => {
                let real = self.sandbox.resolve(identity, visible, Intent::Read).await?;
                fs::remove_dir(&real).await?;
                tracing::debug!(user_id = %identity.id, path = visible, "rmdir");
                Ok(())
            }
            Region::Root | Region::StorageRoot | Region::Config => {
                Err(VfsError::permission_denied(path))
            }
            Region::Invalid => Err(VfsError::not_found(path)),
        }
    }

    /// Canonical name of `path` for the session's working directory.
    pub fn realpath(&self, session: &SessionContext, path: &str) -> VfsResult<String> {
        session.identity()?;
        Ok(realpath(path))
    }

    /// `/config` attributes, sized from a fresh snapshot.
    fn config_attr(&self, session: &SessionContext) -> VfsResult<FileAttr> {
        let identity = session.identity()?;
        let size = config_channel::snapshot(&self.registry, identity.id)?.len() as u64;
        Ok(FileAttr::file(size, CONFIG_FILE_PERM))
    }
}
