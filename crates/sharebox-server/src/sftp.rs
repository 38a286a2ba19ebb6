//! SFTP subsystem handler.
//!
//! Translates SFTP requests into [`Namespace`] operations for one
//! connection. Handles live in a per-session table; dropping the session
//! (client disconnect) drops every open handle, which discards any
//! uncommitted `/config` write.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags as SftpOpenFlags, Status,
    StatusCode, Version,
};
use russh_sftp::server::Handler;
use sharebox_kernel::vfs::MAX_READ_LEN;
use sharebox_kernel::{
    DirEntry, FileAttr, FileType, Namespace, OpenFile, OpenFlags, SessionContext, VfsError,
};

use crate::constants::READDIR_PAGE_SIZE;

const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;
const S_IFLNK: u32 = 0o120000;

enum HandleState {
    File(OpenFile),
    /// Listing snapshot taken at OPENDIR; `cursor` is the next entry to send.
    Dir { entries: Vec<DirEntry>, cursor: usize },
}

/// One SFTP session, bound to the connection's identity.
pub struct SftpSession {
    namespace: Arc<Namespace>,
    session: SessionContext,
    handles: HashMap<String, HandleState>,
    next_handle: u64,
    version: Option<u32>,
}

impl SftpSession {
    pub fn new(namespace: Arc<Namespace>, session: SessionContext) -> Self {
        Self {
            namespace,
            session,
            handles: HashMap::new(),
            next_handle: 0,
            version: None,
        }
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    fn insert(&mut self, state: HandleState) -> String {
        self.next_handle += 1;
        let handle = self.next_handle.to_string();
        self.handles.insert(handle.clone(), state);
        handle
    }

    fn file(&mut self, handle: &str) -> Result<&mut OpenFile, StatusCode> {
        match self.handles.get_mut(handle) {
            Some(HandleState::File(file)) => Ok(file),
            _ => Err(StatusCode::Failure),
        }
    }
}

/// Map a namespace error to the status a client sees.
fn status_of(op: &str, path: &str, err: VfsError) -> StatusCode {
    match &err {
        VfsError::Registry(_) => tracing::warn!(op, path, error = %err, "registry failure"),
        _ => tracing::debug!(op, path, error = %err, "request failed"),
    }

    let err: std::io::Error = err.into();
    match err.kind() {
        std::io::ErrorKind::NotFound => StatusCode::NoSuchFile,
        std::io::ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
        _ => StatusCode::Failure,
    }
}

fn ok(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

fn flags_of(pflags: SftpOpenFlags) -> OpenFlags {
    OpenFlags {
        read: pflags.contains(SftpOpenFlags::READ),
        write: pflags.contains(SftpOpenFlags::WRITE),
        append: pflags.contains(SftpOpenFlags::APPEND),
        create: pflags.contains(SftpOpenFlags::CREATE),
        truncate: pflags.contains(SftpOpenFlags::TRUNCATE),
        exclusive: pflags.contains(SftpOpenFlags::EXCLUDE),
    }
}

/// Namespace attributes in SFTP form.
pub fn sftp_attrs(attr: &FileAttr) -> FileAttributes {
    let type_bits = match attr.kind {
        FileType::Directory => S_IFDIR,
        FileType::File => S_IFREG,
        FileType::Symlink => S_IFLNK,
    };
    let secs = |t: std::time::SystemTime| {
        t.duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0)
    };

    FileAttributes {
        size: Some(attr.size),
        uid: attr.uid,
        gid: attr.gid,
        permissions: Some(type_bits | attr.perm),
        atime: attr.atime.map(secs),
        mtime: Some(secs(attr.mtime)),
        ..Default::default()
    }
}

impl Handler for SftpSession {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        if self.version.is_some() {
            tracing::warn!(version, "duplicate SSH_FXP_INIT");
            return Err(StatusCode::ConnectionLost);
        }
        self.version = Some(version);
        tracing::debug!(version, "sftp session initialized");
        Ok(Version::new())
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: SftpOpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let file = self
            .namespace
            .open(&self.session, &filename, flags_of(pflags))
            .await
            .map_err(|e| status_of("open", &filename, e))?;
        let handle = self.insert(HandleState::File(file));
        Ok(Handle { id, handle })
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        match self.handles.remove(&handle) {
            Some(HandleState::File(file)) => {
                file.close().await.map_err(|e| status_of("close", &handle, e))?;
                Ok(ok(id))
            }
            Some(HandleState::Dir { .. }) => Ok(ok(id)),
            None => Err(StatusCode::Failure),
        }
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let data = self
            .file(&handle)?
            .read(offset, len.min(MAX_READ_LEN))
            .await
            .map_err(|e| status_of("read", &handle, e))?;
        if data.is_empty() {
            return Err(StatusCode::Eof);
        }
        Ok(Data { id, data })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        self.file(&handle)?
            .write(offset, &data)
            .await
            .map_err(|e| status_of("write", &handle, e))?;
        Ok(ok(id))
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        self.stat(id, path).await
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let attr = self
            .file(&handle)?
            .stat()
            .await
            .map_err(|e| status_of("fstat", &handle, e))?;
        Ok(Attrs {
            id,
            attrs: sftp_attrs(&attr),
        })
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        let entries = self
            .namespace
            .readdir(&self.session, &path)
            .await
            .map_err(|e| status_of("opendir", &path, e))?;
        let handle = self.insert(HandleState::Dir { entries, cursor: 0 });
        Ok(Handle { id, handle })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        match self.handles.get_mut(&handle) {
            Some(HandleState::Dir { entries, cursor }) => {
                if *cursor >= entries.len() {
                    return Err(StatusCode::Eof);
                }
                let end = (*cursor + READDIR_PAGE_SIZE).min(entries.len());
                let files = entries[*cursor..end]
                    .iter()
                    .map(|entry| File::new(entry.name.clone(), sftp_attrs(&entry.attr)))
                    .collect();
                *cursor = end;
                Ok(Name { id, files })
            }
            _ => Err(StatusCode::Failure),
        }
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        self.namespace
            .remove(&self.session, &filename)
            .await
            .map_err(|e| status_of("remove", &filename, e))?;
        Ok(ok(id))
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        self.namespace
            .mkdir(&self.session, &path)
            .await
            .map_err(|e| status_of("mkdir", &path, e))?;
        Ok(ok(id))
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        self.namespace
            .rmdir(&self.session, &path)
            .await
            .map_err(|e| status_of("rmdir", &path, e))?;
        Ok(ok(id))
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let canonical = self
            .namespace
            .realpath(&self.session, &path)
            .map_err(|e| status_of("realpath", &path, e))?;
        Ok(Name {
            id,
            files: vec![File::dummy(canonical)],
        })
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let attr = self
            .namespace
            .stat(&self.session, &path)
            .await
            .map_err(|e| status_of("stat", &path, e))?;
        Ok(Attrs {
            id,
            attrs: sftp_attrs(&attr),
        })
    }
}
