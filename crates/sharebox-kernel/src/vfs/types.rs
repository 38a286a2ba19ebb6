//! Core VFS types.
//!
//! Path-based and transport-neutral: the SFTP adapter translates these to
//! its own attribute and flag types.

use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::time::SystemTime;

/// Permission bits reported for the virtual directories `/` and `/storage`.
pub const VIRTUAL_DIR_PERM: u32 = 0o555;

/// Permission bits reported for `/config`: owner read/write only.
pub const CONFIG_FILE_PERM: u32 = 0o600;

/// Largest single read served, matching OpenSSH's per-request limit.
pub const MAX_READ_LEN: u32 = 256 * 1024;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

impl From<std::fs::FileType> for FileType {
    fn from(ft: std::fs::FileType) -> Self {
        if ft.is_dir() {
            FileType::Directory
        } else if ft.is_symlink() {
            FileType::Symlink
        } else {
            FileType::File
        }
    }
}

/// File attributes (metadata).
#[derive(Debug, Clone)]
pub struct FileAttr {
    /// Size in bytes.
    pub size: u64,
    /// File type.
    pub kind: FileType,
    /// Unix permission bits (e.g., 0o644), without the type bits.
    pub perm: u32,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last access time (optional).
    pub atime: Option<SystemTime>,
    /// User ID (local files only).
    pub uid: Option<u32>,
    /// Group ID (local files only).
    pub gid: Option<u32>,
}

impl FileAttr {
    /// Attributes for a virtual file.
    pub fn file(size: u64, perm: u32) -> Self {
        let now = SystemTime::now();
        Self {
            size,
            kind: FileType::File,
            perm,
            mtime: now,
            atime: Some(now),
            uid: None,
            gid: None,
        }
    }

    /// Attributes for a virtual directory.
    pub fn directory(perm: u32) -> Self {
        let now = SystemTime::now();
        Self {
            size: 0,
            kind: FileType::Directory,
            perm,
            mtime: now,
            atime: Some(now),
            uid: None,
            gid: None,
        }
    }

    /// Attributes of a real file.
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        Self {
            size: meta.len(),
            kind: meta.file_type().into(),
            perm: meta.permissions().mode() & 0o7777,
            mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            atime: meta.accessed().ok(),
            uid: Some(meta.uid()),
            gid: Some(meta.gid()),
        }
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Directory entry.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Entry attributes.
    pub attr: FileAttr,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn new(name: impl Into<String>, attr: FileAttr) -> Self {
        Self {
            name: name.into(),
            attr,
        }
    }
}

/// Open file flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Read access requested.
    pub read: bool,
    /// Write access requested.
    pub write: bool,
    /// Append mode.
    pub append: bool,
    /// Create if not exists.
    pub create: bool,
    /// Truncate on open.
    pub truncate: bool,
    /// Exclusive create (fail if exists).
    pub exclusive: bool,
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self {
            read: true,
            write: false,
            append: false,
            create: false,
            truncate: false,
            exclusive: false,
        }
    }
}

impl OpenFlags {
    /// Read-only access.
    pub fn read() -> Self {
        Self::default()
    }

    /// Create and truncate for writing, like `open(path, "w")`.
    pub fn create_truncate() -> Self {
        Self {
            read: false,
            write: true,
            create: true,
            truncate: true,
            ..Default::default()
        }
    }

    /// Read and write an existing file.
    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Default::default()
        }
    }

    /// Whether this open can modify anything.
    pub fn wants_write(&self) -> bool {
        self.write || self.append || self.create || self.truncate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type() {
        assert!(FileType::File.is_file());
        assert!(!FileType::File.is_dir());
        assert!(FileType::Directory.is_dir());
        assert!(!FileType::Symlink.is_file());
    }

    #[test]
    fn test_virtual_attrs() {
        let file = FileAttr::file(1024, CONFIG_FILE_PERM);
        assert!(file.is_file());
        assert_eq!(file.size, 1024);
        assert_eq!(file.perm, 0o600);

        let dir = FileAttr::directory(VIRTUAL_DIR_PERM);
        assert!(dir.is_dir());
        assert_eq!(dir.perm, 0o555);
    }

    #[test]
    fn test_open_flags() {
        let read = OpenFlags::read();
        assert!(read.read);
        assert!(!read.wants_write());

        let create = OpenFlags::create_truncate();
        assert!(create.wants_write());
        assert!(!create.read);

        assert!(OpenFlags::read_write().wants_write());
    }

    #[test]
    fn test_attr_from_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, b"hello").unwrap();

        let attr = FileAttr::from_metadata(&std::fs::metadata(&path).unwrap());
        assert!(attr.is_file());
        assert_eq!(attr.size, 5);
        assert!(attr.uid.is_some());
        assert_eq!(attr.perm & !0o7777, 0);
    }
}
