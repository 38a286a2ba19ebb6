//! Virtual filesystem namespace.
//!
//! Key components:
//!
//! - [`Namespace`] - Routes every operation by path region
//! - [`SandboxResolver`] - Maps `/storage/...` into a per-identity directory
//! - [`ConfigChannel`] - The `/config` read snapshot / write-then-commit object
//! - [`SessionContext`] - Who the connection is, resolved once
//!
//! ## Design Decisions
//!
//! - **Path-based, no inodes**: operations take client-visible paths; the
//!   transport adapter owns handle tables.
//! - **One answer for "not yours"**: unauthenticated sessions, paths outside
//!   the three regions and sandbox escapes all surface as NotFound.
//! - **Commit on close**: `/config` writes are buffered per open and only
//!   reach the registry when that handle is closed.

mod config_channel;
mod error;
mod handle;
mod namespace;
mod sandbox;
mod session;
mod types;

pub use config_channel::{
    CONFIG_PATH, ChannelMode, ConfigChannel, decode as decode_config, encode as encode_config,
    snapshot as config_snapshot,
};
pub use error::{VfsError, VfsResult};
pub use handle::OpenFile;
pub use namespace::{Namespace, Region, normalize, realpath};
pub use sandbox::{Intent, STORAGE_PREFIX, SandboxResolver};
pub use session::SessionContext;
pub use types::{
    CONFIG_FILE_PERM, DirEntry, FileAttr, FileType, MAX_READ_LEN, OpenFlags, VIRTUAL_DIR_PERM,
};
