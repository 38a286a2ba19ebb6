//! # sharebox-kernel
//!
//! The data path of sharebox, independent of any wire protocol.
//!
//! A connection authenticates once into a [`SessionContext`]. Every request
//! after that goes through the [`Namespace`], which either maps it into the
//! caller's sandbox or opens a [`ConfigChannel`] over the caller's shares in
//! the [`Registry`]. The registry is the only state shared between
//! connections.

pub mod registry;
pub mod vfs;

pub use registry::{Registry, RegistryError, RegistryResult};
pub use vfs::{
    ChannelMode, ConfigChannel, DirEntry, FileAttr, FileType, Namespace, OpenFile, OpenFlags,
    SandboxResolver, SessionContext, VfsError, VfsResult,
};
