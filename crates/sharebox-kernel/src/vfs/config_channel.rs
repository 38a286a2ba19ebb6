//! The `/config` channel.
//!
//! Each open of `/config` gets its own `ConfigChannel`. The mode is fixed at
//! open time:
//!
//! - **Read**: the owner's share set is rendered once into an immutable
//!   snapshot; reads are slices of it.
//! - **Write**: writes append to a private buffer; nothing touches the
//!   registry until `close`, which decodes the buffer and replaces the
//!   owner's whole share set in one transaction.
//!
//! ```text
//! open(mode) ──► read/write* ──► close ──► (commit if Write)
//! ```
//!
//! Dropping a write channel without closing it discards the buffer, which is
//! what happens when a client disconnects mid-upload.

use std::path::{Component, Path};
use std::sync::Arc;

use sharebox_types::{NewShare, ShareEntry, ShareRecord, UserId};

use crate::registry::Registry;
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::types::{CONFIG_FILE_PERM, FileAttr};

/// Client-visible path of the configuration object.
pub const CONFIG_PATH: &str = "/config";

/// Channel mode, fixed at open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    Read,
    Write,
}

/// A single open of `/config`.
pub struct ConfigChannel {
    registry: Arc<Registry>,
    owner: UserId,
    mode: ChannelMode,
    buffer: Vec<u8>,
    closed: bool,
}

impl std::fmt::Debug for ConfigChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigChannel")
            .field("owner", &self.owner)
            .field("mode", &self.mode)
            .field("buffered", &self.buffer.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl ConfigChannel {
    /// Open a channel for `owner`. Read mode takes the snapshot now.
    pub fn open(registry: Arc<Registry>, owner: UserId, mode: ChannelMode) -> VfsResult<Self> {
        let buffer = match mode {
            ChannelMode::Read => snapshot(&registry, owner)?,
            ChannelMode::Write => Vec::new(),
        };
        tracing::debug!(user_id = %owner, ?mode, "opened config channel");
        Ok(Self {
            registry,
            owner,
            mode,
            buffer,
            closed: false,
        })
    }

    /// Up to `len` bytes starting at `offset`; empty at or past the end.
    pub fn read(&self, offset: u64, len: u32) -> VfsResult<Vec<u8>> {
        self.check_open()?;
        let start = usize::try_from(offset)
            .unwrap_or(usize::MAX)
            .min(self.buffer.len());
        let end = start.saturating_add(len as usize).min(self.buffer.len());
        Ok(self.buffer[start..end].to_vec())
    }

    /// Append `data` to the pending document.
    ///
    /// The offset is not used: the channel only supports writing the whole
    /// document front to back.
    pub fn write(&mut self, _offset: u64, data: &[u8]) -> VfsResult<u32> {
        self.check_open()?;
        if self.mode == ChannelMode::Read {
            return Err(VfsError::permission_denied(CONFIG_PATH));
        }
        self.buffer.extend_from_slice(data);
        Ok(data.len() as u32)
    }

    /// Attributes of this open channel (size of what it currently holds).
    pub fn stat(&self) -> FileAttr {
        FileAttr::file(self.buffer.len() as u64, CONFIG_FILE_PERM)
    }

    /// Close the channel, committing the document in write mode.
    ///
    /// A document that fails to decode leaves the registry untouched.
    pub fn close(&mut self) -> VfsResult<()> {
        self.check_open()?;
        self.closed = true;

        if self.mode == ChannelMode::Read {
            return Ok(());
        }

        let shares = decode(&self.buffer)?;
        let stored = self.registry.replace_shares(self.owner, &shares)?;
        tracing::info!(user_id = %self.owner, shares = stored.len(), "committed share set");
        Ok(())
    }

    fn check_open(&self) -> VfsResult<()> {
        if self.closed {
            Err(VfsError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Drop for ConfigChannel {
    fn drop(&mut self) {
        if self.mode == ChannelMode::Write && !self.closed {
            tracing::debug!(
                user_id = %self.owner,
                discarded = self.buffer.len(),
                "config channel dropped before close; nothing committed"
            );
        }
    }
}

/// Render `owner`'s current share set as the canonical document.
pub fn snapshot(registry: &Registry, owner: UserId) -> VfsResult<Vec<u8>> {
    let shares = registry.list_shares(owner)?;
    encode(&shares)
}

/// Canonical encoding: pretty JSON array of `{id, path, mode, user_id}`.
pub fn encode(shares: &[ShareRecord]) -> VfsResult<Vec<u8>> {
    let entries: Vec<ShareEntry> = shares.iter().map(ShareRecord::to_entry).collect();
    serde_json::to_vec_pretty(&entries).map_err(|e| VfsError::malformed_config(e.to_string()))
}

/// Decode a canonical document into candidate shares.
///
/// Client-supplied ids are dropped. Each path must be relative to the
/// owner's sandbox and must not climb out of it.
pub fn decode(bytes: &[u8]) -> VfsResult<Vec<NewShare>> {
    let entries: Vec<ShareEntry> =
        serde_json::from_slice(bytes).map_err(|e| VfsError::malformed_config(e.to_string()))?;

    entries
        .into_iter()
        .map(|entry| {
            check_share_path(&entry.path)?;
            Ok(entry.into_new_share())
        })
        .collect()
}

fn check_share_path(path: &str) -> VfsResult<()> {
    if path.is_empty() {
        return Err(VfsError::malformed_config("share path is empty"));
    }
    let climbs = Path::new(path)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if climbs {
        return Err(VfsError::malformed_config(format!(
            "share path `{path}` must be relative to the sandbox"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharebox_types::{Credential, ShareMode};

    fn setup() -> (Arc<Registry>, UserId, UserId) {
        let registry = Arc::new(Registry::in_memory().unwrap());
        let one = registry
            .register(&Credential::from_openssh("ssh-ed25519 AAAAone").unwrap())
            .unwrap()
            .id;
        let two = registry
            .register(&Credential::from_openssh("ssh-ed25519 AAAAtwo").unwrap())
            .unwrap()
            .id;
        (registry, one, two)
    }

    fn write_doc(registry: &Arc<Registry>, owner: UserId, doc: &str) -> VfsResult<()> {
        let mut channel = ConfigChannel::open(registry.clone(), owner, ChannelMode::Write)?;
        channel.write(0, doc.as_bytes())?;
        channel.close()
    }

    fn read_doc(registry: &Arc<Registry>, owner: UserId) -> Vec<ShareEntry> {
        let channel = ConfigChannel::open(registry.clone(), owner, ChannelMode::Read).unwrap();
        let bytes = channel.read(0, u32::MAX).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_empty_snapshot_is_empty_array() {
        let (registry, one, _) = setup();
        let channel = ConfigChannel::open(registry, one, ChannelMode::Read).unwrap();
        assert_eq!(channel.read(0, 100).unwrap(), b"[]");
    }

    #[test]
    fn test_scenario_single_share() {
        let (registry, one, two) = setup();
        write_doc(
            &registry,
            one,
            &format!(r#"[{{"id":0,"path":"docs","mode":"R","user_id":{two}}}]"#),
        )
        .unwrap();

        let entries = read_doc(&registry, one);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "docs");
        assert_eq!(entries[0].mode, ShareMode::Read);
        assert_eq!(entries[0].user_id, two.get());

        let records = registry.list_shares(one).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].grantee_id, two);
    }

    #[test]
    fn test_client_ids_are_ignored() {
        let (registry, one, _) = setup();
        write_doc(&registry, one, r#"[{"id":9999,"path":"a","mode":"W","user_id":5}]"#).unwrap();
        let entries = read_doc(&registry, one);
        assert_ne!(entries[0].id, 9999);
    }

    #[test]
    fn test_null_id_is_accepted() {
        let shares = decode(br#"[{"id":null,"path":"docs","mode":"R","user_id":2}]"#).unwrap();
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].path, "docs");
        assert_eq!(shares[0].grantee_id, UserId::new(2));
    }

    #[test]
    fn test_malformed_document_leaves_registry() {
        let (registry, one, _) = setup();
        write_doc(&registry, one, r#"[{"path":"keep","mode":"RW","user_id":2}]"#).unwrap();
        let before = read_doc(&registry, one);

        for bad in [
            "",
            "not json",
            r#"[{"path":"x","mode":"Q","user_id":2}]"#,
            r#"[{"path":"ok","mode":"R","user_id":2},{"path":"../up","mode":"R","user_id":2}]"#,
            r#"[{"path":"/abs","mode":"R","user_id":2}]"#,
            r#"{"path":"x","mode":"R","user_id":2}"#,
        ] {
            let err = write_doc(&registry, one, bad).unwrap_err();
            assert!(matches!(err, VfsError::MalformedConfig(_)), "{bad}: {err:?}");
        }

        assert_eq!(read_doc(&registry, one), before);
    }

    #[test]
    fn test_identical_replace_is_stable() {
        let (registry, one, _) = setup();
        let doc = r#"[{"path":"a","mode":"R","user_id":2},{"path":"b","mode":"RW","user_id":3}]"#;
        write_doc(&registry, one, doc).unwrap();
        let first = read_doc(&registry, one);
        write_doc(&registry, one, doc).unwrap();
        let second = read_doc(&registry, one);

        let strip = |entries: Vec<ShareEntry>| {
            entries
                .into_iter()
                .map(|e| (e.path, e.mode, e.user_id))
                .collect::<Vec<_>>()
        };
        assert_eq!(strip(first), strip(second));
    }

    #[test]
    fn test_roundtrip_through_read_document() {
        let (registry, one, _) = setup();
        write_doc(&registry, one, r#"[{"path":"x/y","mode":"W","user_id":4}]"#).unwrap();

        // Feeding a read snapshot straight back must be accepted.
        let channel = ConfigChannel::open(registry.clone(), one, ChannelMode::Read).unwrap();
        let snapshot = channel.read(0, u32::MAX).unwrap();
        write_doc(&registry, one, std::str::from_utf8(&snapshot).unwrap()).unwrap();

        let entries = read_doc(&registry, one);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "x/y");
    }

    #[test]
    fn test_owners_isolated() {
        let (registry, one, two) = setup();
        write_doc(&registry, two, r#"[{"path":"mine","mode":"R","user_id":1}]"#).unwrap();
        write_doc(&registry, one, "[]").unwrap();
        write_doc(&registry, one, r#"[{"path":"p","mode":"R","user_id":2}]"#).unwrap();

        let theirs = read_doc(&registry, two);
        assert_eq!(theirs.len(), 1);
        assert_eq!(theirs[0].path, "mine");
    }

    #[test]
    fn test_chunked_writes_append() {
        let (registry, one, _) = setup();
        let doc = br#"[{"path":"docs","mode":"R","user_id":2}]"#;
        let mut channel = ConfigChannel::open(registry.clone(), one, ChannelMode::Write).unwrap();
        for (i, chunk) in doc.chunks(7).enumerate() {
            channel.write((i * 7) as u64, chunk).unwrap();
        }
        assert_eq!(channel.stat().size, doc.len() as u64);
        channel.close().unwrap();
        assert_eq!(registry.list_shares(one).unwrap().len(), 1);
    }

    #[test]
    fn test_read_slices() {
        let (registry, one, _) = setup();
        write_doc(&registry, one, r#"[{"path":"docs","mode":"R","user_id":2}]"#).unwrap();

        let channel = ConfigChannel::open(registry.clone(), one, ChannelMode::Read).unwrap();
        let full = channel.read(0, u32::MAX).unwrap();
        let mut pieced = Vec::new();
        let mut offset = 0u64;
        loop {
            let chunk = channel.read(offset, 5).unwrap();
            if chunk.is_empty() {
                break;
            }
            offset += chunk.len() as u64;
            pieced.extend(chunk);
        }
        assert_eq!(pieced, full);
        assert!(channel.read(u64::MAX, 10).unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_is_immutable() {
        let (registry, one, _) = setup();
        let reader = ConfigChannel::open(registry.clone(), one, ChannelMode::Read).unwrap();
        write_doc(&registry, one, r#"[{"path":"later","mode":"R","user_id":2}]"#).unwrap();
        assert_eq!(reader.read(0, 100).unwrap(), b"[]");
    }

    #[test]
    fn test_write_in_read_mode_refused() {
        let (registry, one, _) = setup();
        let mut channel = ConfigChannel::open(registry, one, ChannelMode::Read).unwrap();
        let err = channel.write(0, b"[]").unwrap_err();
        assert!(matches!(err, VfsError::PermissionDenied(_)));
        channel.close().unwrap();
    }

    #[test]
    fn test_drop_without_close_commits_nothing() {
        let (registry, one, _) = setup();
        write_doc(&registry, one, r#"[{"path":"keep","mode":"R","user_id":2}]"#).unwrap();
        {
            let mut channel =
                ConfigChannel::open(registry.clone(), one, ChannelMode::Write).unwrap();
            channel.write(0, b"[]").unwrap();
        }
        assert_eq!(registry.list_shares(one).unwrap()[0].path, "keep");
    }

    #[test]
    fn test_double_close() {
        let (registry, one, _) = setup();
        let mut channel = ConfigChannel::open(registry, one, ChannelMode::Write).unwrap();
        channel.write(0, b"[]").unwrap();
        channel.close().unwrap();
        assert!(matches!(channel.close(), Err(VfsError::Closed)));
        assert!(matches!(channel.read(0, 1), Err(VfsError::Closed)));
    }

    #[test]
    fn test_encode_is_pretty_and_ordered() {
        let (registry, one, _) = setup();
        write_doc(
            &registry,
            one,
            r#"[{"path":"b","mode":"R","user_id":2},{"path":"a","mode":"RW","user_id":3}]"#,
        )
        .unwrap();
        let bytes = snapshot(&registry, one).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\n  {"));
        assert!(text.find("\"b\"").unwrap() < text.find("\"a\"").unwrap());
        let id_pos = text.find("\"id\"").unwrap();
        assert!(id_pos < text.find("\"path\"").unwrap());
        assert!(text.find("\"mode\"").unwrap() < text.find("\"user_id\"").unwrap());
    }
}
