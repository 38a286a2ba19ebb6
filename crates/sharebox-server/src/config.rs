//! Startup configuration.
//!
//! Everything the server needs is derived from one data root chosen on the
//! command line. The value is built once in `main` and handed to
//! constructors; nothing reads it from a global.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use sharebox_kernel::{Namespace, Registry, SandboxResolver};

use crate::constants::{DB_FILE_NAME, HOST_KEY_FILE_NAME, STORAGE_DIR_NAME};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory holding the registry, the host key and all sandboxes.
    pub data_root: PathBuf,
    /// Address the SSH listener binds.
    pub bind_addr: SocketAddr,
}

impl ServerConfig {
    pub fn new(data_root: impl Into<PathBuf>, bind_addr: SocketAddr) -> Self {
        Self {
            data_root: data_root.into(),
            bind_addr,
        }
    }

    /// Registry database path.
    pub fn db_path(&self) -> PathBuf {
        self.data_root.join(DB_FILE_NAME)
    }

    /// Parent directory of every sandbox.
    pub fn storage_root(&self) -> PathBuf {
        self.data_root.join(STORAGE_DIR_NAME)
    }

    /// OpenSSH-format host key path.
    pub fn host_key_path(&self) -> PathBuf {
        self.data_root.join(HOST_KEY_FILE_NAME)
    }

    /// Create the data root layout and open the registry.
    ///
    /// Fails if the registry can't be opened; the server must not start
    /// accepting sessions without it.
    pub fn open_registry(&self) -> anyhow::Result<Arc<Registry>> {
        ensure_dir(&self.data_root)?;
        let registry = Registry::open(self.db_path())
            .with_context(|| format!("opening registry at {}", self.db_path().display()))?;
        Ok(Arc::new(registry))
    }

    /// Build the namespace over an opened registry.
    pub fn namespace(&self, registry: Arc<Registry>) -> anyhow::Result<Namespace> {
        ensure_dir(&self.storage_root())?;
        Ok(Namespace::new(
            registry,
            SandboxResolver::new(self.storage_root()),
        ))
    }
}

fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(path).with_context(|| format!("creating {}", path.display()))
}
