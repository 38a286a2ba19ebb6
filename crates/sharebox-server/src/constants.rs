//! Server configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Default SSH port for the sharebox server.
pub const DEFAULT_SSH_PORT: u16 = 8022;

/// Default bind address (all interfaces; this is a network file server).
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// SSH authentication rejection delay (prevents timing attacks).
pub const SSH_AUTH_REJECTION_DELAY: Duration = Duration::from_secs(1);

/// Registry database file, relative to the data root.
pub const DB_FILE_NAME: &str = "sharebox.db";

/// Directory holding every sandbox, relative to the data root.
pub const STORAGE_DIR_NAME: &str = "storage";

/// Host key file, relative to the data root.
pub const HOST_KEY_FILE_NAME: &str = "host_ed25519";

/// The only SSH subsystem served.
pub const SFTP_SUBSYSTEM: &str = "sftp";

/// Directory entries sent per READDIR reply.
pub const READDIR_PAGE_SIZE: usize = 100;
