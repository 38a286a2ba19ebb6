//! Sharebox server library
//!
//! SSH transport and SFTP subsystem over the sharebox kernel.

pub mod config;
pub mod constants;
pub mod sftp;
pub mod ssh;

pub use config::ServerConfig;
pub use sftp::SftpSession;
pub use ssh::{SshServer, SshServerConfig};
