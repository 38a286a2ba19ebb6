//! Sharebox server binary
//!
//! SSH + SFTP file server with per-key sandboxes and a `/config` share
//! document.
//!
//! ## Usage
//!
//! ```bash
//! # Run the server (default)
//! sharebox-server --root /srv/sharebox
//! sharebox-server --root /srv/sharebox serve --port 2222
//!
//! # Key management
//! sharebox-server --root /srv/sharebox add-key ~/.ssh/id_ed25519.pub
//! sharebox-server --root /srv/sharebox list-users
//! sharebox-server --root /srv/sharebox list-shares 1
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sharebox_kernel::vfs::config_snapshot;
use sharebox_server::constants::{DEFAULT_BIND_ADDRESS, DEFAULT_SSH_PORT};
use sharebox_server::{ServerConfig, SshServer, SshServerConfig};
use sharebox_types::{Credential, UserId};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// SSH + SFTP file server with per-key sandboxes.
#[derive(Parser, Debug)]
#[command(name = "sharebox-server")]
#[command(about = "SFTP file server with per-key sandboxes")]
struct Args {
    /// Data directory holding the registry, host key and sandboxes
    #[arg(long, default_value = "~/.local/share/sharebox")]
    root: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the SSH server (default)
    Serve {
        /// Address to bind
        #[arg(long, default_value = DEFAULT_BIND_ADDRESS)]
        bind: IpAddr,

        /// SSH port
        #[arg(long, default_value_t = DEFAULT_SSH_PORT)]
        port: u16,
    },
    /// Register an OpenSSH public key
    AddKey {
        /// Public key file (e.g. ~/.ssh/id_ed25519.pub)
        file: String,
    },
    /// List registered identities
    ListUsers,
    /// Print the share document owned by a user
    ListShares {
        /// Owner id as shown by list-users
        user_id: UserId,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let data_root: PathBuf = shellexpand::tilde(&args.root).as_ref().into();

    match args.command {
        None => run_server(data_root, default_bind()).await,
        Some(Command::Serve { bind, port }) => {
            run_server(data_root, SocketAddr::new(bind, port)).await
        }
        Some(Command::AddKey { file }) => cmd_add_key(data_root, &file),
        Some(Command::ListUsers) => cmd_list_users(data_root),
        Some(Command::ListShares { user_id }) => cmd_list_shares(data_root, user_id),
    }
}

fn default_bind() -> SocketAddr {
    let ip = DEFAULT_BIND_ADDRESS
        .parse()
        .unwrap_or(IpAddr::from([0, 0, 0, 0]));
    SocketAddr::new(ip, DEFAULT_SSH_PORT)
}

async fn run_server(data_root: PathBuf, bind_addr: SocketAddr) -> ExitCode {
    let config = ServerConfig::new(data_root, bind_addr);
    tracing::info!(root = %config.data_root.display(), "Starting sharebox server");

    // Without the registry no session can be resolved; refuse to listen.
    let registry = match config.open_registry() {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!("Registry unavailable: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let namespace = match config.namespace(registry) {
        Ok(namespace) => Arc::new(namespace),
        Err(e) => {
            tracing::error!("Storage unavailable: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let ssh_config = match SshServerConfig::load_or_generate(bind_addr, &config.host_key_path())
    {
        Ok(ssh_config) => ssh_config,
        Err(e) => {
            tracing::error!("Host key unavailable: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let server = SshServer::new(ssh_config, namespace);
    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Register a public key and print its id and sandbox name.
fn cmd_add_key(data_root: PathBuf, file: &str) -> ExitCode {
    let key_path: PathBuf = shellexpand::tilde(file).as_ref().into();

    let key_data = match std::fs::read_to_string(&key_path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Failed to read {}: {}", key_path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let credential = match Credential::from_openssh(&key_data) {
        Ok(credential) => credential,
        Err(e) => {
            eprintln!("Failed to parse public key: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = ServerConfig::new(data_root, default_bind());
    let registry = match config.open_registry() {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Failed to open registry: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match registry.register(&credential) {
        Ok(identity) => {
            println!("Registered {}", identity);
            println!("  Id:      {}", identity.id);
            println!("  Sandbox: {}", identity.sandbox_name());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to register key: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// List every registered identity
fn cmd_list_users(data_root: PathBuf) -> ExitCode {
    let config = ServerConfig::new(data_root, default_bind());
    let registry = match config.open_registry() {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Failed to open registry: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let identities = match registry.list_identities() {
        Ok(identities) => identities,
        Err(e) => {
            eprintln!("Database error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if identities.is_empty() {
        println!("No users registered.");
        return ExitCode::SUCCESS;
    }

    println!("{:<6} {:<64} KEY", "ID", "SANDBOX");
    println!("{}", "-".repeat(100));
    for identity in identities {
        println!(
            "{:<6} {:<64} {}",
            identity.id,
            identity.sandbox_name(),
            identity.credential
        );
    }

    ExitCode::SUCCESS
}

/// Print the canonical share document for one owner
fn cmd_list_shares(data_root: PathBuf, user_id: UserId) -> ExitCode {
    let config = ServerConfig::new(data_root, default_bind());
    let registry = match config.open_registry() {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Failed to open registry: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match registry.identity(user_id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            eprintln!("No user with id {}", user_id);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Database error: {}", e);
            return ExitCode::FAILURE;
        }
    }

    match config_snapshot(&registry, user_id) {
        Ok(document) => {
            println!("{}", String::from_utf8_lossy(&document));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to read shares: {}", e);
            ExitCode::FAILURE
        }
    }
}
