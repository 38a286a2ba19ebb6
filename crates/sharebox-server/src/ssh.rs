//! SSH server for sharebox
//!
//! Accepts SSH connections, resolves the client's public key to an identity
//! once, and serves the `sftp` subsystem over that identity's namespace.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use russh::keys::ssh_key::{self, LineEnding};
use russh::keys::{Algorithm, PrivateKey};
use russh::server::{self, Auth, Msg, Server as _, Session};
use russh::{Channel, ChannelId};
use sharebox_kernel::{Namespace, SessionContext};
use sharebox_types::Credential;
use tokio::net::TcpListener;

use crate::constants::{SFTP_SUBSYSTEM, SSH_AUTH_REJECTION_DELAY};
use crate::sftp::SftpSession;

/// SSH server configuration
#[derive(Clone)]
pub struct SshServerConfig {
    pub bind_addr: SocketAddr,
    pub host_key: PrivateKey,
}

impl SshServerConfig {
    /// Create config with an ephemeral key (for testing)
    pub fn ephemeral(port: u16) -> anyhow::Result<Self> {
        let host_key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
            .context("generating host key")?;
        Ok(Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], port)),
            host_key,
        })
    }

    /// Load the host key from `key_path`, generating and saving an Ed25519
    /// key on first start.
    pub fn load_or_generate(bind_addr: SocketAddr, key_path: &Path) -> anyhow::Result<Self> {
        let host_key = if key_path.exists() {
            russh::keys::load_secret_key(key_path, None)
                .with_context(|| format!("loading host key {}", key_path.display()))?
        } else {
            let key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
                .context("generating host key")?;
            write_private_key(&key, key_path)?;
            log::info!("Generated new host key at {}", key_path.display());
            key
        };
        Ok(Self {
            bind_addr,
            host_key,
        })
    }
}

fn write_private_key(key: &PrivateKey, path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let pem = key
        .to_openssh(LineEnding::LF)
        .context("encoding host key")?;
    std::fs::write(path, pem.as_bytes())
        .with_context(|| format!("writing host key {}", path.display()))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

/// SSH server
pub struct SshServer {
    config: SshServerConfig,
    namespace: Arc<Namespace>,
}

impl SshServer {
    pub fn new(config: SshServerConfig, namespace: Arc<Namespace>) -> Self {
        Self { config, namespace }
    }

    /// Run the SSH server
    pub async fn run(&self) -> Result<(), std::io::Error> {
        let config = russh::server::Config {
            auth_rejection_time: SSH_AUTH_REJECTION_DELAY,
            auth_rejection_time_initial: Some(std::time::Duration::from_secs(0)),
            keys: vec![self.config.host_key.clone()],
            ..Default::default()
        };

        log::info!("Starting SSH server on {}", self.config.bind_addr);

        let mut server = Server {
            namespace: self.namespace.clone(),
        };
        let socket = TcpListener::bind(self.config.bind_addr).await?;

        server
            .run_on_socket(Arc::new(config), &socket)
            .await
            .map_err(std::io::Error::other)
    }
}

/// Server factory - creates handlers for each connection
struct Server {
    namespace: Arc<Namespace>,
}

impl server::Server for Server {
    type Handler = ConnectionHandler;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> Self::Handler {
        ConnectionHandler::new(self.namespace.clone(), peer_addr)
    }

    fn handle_session_error(&mut self, error: <Self::Handler as server::Handler>::Error) {
        log::error!("Session error: {:?}", error);
    }
}

/// Handler for a single SSH connection
struct ConnectionHandler {
    namespace: Arc<Namespace>,
    peer_addr: Option<SocketAddr>,
    session: SessionContext,
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl ConnectionHandler {
    fn new(namespace: Arc<Namespace>, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            namespace,
            peer_addr,
            session: SessionContext::unauthenticated(),
            channels: HashMap::new(),
        }
    }

    /// Resolve the offered key. Any failure leaves the session
    /// unauthenticated rather than refusing the connection.
    fn resolve_session(&self, public_key: &ssh_key::PublicKey) -> SessionContext {
        let credential = match public_key
            .to_openssh()
            .map_err(anyhow::Error::from)
            .and_then(|text| Credential::from_openssh(&text).map_err(anyhow::Error::from))
        {
            Ok(credential) => credential,
            Err(e) => {
                log::warn!("Unusable public key from {:?}: {}", self.peer_addr, e);
                return SessionContext::unauthenticated();
            }
        };

        match SessionContext::authenticate(self.namespace.registry(), Some(&credential)) {
            Ok(session) => session,
            Err(e) => {
                log::error!("Registry lookup failed for {:?}: {}", self.peer_addr, e);
                SessionContext::unauthenticated()
            }
        }
    }
}

impl server::Handler for ConnectionHandler {
    type Error = russh::Error;

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &ssh_key::PublicKey,
    ) -> Result<Auth, Self::Error> {
        self.session = self.resolve_session(public_key);
        match self.session.identity() {
            Ok(identity) => log::info!("Auth from {} as {}", user, identity),
            Err(_) => log::warn!(
                "Auth from {} ({:?}) with unregistered key; session sees an empty namespace",
                user,
                self.peer_addr
            ),
        }
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        log::debug!("Channel {} opened", channel.id());
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if name != SFTP_SUBSYSTEM {
            log::warn!("Refusing subsystem {:?} on channel {}", name, channel_id);
            session.channel_failure(channel_id)?;
            return Ok(());
        }

        let Some(channel) = self.channels.remove(&channel_id) else {
            session.channel_failure(channel_id)?;
            return Ok(());
        };

        session.channel_success(channel_id)?;
        let sftp = SftpSession::new(self.namespace.clone(), self.session.clone());
        russh_sftp::server::run(channel.into_stream(), sftp).await;
        log::info!("SFTP session started on channel {}", channel_id);
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        log::debug!("Channel {} closed", channel);
        self.channels.remove(&channel);
        Ok(())
    }
}
