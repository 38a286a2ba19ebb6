//! Per-connection session context.

use sharebox_types::{Credential, Identity};

use crate::registry::{Registry, RegistryResult};
use crate::vfs::error::{VfsError, VfsResult};

/// Who a connection is, fixed once at authentication.
///
/// `identity` is `None` for a key the registry doesn't know; such a session
/// can connect but every namespace operation fails with NotFound.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    identity: Option<Identity>,
}

impl SessionContext {
    /// Resolve the transport-supplied credential against the registry.
    pub fn authenticate(
        registry: &Registry,
        credential: Option<&Credential>,
    ) -> RegistryResult<Self> {
        let identity = match credential {
            Some(credential) => registry.find_identity(credential)?,
            None => None,
        };
        Ok(Self { identity })
    }

    /// A session for an already-resolved identity.
    pub fn for_identity(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    /// A session with no identity.
    pub fn unauthenticated() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// The resolved identity, or `Unauthenticated`.
    pub fn identity(&self) -> VfsResult<&Identity> {
        self.identity.as_ref().ok_or(VfsError::Unauthenticated)
    }
}
