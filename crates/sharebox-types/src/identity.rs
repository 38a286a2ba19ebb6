//! Identity and credential types.
//!
//! An `Identity` is one registered client. It authenticates with exactly one
//! `Credential` (the SSH public key it was registered with) and owns the
//! sandbox derived from that credential.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::ids::UserId;

/// Errors from parsing credential text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("empty public key")]
    Empty,

    #[error("public key has no key material after algorithm `{0}`")]
    MissingKeyData(String),
}

/// Public-key material identifying a client.
///
/// Stored as the OpenSSH text form `"<algorithm> <base64>"` with any
/// trailing comment removed, so the same key always yields the same
/// credential regardless of how it was exported.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Normalize an OpenSSH public key line (`ssh-ed25519 AAAA... comment`).
    pub fn from_openssh(line: &str) -> Result<Self, CredentialError> {
        let mut fields = line.split_whitespace();
        let algorithm = fields.next().ok_or(CredentialError::Empty)?;
        let key_data = fields
            .next()
            .ok_or_else(|| CredentialError::MissingKeyData(algorithm.to_string()))?;
        Ok(Self(format!("{algorithm} {key_data}")))
    }

    /// The normalized key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory name of this credential's sandbox.
    ///
    /// Lowercase hex SHA-256 of the key text: fixed length, no path
    /// separators, identical across restarts.
    pub fn sandbox_name(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A registered client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable identifier assigned at registration.
    pub id: UserId,
    /// The key this identity authenticates with.
    pub credential: Credential,
}

impl Identity {
    pub fn new(id: UserId, credential: Credential) -> Self {
        Self { id, credential }
    }

    /// Shorthand for `self.credential.sandbox_name()`.
    pub fn sandbox_name(&self) -> String {
        self.credential.sandbox_name()
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.sandbox_name();
        write!(f, "user {} ({})", self.id, &name[..12])
    }
}

// ============================================================================
// Tests
// ============================================================================
