//! Shared identity and share types for sharebox.
//!
//! This crate is the relational foundation: typed IDs, credentials,
//! identities and share records. It has **no internal sharebox
//! dependencies**; it is the leaf crate that the kernel and server build on.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Identity (UserId) ← one registered SSH public key
//!     └── authenticates via Credential (normalized OpenSSH key text)
//!     └── owns a sandbox (sha256(credential) under the storage root)
//!     └── owns ShareRecord (ShareId), replaced as a set
//!
//! ShareRecord (ShareId)
//!     └── path inside the owner's sandbox
//!     └── mode (R / W / RW)
//!     └── grantee (UserId, declarative only)
//! ```
//!
//! # Key Types
//!
//! |-------------------|----------------------------------------------|
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`Identity`]      | Registered client (id + credential)          |
//! | [`Credential`]    | Normalized public key text                   |
//! | [`UserId`]        | Who (assigned by the registry)               |
//! | [`ShareId`]       | Which share record                           |
//! | [`ShareRecord`]   | Persisted grant                              |
//! | [`ShareEntry`]    | One element of the canonical `/config` doc   |
//! | [`NewShare`]      | Candidate grant awaiting id assignment       |
//! |-------------------|----------------------------------------------|

pub mod identity;
pub mod ids;
pub mod share;

// Re-export primary types at crate root for convenience.
pub use identity::{Credential, CredentialError, Identity};
pub use ids::{ShareId, UserId};
pub use share::{NewShare, ShareEntry, ShareMode, ShareRecord};
