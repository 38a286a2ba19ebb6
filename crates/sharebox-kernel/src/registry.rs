//! SQLite persistence for identities and share records.
//!
//! One connection behind one mutex: every registry call is a short critical
//! section, and `replace_shares` runs as a single transaction so an owner's
//! share set is swapped all-or-nothing.

use std::path::Path;
use std::str::FromStr;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use sharebox_types::{
    Credential, CredentialError, Identity, NewShare, ShareId, ShareMode, ShareRecord, UserId,
};

/// Registry error type.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The store rejected or failed the statement.
    #[error("registry database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored mode column holds something other than R/W/RW.
    #[error("stored share {id} has invalid mode `{mode}`")]
    CorruptMode { id: i64, mode: String },

    /// A stored credential no longer parses.
    #[error("stored credential is malformed: {0}")]
    CorruptCredential(#[from] CredentialError),
}

/// Registry result type.
pub type RegistryResult<T> = Result<T, RegistryError>;

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Registered clients, one per public key
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pubkey TEXT UNIQUE NOT NULL,
    created_at INTEGER DEFAULT (unixepoch())
);

-- Declarative grants, replaced per owner as a set
CREATE TABLE IF NOT EXISTS shares (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL REFERENCES users(id),
    path TEXT NOT NULL,
    mode TEXT NOT NULL CHECK (mode IN ('R', 'W', 'RW')),
    user_id INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_shares_owner ON shares(owner_id, id);
"#;

/// Database handle for the identity and share registries.
pub struct Registry {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("conn", &"<locked>").finish()
    }
}

impl Registry {
    /// Open or create a registry at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> RegistryResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory registry (for testing).
    pub fn in_memory() -> RegistryResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // =========================================================================
    // Identities
    // =========================================================================

    /// Look up the identity registered with `credential`.
    pub fn find_identity(&self, credential: &Credential) -> RegistryResult<Option<Identity>> {
        let conn = self.conn.lock();
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM users WHERE pubkey = ?1",
                params![credential.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(|id| Identity::new(UserId::new(id), credential.clone())))
    }

    /// Look up an identity by id.
    pub fn identity(&self, id: UserId) -> RegistryResult<Option<Identity>> {
        let conn = self.conn.lock();
        let pubkey: Option<String> = conn
            .query_row(
                "SELECT pubkey FROM users WHERE id = ?1",
                params![id.get()],
                |row| row.get(0),
            )
            .optional()?;
        match pubkey {
            Some(pubkey) => Ok(Some(Identity::new(id, Credential::from_openssh(&pubkey)?))),
            None => Ok(None),
        }
    }

    /// Register a credential, returning the existing identity if it is
    /// already known.
    pub fn register(&self, credential: &Credential) -> RegistryResult<Identity> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO users (pubkey) VALUES (?1)",
            params![credential.as_str()],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM users WHERE pubkey = ?1",
            params![credential.as_str()],
            |row| row.get(0),
        )?;
        Ok(Identity::new(UserId::new(id), credential.clone()))
    }

    /// List all identities in registration order.
    pub fn list_identities(&self) -> RegistryResult<Vec<Identity>> {
        let rows: Vec<(i64, String)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare("SELECT id, pubkey FROM users ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter()
            .map(|(id, pubkey)| {
                Ok(Identity::new(UserId::new(id), Credential::from_openssh(&pubkey)?))
            })
            .collect()
    }

    // =========================================================================
    // Shares
    // =========================================================================

    /// All current shares of `owner`, ordered by share id.
    pub fn list_shares(&self, owner: UserId) -> RegistryResult<Vec<ShareRecord>> {
        let rows: Vec<(i64, String, String, i64)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT id, path, mode, user_id FROM shares WHERE owner_id = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(params![owner.get()], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter()
            .map(|(id, path, mode, user_id)| {
                let mode = ShareMode::from_str(&mode)
                    .map_err(|_| RegistryError::CorruptMode { id, mode })?;
                Ok(ShareRecord {
                    id: ShareId::new(id),
                    owner_id: owner,
                    path,
                    mode,
                    grantee_id: UserId::new(user_id),
                })
            })
            .collect()
    }

    /// Atomically replace every share of `owner` with `shares`.
    ///
    /// Ids are always assigned here. On any error the transaction is rolled
    /// back and the previous set stays in place.
    pub fn replace_shares(
        &self,
        owner: UserId,
        shares: &[NewShare],
    ) -> RegistryResult<Vec<ShareRecord>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let removed = tx.execute("DELETE FROM shares WHERE owner_id = ?1", params![owner.get()])?;

        let mut inserted = Vec::with_capacity(shares.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO shares (owner_id, path, mode, user_id) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for share in shares {
                stmt.execute(params![
                    owner.get(),
                    share.path,
                    share.mode.as_str(),
                    share.grantee_id.get(),
                ])?;
                inserted.push(ShareRecord {
                    id: ShareId::new(tx.last_insert_rowid()),
                    owner_id: owner,
                    path: share.path.clone(),
                    mode: share.mode,
                    grantee_id: share.grantee_id,
                });
            }
        }

        tx.commit()?;
        tracing::debug!(
            owner = %owner,
            removed,
            inserted = inserted.len(),
            "replaced share set"
        );
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred(tag: &str) -> Credential {
        Credential::from_openssh(&format!("ssh-ed25519 AAAA{tag}")).unwrap()
    }

    fn share(path: &str, mode: ShareMode, grantee: i64) -> NewShare {
        NewShare {
            path: path.into(),
            mode,
            grantee_id: UserId::new(grantee),
        }
    }

    #[test]
    fn test_register_and_find() {
        let db = Registry::in_memory().unwrap();
        let amy = db.register(&cred("amy")).unwrap();

        let found = db.find_identity(&cred("amy")).unwrap().unwrap();
        assert_eq!(found, amy);
        assert!(db.find_identity(&cred("nobody")).unwrap().is_none());
    }

    #[test]
    fn test_register_is_idempotent() {
        let db = Registry::in_memory().unwrap();
        let first = db.register(&cred("amy")).unwrap();
        let again = db.register(&cred("amy")).unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(db.list_identities().unwrap().len(), 1);
    }

    #[test]
    fn test_ids_increase() {
        let db = Registry::in_memory().unwrap();
        let a = db.register(&cred("a")).unwrap();
        let b = db.register(&cred("b")).unwrap();
        assert!(b.id > a.id);

        let listed = db.list_identities().unwrap();
        assert_eq!(listed, vec![a.clone(), b]);
        assert_eq!(db.identity(a.id).unwrap(), Some(a));
        assert!(db.identity(UserId::new(999)).unwrap().is_none());
    }

    #[test]
    fn test_replace_and_list() {
        let db = Registry::in_memory().unwrap();
        let owner = db.register(&cred("owner")).unwrap().id;

        let stored = db
            .replace_shares(owner, &[share("docs", ShareMode::Read, 2), share("pics", ShareMode::ReadWrite, 3)])
            .unwrap();
        assert_eq!(stored.len(), 2);

        let listed = db.list_shares(owner).unwrap();
        assert_eq!(listed, stored);
        assert_eq!(listed[0].path, "docs");
        assert_eq!(listed[1].mode, ShareMode::ReadWrite);
    }

    #[test]
    fn test_replace_discards_previous_set() {
        let db = Registry::in_memory().unwrap();
        let owner = db.register(&cred("owner")).unwrap().id;

        db.replace_shares(owner, &[share("old", ShareMode::Write, 2)]).unwrap();
        db.replace_shares(owner, &[share("new", ShareMode::Read, 2)]).unwrap();

        let listed = db.list_shares(owner).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "new");

        db.replace_shares(owner, &[]).unwrap();
        assert!(db.list_shares(owner).unwrap().is_empty());
    }

    #[test]
    fn test_ids_reassigned_on_each_replace() {
        let db = Registry::in_memory().unwrap();
        let owner = db.register(&cred("owner")).unwrap().id;

        let first = db.replace_shares(owner, &[share("docs", ShareMode::Read, 2)]).unwrap();
        let second = db.replace_shares(owner, &[share("docs", ShareMode::Read, 2)]).unwrap();
        assert!(second[0].id > first[0].id);
    }

    #[test]
    fn test_unknown_owner_rolls_back() {
        let db = Registry::in_memory().unwrap();
        let result = db.replace_shares(UserId::new(77), &[share("docs", ShareMode::Read, 1)]);
        assert!(matches!(result, Err(RegistryError::Sqlite(_))));
        assert!(db.list_shares(UserId::new(77)).unwrap().is_empty());
    }

    #[test]
    fn test_failed_replace_keeps_prior_set() {
        let db = Registry::in_memory().unwrap();
        let owner = db.register(&cred("owner")).unwrap().id;
        db.replace_shares(owner, &[share("keep", ShareMode::Read, 2)]).unwrap();

        // Fail the second insert, after the delete and the first insert ran.
        db.conn
            .lock()
            .execute_batch(
                "CREATE TRIGGER boom BEFORE INSERT ON shares WHEN NEW.path = 'boom'
                 BEGIN SELECT RAISE(ABORT, 'boom'); END;",
            )
            .unwrap();

        let result = db.replace_shares(
            owner,
            &[share("a", ShareMode::Write, 3), share("boom", ShareMode::Read, 4)],
        );
        assert!(matches!(result, Err(RegistryError::Sqlite(_))), "{result:?}");

        let listed = db.list_shares(owner).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "keep");
        assert_eq!(listed[0].mode, ShareMode::Read);
    }

    #[test]
    fn test_owners_are_isolated() {
        let db = Registry::in_memory().unwrap();
        let a = db.register(&cred("a")).unwrap().id;
        let b = db.register(&cred("b")).unwrap().id;

        db.replace_shares(b, &[share("b-docs", ShareMode::Read, a.get())]).unwrap();
        db.replace_shares(a, &[share("a-docs", ShareMode::Write, b.get())]).unwrap();
        db.replace_shares(a, &[]).unwrap();

        let b_shares = db.list_shares(b).unwrap();
        assert_eq!(b_shares.len(), 1);
        assert_eq!(b_shares[0].path, "b-docs");
    }

    #[test]
    fn test_open_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sharebox.db");
        let owner = {
            let db = Registry::open(&path).unwrap();
            let owner = db.register(&cred("amy")).unwrap().id;
            db.replace_shares(owner, &[share("docs", ShareMode::Read, 2)]).unwrap();
            owner
        };

        let db = Registry::open(&path).unwrap();
        assert_eq!(db.find_identity(&cred("amy")).unwrap().unwrap().id, owner);
        assert_eq!(db.list_shares(owner).unwrap().len(), 1);
    }
}
