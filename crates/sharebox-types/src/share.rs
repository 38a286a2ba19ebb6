//! Share records and the canonical `/config` document element.
//!
//! A share is declarative: it records that `owner_id` grants `grantee_id`
//! access to `path` at `mode`. Nothing in the storage path consults it.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

use crate::ids::{ShareId, UserId};

/// Permission level of a share.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum ShareMode {
    /// Read-only.
    #[serde(rename = "R")]
    #[strum(serialize = "R")]
    Read,
    /// Write-only.
    #[serde(rename = "W")]
    #[strum(serialize = "W")]
    Write,
    /// Read-write.
    #[serde(rename = "RW")]
    #[strum(serialize = "RW")]
    ReadWrite,
}

impl ShareMode {
    /// Wire/storage form: `"R"`, `"W"` or `"RW"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareMode::Read => "R",
            ShareMode::Write => "W",
            ShareMode::ReadWrite => "RW",
        }
    }
}

/// A persisted share record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShareRecord {
    pub id: ShareId,
    pub owner_id: UserId,
    /// Relative path inside the owner's sandbox.
    pub path: String,
    pub mode: ShareMode,
    pub grantee_id: UserId,
}

impl ShareRecord {
    /// The canonical document element for this record.
    pub fn to_entry(&self) -> ShareEntry {
        ShareEntry {
            id: self.id.get(),
            path: self.path.clone(),
            mode: self.mode,
            user_id: self.grantee_id.get(),
        }
    }
}

/// A share awaiting insertion; the registry assigns its id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewShare {
    pub path: String,
    pub mode: ShareMode,
    pub grantee_id: UserId,
}

/// One element of the canonical configuration document.
///
/// Field order here is the serialized field order. `id` is advisory on
/// input: it may be omitted, and a value that isn't an integer reads as 0.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareEntry {
    #[serde(default, deserialize_with = "advisory_id")]
    pub id: i64,
    pub path: String,
    pub mode: ShareMode,
    pub user_id: i64,
}

fn advisory_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Int(i64),
        Other(IgnoredAny),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Int(id) => id,
        Id::Other(_) => 0,
    })
}

impl ShareEntry {
    /// Drop the advisory id.
    pub fn into_new_share(self) -> NewShare {
        NewShare {
            path: self.path,
            mode: self.mode,
            grantee_id: UserId::new(self.user_id),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_wire_names() {
        assert_eq!(serde_json::to_string(&ShareMode::Read).unwrap(), "\"R\"");
        assert_eq!(serde_json::to_string(&ShareMode::ReadWrite).unwrap(), "\"RW\"");
        assert_eq!("W".parse::<ShareMode>().unwrap(), ShareMode::Write);
        assert_eq!(ShareMode::ReadWrite.to_string(), "RW");
        assert!("rw".parse::<ShareMode>().is_err());
    }

    #[test]
    fn test_entry_field_order() {
        let entry = ShareEntry {
            id: 4,
            path: "docs".into(),
            mode: ShareMode::Read,
            user_id: 2,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"id":4,"path":"docs","mode":"R","user_id":2}"#);
    }

    #[test]
    fn test_entry_id_is_optional() {
        let entry: ShareEntry =
            serde_json::from_str(r#"{"path":"a/b","mode":"RW","user_id":9}"#).unwrap();
        assert_eq!(entry.id, 0);
        let share = entry.into_new_share();
        assert_eq!(share.grantee_id, UserId::new(9));
        assert_eq!(share.mode, ShareMode::ReadWrite);
    }

    #[test]
    fn test_entry_id_of_any_type_is_ignored() {
        for doc in [
            r#"{"id":null,"path":"docs","mode":"R","user_id":2}"#,
            r#"{"id":"7","path":"docs","mode":"R","user_id":2}"#,
            r#"{"id":{"n":1},"path":"docs","mode":"R","user_id":2}"#,
        ] {
            let entry: ShareEntry = serde_json::from_str(doc).unwrap();
            assert_eq!(entry.id, 0, "{doc}");
            assert_eq!(entry.path, "docs");
        }

        let entry: ShareEntry =
            serde_json::from_str(r#"{"id":12,"path":"docs","mode":"R","user_id":2}"#).unwrap();
        assert_eq!(entry.id, 12);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let parsed = serde_json::from_str::<ShareEntry>(r#"{"path":"a","mode":"X","user_id":1}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_record_to_entry() {
        let record = ShareRecord {
            id: ShareId::new(11),
            owner_id: UserId::new(1),
            path: "photos".into(),
            mode: ShareMode::Write,
            grantee_id: UserId::new(3),
        };
        let entry = record.to_entry();
        assert_eq!(entry.id, 11);
        assert_eq!(entry.user_id, 3);
        assert_eq!(entry.mode, ShareMode::Write);
    }
}
