use serde::{Deserialize, Serialize};

/// Maximum key length in bytes.
pub const MAX_KEY_SIZE: usize = 255;

/// Maximum value length in bytes.
pub const MAX_VALUE_SIZE: usize = 4 * 1024 * 1024;

/// A key-value entry.
///
/// The event log is the source of truth for the `*_ref` fields: each of them
/// is the id of the event that created, last updated, or tombstoned the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KV {
    pub key: String,
    pub value: Vec<u8>,

    /// Starts at 1 and increases by one on every mutation.
    pub version: i64,
    /// Id of the set event that created the current incarnation of the key.
    pub created_ref: i64,
    /// Id of the event of the latest mutation.
    pub updated_ref: i64,
    /// Id of the delete or expire event that tombstoned the key, zero while
    /// the key is live.
    pub deleted_ref: i64,
    /// The lease this key belongs to.
    pub lease_id: i64,
}

impl KV {
    #[must_use]
    pub fn is_tombstoned(&self) -> bool {
        self.deleted_ref != 0
    }
}
