use chrono::{DateTime, Utc};

/// Options for a set operation.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Expiry stamped on the key's lease. `None` means no expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Attach the key to an existing lease instead of allocating a fresh one.
    /// Zero allocates on create and keeps the current lease on update.
    pub lease_id: i64,
    /// Require the current version to match. Zero skips the check.
    pub prev_version: i64,
    /// Fail if the key already exists, tombstoned or not.
    pub create_only: bool,
}

impl SetOptions {
    #[must_use]
    pub fn with_expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    #[must_use]
    pub fn with_lease_id(mut self, lease_id: i64) -> Self {
        self.lease_id = lease_id;
        self
    }

    #[must_use]
    pub fn with_prev_version(mut self, version: i64) -> Self {
        self.prev_version = version;
        self
    }

    #[must_use]
    pub fn create_only(mut self) -> Self {
        self.create_only = true;
        self
    }
}
