use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A grouping entity with an optional expiry that may be referenced by many
/// keys. Expiring a lease cascade-tombstones every live key referencing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lease {
    pub id: i64,
    pub version: i64,
    /// Absent means the lease never expires.
    pub expires_at: Option<DateTime<Utc>>,
    pub expired: bool,
}
