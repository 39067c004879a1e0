use std::sync::Arc;

use chrono::{DateTime, Utc};
use goku_types::{EventType, SetOptions, KV, MAX_KEY_SIZE, MAX_VALUE_SIZE};
use sqlx::SqlitePool;

use crate::error::{Error, ErrorType};
use crate::notify::EventNotifier;
use crate::store::{data, events, lease};
use crate::stream::Streamer;

/// Client for the key-value service.
///
/// Every mutation runs in a single transaction: the event append and the
/// `data`/`leases` updates land together or not at all. Reads are
/// non-transactional and observe post-commit state.
#[derive(Clone)]
pub struct Client {
    pool: SqlitePool,
    notifier: Arc<EventNotifier>,
}

impl Client {
    #[must_use]
    pub fn new(pool: SqlitePool, notifier: Arc<EventNotifier>) -> Self {
        Self { pool, notifier }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Write a value under a key. See [`SetOptions`] for conditional writes
    /// and lease placement.
    #[tracing::instrument(skip_all, fields(key = %key))]
    pub async fn set(&self, key: &str, value: &[u8], opts: SetOptions) -> Result<(), Error> {
        if key.is_empty() || key.len() > MAX_KEY_SIZE || key.contains('%') {
            return Err(ErrorType::InvalidKey.into());
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(ErrorType::InvalidValue.into());
        }

        let mut tx = self.pool.begin().await?;

        // Current row, tombstones included: the conditional checks count
        // them, and a tombstone's version still guards the update below.
        let existing = data::lookup(&mut tx, key).await?;
        let (mut lease_id, mut created_ref, old_version) = match &existing {
            None => (0, 0, 0),
            // A tombstoned key gets a fresh lease on re-create but keeps the
            // created_ref of its first incarnation.
            Some(kv) if kv.is_tombstoned() => (0, kv.created_ref, kv.version),
            Some(kv) => (kv.lease_id, kv.created_ref, kv.version),
        };

        if opts.create_only && old_version > 0 {
            return Err(ErrorType::Conditional.into());
        }
        if opts.prev_version > 0 && old_version != opts.prev_version {
            return Err(ErrorType::Conditional.into());
        }

        if opts.lease_id != 0 {
            lease_id = opts.lease_id;
        }

        let ref_id = events::insert(&mut tx, key, EventType::Set, value, Utc::now()).await?;

        if lease_id == 0 {
            lease_id = lease::insert(&mut tx, opts.expires_at).await?;
        } else {
            lease::update(&mut tx, lease_id, opts.expires_at).await?;
        }

        if created_ref == 0 {
            created_ref = ref_id;
        }

        if old_version == 0 {
            data::insert(&mut tx, key, value, created_ref, ref_id, lease_id).await?;
        } else {
            data::update(&mut tx, key, value, old_version, created_ref, ref_id, lease_id).await?;
        }

        tx.commit().await?;
        self.notifier.notify();
        Ok(())
    }

    /// Tombstone a key. The key's lease is left untouched; retiring leases
    /// is the expire path's job.
    #[tracing::instrument(skip_all, fields(key = %key))]
    pub async fn delete(&self, key: &str) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        let kv = data::lookup(&mut tx, key)
            .await?
            .ok_or(ErrorType::NotFound)?;
        if kv.is_tombstoned() {
            return Err(ErrorType::NotFound.into());
        }

        let ref_id = events::insert(&mut tx, key, EventType::Delete, &[], Utc::now()).await?;
        data::tombstone(&mut tx, key, kv.version, ref_id).await?;

        tx.commit().await?;
        self.notifier.notify();
        Ok(())
    }

    /// Read a live key.
    pub async fn get(&self, key: &str) -> Result<KV, Error> {
        data::get(&self.pool, key).await
    }

    /// All live keys starting with the prefix, in key order.
    pub async fn list(&self, prefix: &str) -> Result<Vec<KV>, Error> {
        data::list(&self.pool, prefix).await
    }

    /// Move a lease's expiry time. Lease mutations are not key events, so
    /// nothing is appended to the log.
    #[tracing::instrument(skip_all, fields(lease_id))]
    pub async fn update_lease(
        &self,
        lease_id: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        lease::update(&mut tx, lease_id, expires_at).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Retire a lease and tombstone every live key attached to it.
    #[tracing::instrument(skip_all, fields(lease_id))]
    pub async fn expire_lease(&self, lease_id: i64) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        let version = lease::version_if_live(&mut tx, lease_id)
            .await?
            .ok_or(ErrorType::LeaseNotFound(lease_id))?;

        let kvs = data::list_by_lease(&mut tx, lease_id).await?;

        // The lease version guard is what stops two expirers from both
        // running the cascade.
        lease::expire(&mut tx, lease_id, version).await?;

        for kv in kvs {
            let ref_id =
                events::insert(&mut tx, &kv.key, EventType::Expire, &[], Utc::now()).await?;
            data::tombstone(&mut tx, &kv.key, kv.version, ref_id).await?;
        }

        tx.commit().await?;
        self.notifier.notify();
        Ok(())
    }

    /// Stream factory for events on keys with the given prefix.
    #[must_use]
    pub fn stream(&self, prefix: &str) -> Streamer {
        Streamer::new(self.pool.clone(), Arc::clone(&self.notifier), prefix)
    }
}
