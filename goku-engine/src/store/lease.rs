use chrono::{DateTime, Utc};
use goku_types::Lease;
use sqlx::Sqlite;

use crate::error::{Error, ErrorType};

/// Insert a fresh lease at version 1 and return its id.
#[tracing::instrument(skip_all)]
pub(crate) async fn insert<'e, E>(ex: E, expires_at: Option<DateTime<Utc>>) -> Result<i64, Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query("INSERT INTO leases (version, expires_at) VALUES (1, ?)")
        .bind(expires_at)
        .execute(ex)
        .await?;
    Ok(res.last_insert_rowid())
}

/// Stamp a new expiry and bump the version. Fails with `LeaseNotFound` when
/// the lease is absent or already expired.
#[tracing::instrument(skip_all, fields(lease_id))]
pub(crate) async fn update<'e, E>(
    ex: E,
    lease_id: i64,
    expires_at: Option<DateTime<Utc>>,
) -> Result<(), Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query(
        "UPDATE leases SET version = version + 1, expires_at = ?
            WHERE id = ? AND expired = FALSE",
    )
    .bind(expires_at)
    .bind(lease_id)
    .execute(ex)
    .await?;

    if res.rows_affected() == 0 {
        Err(ErrorType::LeaseNotFound(lease_id).into())
    } else {
        Ok(())
    }
}

/// Current version of a not-yet-expired lease.
pub(crate) async fn version_if_live<'e, E>(ex: E, lease_id: i64) -> Result<Option<i64>, Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>("SELECT version FROM leases WHERE id = ? AND expired = FALSE")
        .bind(lease_id)
        .fetch_optional(ex)
        .await
        .map_err(Into::into)
}

/// Retire a lease under a version guard. An expired lease keeps no expiry
/// time so the scan never returns it again.
#[tracing::instrument(skip_all, fields(lease_id, old_version))]
pub(crate) async fn expire<'e, E>(ex: E, lease_id: i64, old_version: i64) -> Result<(), Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query(
        "UPDATE leases SET expires_at = NULL, version = ? + 1, expired = TRUE
            WHERE id = ? AND version = ?",
    )
    .bind(old_version)
    .bind(lease_id)
    .bind(old_version)
    .execute(ex)
    .await?;

    if res.rows_affected() == 0 {
        Err(ErrorType::UpdateRace.into())
    } else {
        Ok(())
    }
}

/// Leases due at or before the cutoff, soonest first. Expired leases have a
/// NULL expiry and never match.
#[tracing::instrument(skip_all)]
pub(crate) async fn list_to_expire<'e, E>(ex: E, cutoff: DateTime<Utc>) -> Result<Vec<Lease>, Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Lease>(
        "SELECT id, version, expires_at, expired FROM leases
            WHERE expires_at <= ?
            ORDER BY expires_at ASC",
    )
    .bind(cutoff)
    .fetch_all(ex)
    .await
    .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::store::tests::pool;

    #[tokio::test]
    async fn lifecycle() {
        let pool = pool().await;
        let now = Utc::now();

        let id = insert(&pool, Some(now)).await.unwrap();
        assert_eq!(id, 1);
        assert_eq!(version_if_live(&pool, id).await.unwrap(), Some(1));

        // Bump expiry
        update(&pool, id, Some(now + Duration::minutes(1)))
            .await
            .unwrap();
        assert_eq!(version_if_live(&pool, id).await.unwrap(), Some(2));

        // Stale version guard
        let err = expire(&pool, id, 1).await.unwrap_err();
        assert!(matches!(err.variant, ErrorType::UpdateRace));

        expire(&pool, id, 2).await.unwrap();
        assert_eq!(version_if_live(&pool, id).await.unwrap(), None);

        // Expired leases reject updates
        let err = update(&pool, id, None).await.unwrap_err();
        assert!(matches!(err.variant, ErrorType::LeaseNotFound(_)));
    }

    #[tokio::test]
    async fn expiry_scan() {
        let pool = pool().await;
        let now = Utc::now();

        let due = insert(&pool, Some(now - Duration::seconds(1))).await.unwrap();
        let later = insert(&pool, Some(now + Duration::minutes(5))).await.unwrap();
        let never = insert(&pool, None).await.unwrap();

        let ids = |leases: Vec<goku_types::Lease>| {
            leases.into_iter().map(|l| l.id).collect::<Vec<_>>()
        };

        assert_eq!(ids(list_to_expire(&pool, now).await.unwrap()), vec![due]);
        assert_eq!(
            ids(list_to_expire(&pool, now + Duration::minutes(10)).await.unwrap()),
            vec![due, later]
        );

        // A lease without an expiry never shows up, but is still live
        assert_eq!(version_if_live(&pool, never).await.unwrap(), Some(1));

        // Expired leases drop out of the scan entirely
        expire(&pool, due, 1).await.unwrap();
        assert!(list_to_expire(&pool, now).await.unwrap().is_empty());
    }
}
