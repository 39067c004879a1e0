use goku_types::KV;
use sqlx::Sqlite;

use crate::error::{Error, ErrorType};

const COLS: &str = "key, value, version, created_ref, updated_ref, deleted_ref, lease_id";

#[derive(Debug, sqlx::FromRow)]
struct KvRow {
    key: String,
    value: Option<Vec<u8>>,
    version: i64,
    created_ref: i64,
    updated_ref: i64,
    deleted_ref: Option<i64>,
    lease_id: i64,
}

impl From<KvRow> for KV {
    fn from(row: KvRow) -> Self {
        KV {
            key: row.key,
            value: row.value.unwrap_or_default(),
            version: row.version,
            created_ref: row.created_ref,
            updated_ref: row.updated_ref,
            deleted_ref: row.deleted_ref.unwrap_or(0),
            lease_id: row.lease_id,
        }
    }
}

/// Lookup a row by key, tombstones included.
#[tracing::instrument(skip_all, fields(key = %key))]
pub(crate) async fn lookup<'e, E>(ex: E, key: &str) -> Result<Option<KV>, Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, KvRow>(&format!("SELECT {COLS} FROM data WHERE key = ?"))
        .bind(key)
        .fetch_optional(ex)
        .await
        .map(|row| row.map(Into::into))
        .map_err(Into::into)
}

/// Lookup a live row by key.
#[tracing::instrument(skip_all, fields(key = %key))]
pub(crate) async fn get<'e, E>(ex: E, key: &str) -> Result<KV, Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, KvRow>(&format!(
        "SELECT {COLS} FROM data WHERE key = ? AND deleted_ref IS NULL"
    ))
    .bind(key)
    .fetch_optional(ex)
    .await?
    .map(Into::into)
    .ok_or_else(|| ErrorType::NotFound.into())
}

/// All live rows whose key starts with the prefix, in key order.
#[tracing::instrument(skip_all, fields(prefix = %prefix))]
pub(crate) async fn list<'e, E>(ex: E, prefix: &str) -> Result<Vec<KV>, Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let pattern = format!("{}%", escape_like(prefix));
    sqlx::query_as::<_, KvRow>(&format!(
        "SELECT {COLS} FROM data
            WHERE key LIKE ? ESCAPE '\\' AND deleted_ref IS NULL
            ORDER BY key ASC"
    ))
    .bind(pattern)
    .fetch_all(ex)
    .await
    .map(|rows| rows.into_iter().map(Into::into).collect())
    .map_err(Into::into)
}

/// All live rows attached to the lease, in key order.
#[tracing::instrument(skip_all, fields(lease_id))]
pub(crate) async fn list_by_lease<'e, E>(ex: E, lease_id: i64) -> Result<Vec<KV>, Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, KvRow>(&format!(
        "SELECT {COLS} FROM data
            WHERE lease_id = ? AND deleted_ref IS NULL
            ORDER BY key ASC"
    ))
    .bind(lease_id)
    .fetch_all(ex)
    .await
    .map(|rows| rows.into_iter().map(Into::into).collect())
    .map_err(Into::into)
}

/// Insert a fresh row at version 1. A duplicate key means another
/// transaction created the row first, which surfaces as a data race.
#[tracing::instrument(skip_all, fields(key = %key))]
pub(crate) async fn insert<'e, E>(
    ex: E,
    key: &str,
    value: &[u8],
    created_ref: i64,
    updated_ref: i64,
    lease_id: i64,
) -> Result<(), Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO data (key, value, version, created_ref, updated_ref, lease_id)
            VALUES (?, ?, 1, ?, ?, ?)",
    )
    .bind(key)
    .bind(value)
    .bind(created_ref)
    .bind(updated_ref)
    .bind(lease_id)
    .execute(ex)
    .await
    .map(|_| ())
    .map_err(|err| {
        let err: Error = err.into();
        if matches!(err.variant, ErrorType::UniqueConstraintViolation { .. }) {
            ErrorType::UpdateRace.into()
        } else {
            err
        }
    })
}

/// Overwrite a row under a version guard, clearing any tombstone.
#[tracing::instrument(skip_all, fields(key = %key, old_version))]
pub(crate) async fn update<'e, E>(
    ex: E,
    key: &str,
    value: &[u8],
    old_version: i64,
    created_ref: i64,
    updated_ref: i64,
    lease_id: i64,
) -> Result<(), Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query(
        "UPDATE data
            SET value = ?, version = ? + 1, created_ref = ?, updated_ref = ?,
                deleted_ref = NULL, lease_id = ?
            WHERE key = ? AND version = ?",
    )
    .bind(value)
    .bind(old_version)
    .bind(created_ref)
    .bind(updated_ref)
    .bind(lease_id)
    .bind(key)
    .bind(old_version)
    .execute(ex)
    .await?;

    if res.rows_affected() == 1 {
        Ok(())
    } else {
        Err(ErrorType::UpdateRace.into())
    }
}

/// Tombstone a row under a version guard. The row keeps its lease_id so the
/// grouping stays visible in history.
#[tracing::instrument(skip_all, fields(key = %key, old_version))]
pub(crate) async fn tombstone<'e, E>(
    ex: E,
    key: &str,
    old_version: i64,
    ref_id: i64,
) -> Result<(), Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query(
        "UPDATE data
            SET value = NULL, version = ? + 1, updated_ref = ?, deleted_ref = ?
            WHERE key = ? AND version = ?",
    )
    .bind(old_version)
    .bind(ref_id)
    .bind(ref_id)
    .bind(key)
    .bind(old_version)
    .execute(ex)
    .await?;

    if res.rows_affected() == 1 {
        Ok(())
    } else {
        Err(ErrorType::UpdateRace.into())
    }
}

fn escape_like(prefix: &str) -> String {
    prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
