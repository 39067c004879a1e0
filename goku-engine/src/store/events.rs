use chrono::{DateTime, Utc};
use goku_types::{Event, EventType};
use sqlx::Sqlite;

use crate::error::{Error, ErrorType};

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    #[sqlx(rename = "type")]
    type_code: i64,
    key: String,
    timestamp: DateTime<Utc>,
    metadata: Option<Vec<u8>>,
}

impl TryFrom<EventRow> for Event {
    type Error = Error;

    fn try_from(row: EventRow) -> Result<Self, Error> {
        let kind = EventType::try_from(row.type_code)
            .map_err(|err| ErrorType::BadData(err.to_string()))?;
        Ok(Event {
            id: row.id,
            kind,
            key: row.key,
            timestamp: row.timestamp,
            metadata: row.metadata.unwrap_or_default(),
        })
    }
}

/// Append an event and return its id.
#[tracing::instrument(skip_all, fields(key = %key))]
pub(crate) async fn insert<'e, E>(
    ex: E,
    key: &str,
    kind: EventType,
    metadata: &[u8],
    timestamp: DateTime<Utc>,
) -> Result<i64, Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let res = sqlx::query("INSERT INTO events (type, key, timestamp, metadata) VALUES (?, ?, ?, ?)")
        .bind(kind.code())
        .bind(key)
        .bind(timestamp)
        .bind(metadata)
        .execute(ex)
        .await?;
    Ok(res.last_insert_rowid())
}

/// Record a noop event at an explicit id. The caller handles the unique
/// violation raised when the id's original writer committed after all.
#[tracing::instrument(skip_all, fields(id))]
pub(crate) async fn insert_noop<'e, E>(ex: E, id: i64, timestamp: DateTime<Utc>) -> Result<(), Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO events (id, type, key, timestamp, metadata) VALUES (?, ?, '', ?, NULL)")
        .bind(id)
        .bind(EventType::Noop.code())
        .bind(timestamp)
        .execute(ex)
        .await
        .map(|_| ())
        .map_err(Into::into)
}

/// Events after the cursor, in id order.
#[tracing::instrument(skip_all, fields(after))]
pub(crate) async fn list_after<'e, E>(ex: E, after: i64, limit: i64) -> Result<Vec<Event>, Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, EventRow>(
        "SELECT id, type, key, timestamp, metadata FROM events
            WHERE id > ?
            ORDER BY id ASC
            LIMIT ?",
    )
    .bind(after)
    .bind(limit)
    .fetch_all(ex)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}

/// Highest event id, zero for an empty log.
pub(crate) async fn head<'e, E>(ex: E) -> Result<i64, Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(id) FROM events")
        .fetch_one(ex)
        .await
        .map(Option::unwrap_or_default)
        .map_err(Into::into)
}

/// All event ids above the cursor, in id order.
pub(crate) async fn ids_after<'e, E>(ex: E, after: i64) -> Result<Vec<i64>, Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>("SELECT id FROM events WHERE id > ? ORDER BY id ASC")
        .bind(after)
        .fetch_all(ex)
        .await
        .map_err(Into::into)
}
