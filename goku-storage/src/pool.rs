use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

#[must_use]
pub fn is_in_memory(path: &str) -> bool {
    path.contains(":memory:")
}

/// Open the database at `path`, creating it if missing.
///
/// An in-memory database is pinned to a single connection: every additional
/// connection would otherwise get its own private store.
pub async fn open(path: &str) -> Result<SqlitePool, sqlx::Error> {
    let in_memory = is_in_memory(path);

    let mut options = SqliteConnectOptions::new()
        .create_if_missing(true)
        .foreign_keys(true)
        .filename(path);
    if !in_memory {
        options = options
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
    }

    SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(if in_memory { 1 } else { 5 })
        .connect_with(options)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_paths() {
        assert!(is_in_memory(":memory:"));
        assert!(!is_in_memory("/var/lib/goku/goku.db"));
    }

    #[tokio::test]
    async fn open_in_memory() {
        let pool = open(":memory:").await.unwrap();
        let one: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(one, 1);
    }

    #[tokio::test]
    async fn open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("goku.db");
        let pool = open(path.to_str().unwrap()).await.unwrap();
        let one: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(one, 1);
        assert!(path.exists());
    }
}
