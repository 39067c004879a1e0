use chrono::Utc;
use sha2::{Digest, Sha384};
use sqlx::{Executor, SqlitePool};

const MIGRATIONS_TABLE: &str = "_MIGRATIONS";

#[derive(Debug)]
pub struct MigrationScript {
    pub script: String,
    pub description: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("sqlx error")]
    DB(#[from] sqlx::Error),
    #[error("unable to parse migration script `{filename}`")]
    Script { filename: String, error: String },
    #[error("unable to execute migration script `{filename}`")]
    Execution {
        filename: String,
        #[source]
        error: sqlx::Error,
    },
}

async fn create_migrations_table(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE}(
        version INTEGER NOT NULL,
        description TEXT NOT NULL,
        checksum BLOB NOT NULL,
        created_at TIMESTAMP NOT NULL,
        PRIMARY KEY(version)
    )"
    );
    sqlx::query(&sql).execute(pool).await?;
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
struct LatestMigration {
    latest_version: Option<i64>,
}

/// Apply the given migration scripts in order.
///
/// Each script runs in its own transaction together with its bookkeeping row,
/// so a failed script leaves the store at the previous version. Re-running
/// with an unchanged script list is a no-op.
pub async fn migrate(
    pool: &SqlitePool,
    migrations: &[MigrationScript],
) -> Result<(), MigrationError> {
    create_migrations_table(pool).await?;

    let latest: Option<LatestMigration> = sqlx::query_as(&format!(
        "SELECT MAX(version) AS latest_version FROM {MIGRATIONS_TABLE}"
    ))
    .fetch_optional(pool)
    .await?;
    let last_version = latest.and_then(|m| m.latest_version);

    for (version, migration) in migrations.iter().enumerate() {
        let version = version as i64;
        if last_version.map_or(false, |last| last >= version) {
            continue;
        }

        let checksum = Sha384::digest(migration.script.as_bytes()).to_vec();

        let mut tx = pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO {MIGRATIONS_TABLE} (
        version,
        description,
        checksum,
        created_at
    ) VALUES (
        ?,
        ?,
        ?,
        ?
    )"
        ))
        .bind(version)
        .bind(&migration.description)
        .bind(checksum)
        .bind(Utc::now())
        .execute(&mut tx)
        .await?;

        tx.execute(migration.script.as_str())
            .await
            .map_err(|error| MigrationError::Execution {
                filename: migration.description.clone(),
                error,
            })?;

        tx.commit().await?;
    }

    Ok(())
}

/// Run embedded migrations for the store.
pub async fn migrate_embedded<M: rust_embed::RustEmbed>(
    pool: &SqlitePool,
) -> Result<(), MigrationError> {
    let migrations = migration_scripts::<M>()?;
    migrate(pool, &migrations).await
}

/// Retrieve [`MigrationScript`]'s from a type that implements
/// [`rust_embed::RustEmbed`]. Scripts apply in filename order.
pub fn migration_scripts<M: rust_embed::RustEmbed>() -> Result<Vec<MigrationScript>, MigrationError>
{
    let mut migrations = M::iter().collect::<Vec<_>>();
    migrations.sort();

    let mut migration_scripts = vec![];
    for migration_file_name in migrations {
        if let Some(migration) = M::get(&migration_file_name) {
            let sql =
                String::from_utf8(migration.data.to_vec()).map_err(|_| MigrationError::Script {
                    error: "Unable to parse migration script to UTF-8".to_string(),
                    filename: migration_file_name.to_string(),
                })?;
            migration_scripts.push(MigrationScript {
                description: migration_file_name.to_string(),
                script: sql,
            });
        } else {
            return Err(MigrationError::Script {
                filename: migration_file_name.to_string(),
                error: "Unable to get migration script".to_string(),
            });
        }
    }

    Ok(migration_scripts)
}

#[derive(Debug, sqlx::FromRow)]
pub struct Migration {
    pub version: i64,
    pub description: String,
    pub checksum: Vec<u8>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// List applied migrations.
pub async fn list_migrations(pool: &SqlitePool) -> Result<Vec<Migration>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT * FROM {MIGRATIONS_TABLE} ORDER BY version ASC"
    ))
    .fetch_all(pool)
    .await
}
