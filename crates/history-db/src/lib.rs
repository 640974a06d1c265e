//! Caption history persistence using SeaORM.

mod error;
mod migration;

pub mod entities;

pub use entities::request_history::Model as CaptionRecord;
pub use error::{HistoryError, HistoryResult};

use entities::{request_history, RequestHistory};
use sea_orm::{
    ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, QueryOrder, Set,
    TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use sqlx::{
    postgres::PgConnectOptions, sqlite::SqliteConnectOptions, ConnectOptions as _, Connection,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Postgres,
    Sqlite,
}

fn backend_of(url: &str) -> HistoryResult<Backend> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Ok(Backend::Postgres)
    } else if url.starts_with("sqlite:") {
        Ok(Backend::Sqlite)
    } else {
        let scheme = url.split(':').next().unwrap_or_default();
        Err(HistoryError::UnsupportedBackend(scheme.to_string()))
    }
}

fn is_sqlite_memory(url: &str) -> bool {
    url.starts_with("sqlite:") && (url.contains(":memory:") || url.contains("mode=memory"))
}

/// Pooled connection to the caption history store.
///
/// Cheap to clone, every clone shares the same pool. Each operation checks a
/// connection out for its own duration only.
#[derive(Clone, Debug)]
pub struct HistoryDb {
    conn: DatabaseConnection,
}

impl HistoryDb {
    /// Create the database named in `url` if it does not exist yet.
    ///
    /// For postgres this connects to the `postgres` maintenance database and
    /// issues `CREATE DATABASE` when needed; for sqlite it creates the file
    /// and its parent directory. Calling it again is a no-op.
    pub async fn ensure_database(url: &str) -> HistoryResult<()> {
        match backend_of(url)? {
            Backend::Postgres => ensure_postgres_database(url).await,
            Backend::Sqlite => ensure_sqlite_database(url).await,
        }
    }

    pub async fn connect(url: &str, max_connections: u32) -> HistoryResult<Self> {
        backend_of(url)?;

        // every connection to an in-memory sqlite database is a separate database
        let max_connections = if is_sqlite_memory(url) {
            1
        } else {
            max_connections.max(1)
        };

        let mut opt = ConnectOptions::new(url.to_owned());
        opt.max_connections(max_connections)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(8))
            .sqlx_logging(false); // We'll use tracing instead

        let conn = Database::connect(opt).await?;
        info!("Connected to history database ({} connections max)", max_connections);

        Ok(Self { conn })
    }

    /// Create the history table if absent. Already applied migrations are
    /// skipped, so this is safe to run on every start.
    pub async fn ensure_schema(&self) -> HistoryResult<()> {
        migration::Migrator::up(&self.conn, None).await?;
        info!("History database schema is up to date");
        Ok(())
    }

    /// Insert one caption inside its own transaction.
    ///
    /// On error the transaction is dropped before commit, which rolls it back.
    pub async fn save(&self, description: &str) -> HistoryResult<CaptionRecord> {
        let txn = self.conn.begin().await?;

        let record = request_history::ActiveModel {
            description: Set(description.to_owned()),
            ..ActiveModelTrait::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        debug!(id = record.id, "caption saved");

        Ok(record)
    }

    /// Every record, oldest first.
    pub async fn list_all(&self) -> HistoryResult<Vec<CaptionRecord>> {
        let records = RequestHistory::find()
            .order_by_asc(request_history::Column::Id)
            .all(&self.conn)
            .await?;
        Ok(records)
    }
}

async fn ensure_postgres_database(url: &str) -> HistoryResult<()> {
    let options = PgConnectOptions::from_str(url)?;
    let database = options
        .get_database()
        .ok_or(HistoryError::MissingDatabaseName)?
        .to_owned();

    let mut conn = options.clone().database("postgres").connect().await?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(&database)
            .fetch_one(&mut conn)
            .await?;

    if exists {
        debug!("database {} already exists", database);
    } else {
        // identifiers cannot be bound as parameters
        let statement = format!("CREATE DATABASE \"{}\"", database.replace('"', "\"\""));
        sqlx::query(&statement).execute(&mut conn).await?;
        info!("Created database {}", database);
    }

    conn.close().await?;
    Ok(())
}

async fn ensure_sqlite_database(url: &str) -> HistoryResult<()> {
    if is_sqlite_memory(url) {
        return Ok(());
    }

    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = options.connect().await?;
    conn.close().await?;
    debug!("sqlite database ready at {}", url);

    Ok(())
}
