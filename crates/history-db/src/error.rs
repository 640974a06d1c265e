use sea_orm::DbErr;
use thiserror::Error;

pub type HistoryResult<T> = std::result::Result<T, HistoryError>;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),

    #[error("database bootstrap error: {0}")]
    Bootstrap(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported database url scheme: {0}")]
    UnsupportedBackend(String),

    #[error("database url has no database name")]
    MissingDatabaseName,
}
