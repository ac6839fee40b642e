//! 데이터 계층 에러 타입.

use histfeed_core::HistfeedError;
use thiserror::Error;

/// 데이터 계층에서 발생하는 에러.
///
/// 단일 비행으로 합쳐진 수집 결과를 여러 대기자에게 복제해야 하므로
/// `Clone`을 구현합니다.
#[derive(Error, Debug, Clone)]
pub enum DataError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Data not found: {0}")]
    NotFound(String),

    #[error("Duplicate entry: {0}")]
    DuplicateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Fetch failed after {attempts} attempts: {reason}")]
    FetchFailed { attempts: u32, reason: String },

    #[error("Permanent fetch error: {0}")]
    PermanentFetch(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Insert error: {0}")]
    InsertError(String),

    #[error("Delete error: {0}")]
    DeleteError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DataError::NotFound(err.to_string()),
            sqlx::Error::PoolTimedOut => DataError::PoolExhausted,
            sqlx::Error::Database(db_err) => {
                if db_err.code().as_deref() == Some("23505") {
                    DataError::DuplicateError(db_err.to_string())
                } else {
                    DataError::QueryError(db_err.to_string())
                }
            }
            _ => DataError::ConnectionError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::SerializationError(err.to_string())
    }
}

impl From<DataError> for HistfeedError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::SchemaError(msg) => HistfeedError::Schema(msg),
            DataError::CacheUnavailable(msg) => HistfeedError::Cache(msg),
            DataError::Cancelled(msg) => HistfeedError::Cancelled(msg),
            DataError::SerializationError(msg) => HistfeedError::Serialization(msg),
            DataError::NotFound(msg) => HistfeedError::NotFound(msg),
            DataError::ConfigError(msg) => HistfeedError::Config(msg),
            DataError::FetchFailed { .. } | DataError::PermanentFetch(_) => {
                HistfeedError::Fetch(err.to_string())
            }
            other => HistfeedError::Database(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
