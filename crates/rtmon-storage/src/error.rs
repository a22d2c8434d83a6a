use rtmon_common::types::MetricKind;
use sea_orm::{DbErr, RuntimeErr};

/// Errors returned by every storage backend.
///
/// [`StorageError::NotFound`] is the "no such metric yet" answer and is never
/// retried. Only [`StorageError::is_connection_exception`] errors are
/// eligible for retry, and only the SQL backend produces them.
///
/// # Examples
///
/// ```rust
/// use rtmon_common::types::MetricKind;
/// use rtmon_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     kind: MetricKind::Gauge,
///     name: "Alloc".to_string(),
/// };
/// assert!(err.to_string().contains("Alloc"));
/// assert!(!err.is_connection_exception());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The named metric has never been stored.
    #[error("Storage: {kind} {name} not found")]
    NotFound { kind: MetricKind, name: String },

    /// An error reported by the SQL driver or connection pool.
    #[error("Storage: database error: {0}")]
    Database(#[from] DbErr),

    /// Reading or writing the snapshot file failed.
    #[error("Storage: snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot file could not be encoded or decoded.
    #[error("Storage: snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn not_found(kind: MetricKind, name: &str) -> Self {
        StorageError::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    /// True for transient database connectivity failures: pool acquisition,
    /// I/O, closed or timed-out pools and SQLSTATE class `08`.
    pub fn is_connection_exception(&self) -> bool {
        match self {
            StorageError::Database(DbErr::ConnectionAcquire(_)) => true,
            StorageError::Database(DbErr::Conn(_)) => true,
            StorageError::Database(DbErr::Exec(RuntimeErr::SqlxError(e)))
            | StorageError::Database(DbErr::Query(RuntimeErr::SqlxError(e))) => is_transient_sqlx(e),
            _ => false,
        }
    }
}

fn is_transient_sqlx(err: &sea_orm::sqlx::Error) -> bool {
    use sea_orm::sqlx::Error;
    match err {
        Error::Io(_) | Error::PoolTimedOut | Error::PoolClosed | Error::WorkerCrashed => true,
        Error::Database(db) => db.code().is_some_and(|code| code.starts_with("08")),
        _ => false,
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
