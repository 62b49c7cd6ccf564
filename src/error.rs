//! Error types for the synchronization pipeline

use crate::reflect::ReflectError;

/// Errors surfaced by a synchronization run.
///
/// The engine recovers nothing locally: every error aborts the run, and a
/// failure during execution rolls the transaction back before propagating.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The database could not be reached or authenticated to.
    #[error("connection failed: {0}")]
    Connection(#[source] tokio_postgres::Error),

    /// A catalog query failed or returned a shape the engine cannot model.
    #[error(transparent)]
    Reflection(#[from] ReflectError),

    /// The desired schema is internally inconsistent. Raised before any
    /// database I/O happens.
    #[error("desired schema is inconsistent: {0}")]
    Compilation(String),

    /// The diff requires an operation the engine refuses to perform
    /// (enum label removal or reordering, identity flag changes).
    #[error("unsupported schema change: {0}")]
    UnsupportedDiff(String),

    /// A DDL statement failed. The transaction has been rolled back.
    #[error("failed to execute `{statement}` while applying {edit}: {source}")]
    Execution {
        statement: String,
        edit: String,
        #[source]
        source: tokio_postgres::Error,
    },
}

/// Result alias used across the crate.
pub type SyncResult<T> = Result<T, SyncError>;
