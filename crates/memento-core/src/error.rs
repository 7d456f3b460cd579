//! Error taxonomy for the Memento knowledge graph.

use thiserror::Error;

/// Top-level error type for the knowledge graph store.
///
/// Every failure surfaced by the store falls into exactly one of these
/// kinds. `Validation` and `ReadOnly` are caller errors and must never be
/// retried; `Connection` triggers a reconnect on the next call; `Timeout`
/// and `Query` leave the connection ready for the next statement.
#[derive(Error, Debug)]
pub enum MementoError {
    /// Bad connection parameters, rejected before any network I/O.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connectivity failure, transient or after exhausted retries.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Caller-supplied input violates an operation contract.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A write-shaped statement was submitted under read-only enforcement.
    #[error("Read-only violation: {0}")]
    ReadOnly(String),

    /// Statement exceeded its deadline. The connection itself survives.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The backend rejected the statement (bad SQL, constraint violation).
    #[error("Query error: {0}")]
    Query(String),

    /// Catch-all for failures outside the taxonomy, surfaced opaquely.
    #[error("Unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl MementoError {
    /// Prefix the message with domain context, preserving the error kind.
    ///
    /// Repository methods use this to report *which* operation failed
    /// ("failed to add entity: ...") without collapsing the taxonomy.
    pub fn context(self, prefix: &str) -> Self {
        match self {
            Self::Config(m) => Self::Config(format!("{prefix}: {m}")),
            Self::Connection(m) => Self::Connection(format!("{prefix}: {m}")),
            Self::Validation(m) => Self::Validation(format!("{prefix}: {m}")),
            Self::ReadOnly(m) => Self::ReadOnly(format!("{prefix}: {m}")),
            Self::Timeout(m) => Self::Timeout(format!("{prefix}: {m}")),
            Self::Query(m) => Self::Query(format!("{prefix}: {m}")),
            Self::Unexpected(e) => Self::Unexpected(e.context(prefix.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, MementoError>;
