use std::fmt;

use rn_core::{ErrorKind, NetworkError};

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    InvalidData(String),
    Conflict(String),
    Config(String),
    Network(NetworkError),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Sqlite(e) if is_constraint_violation(e) => ErrorKind::Conflict,
            StoreError::Sqlite(_) => ErrorKind::Transient,
            StoreError::InvalidData(_) => ErrorKind::InvariantViolation,
            StoreError::Conflict(_) => ErrorKind::Conflict,
            StoreError::Config(_) => ErrorKind::InvalidInput,
            StoreError::Network(e) => e.kind(),
        }
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StoreError::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            StoreError::Conflict(msg) => write!(f, "conflict: {msg}"),
            StoreError::Config(msg) => write!(f, "config error: {msg}"),
            StoreError::Network(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(e) => Some(e),
            StoreError::Network(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<NetworkError> for StoreError {
    fn from(e: NetworkError) -> Self {
        // Store failures that crossed the core boundary come back unwrapped.
        match e {
            NetworkError::Backend(inner) => match inner.downcast::<StoreError>() {
                Ok(store_err) => *store_err,
                Err(other) => StoreError::Network(NetworkError::Backend(other)),
            },
            other => StoreError::Network(other),
        }
    }
}

impl From<StoreError> for NetworkError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Network(inner) => inner,
            other => NetworkError::backend(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
