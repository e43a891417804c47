use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    /// Lookup by unique key (name, uuid, value) found no row.
    NotFound(&'static str, String),
    /// Operation invoked on an entity that does not exist. Misuse, fatal.
    Precondition(String),
    /// A caller-supplied object identifier collides with a live object.
    IdentifierConflict(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StoreError::NotFound(kind, key) => write!(f, "{kind} not found: {key}"),
            StoreError::Precondition(msg) => write!(f, "precondition violated: {msg}"),
            StoreError::IdentifierConflict(uuid) => {
                write!(f, "identifier already in use: {uuid}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

/// Whether the underlying error is a uniqueness-constraint violation.
/// Used to turn uuid collisions into retries or `IdentifierConflict`;
/// every other constraint violation propagates as fatal.
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

pub type Result<T> = std::result::Result<T, StoreError>;
