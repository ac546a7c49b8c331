//! Error taxonomy for the recipe store.
//!
//! Every store operation returns [`Result`]. SQLite failures are classified on
//! conversion so callers can tell a duplicate key from a locked database.

use rusqlite::ErrorCode;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Input rejected before anything was written.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A unique key was violated inside one write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A reference could not be resolved, or stored data is inconsistent.
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The call's deadline passed or its cancel flag was raised.
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("storage error: {0}")]
    Storage(#[source] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound { kind, id: id.into() }
    }

    /// True for the unique/primary-key violations SQLite reports on insert.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        let (code, extended) = match &err {
            rusqlite::Error::SqliteFailure(failure, _) => (failure.code, failure.extended_code),
            _ => return Error::Storage(err),
        };

        match code {
            ErrorCode::ConstraintViolation => match extended {
                rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Error::Conflict(err.to_string()),
                rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Error::Integrity(err.to_string()),
                _ => Error::Storage(err),
            },
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure
            | ErrorCode::NotADatabase => Error::StoreUnavailable(err.to_string()),
            ErrorCode::OperationInterrupted => Error::Cancelled(err.to_string()),
            _ => Error::Storage(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn constraint_error(sql: &str) -> Error {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id TEXT PRIMARY KEY, name TEXT UNIQUE);
             CREATE TABLE child (id TEXT PRIMARY KEY, parent_id TEXT NOT NULL REFERENCES parent(id));
             INSERT INTO parent (id, name) VALUES ('p1', 'flour');",
        )
        .unwrap();
        conn.execute(sql, []).unwrap_err().into()
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let err = constraint_error("INSERT INTO parent (id, name) VALUES ('p2', 'flour')");
        assert!(err.is_conflict(), "{err:?}");
    }

    #[test]
    fn test_primary_key_violation_is_conflict() {
        let err = constraint_error("INSERT INTO parent (id, name) VALUES ('p1', 'sugar')");
        assert!(err.is_conflict(), "{err:?}");
    }

    #[test]
    fn test_foreign_key_violation_is_integrity() {
        let err = constraint_error("INSERT INTO child (id, parent_id) VALUES ('c1', 'missing')");
        assert!(matches!(err, Error::Integrity(_)), "{err:?}");
    }

    #[test]
    fn test_other_errors_are_storage() {
        let conn = Connection::open_in_memory().unwrap();
        let err: Error = conn.execute("SELECT * FROM nowhere", []).unwrap_err().into();
        assert!(matches!(err, Error::Storage(_)), "{err:?}");
    }
}
