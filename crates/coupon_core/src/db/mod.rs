//! SQLite connections for the claim protocol.
//!
//! Every caller opens its own connection to the shared database file;
//! concurrent writers are serialized by SQLite's write lock, waiting up to
//! the configured busy timeout. Nothing touches `resources` or `claims`
//! until migrations have run on the connection.

use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, open_db_with_options, DbOptions};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file was migrated by a newer build.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl DbError {
    /// Whether the statement gave up waiting for another writer's lock.
    ///
    /// Such failures had no effect and the operation can be retried.
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(inner, _)) => matches!(
                inner.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

#[cfg(test)]
mod tests {
    use super::DbError;
    use rusqlite::ffi;

    #[test]
    fn busy_and_locked_count_as_lock_contention() {
        for code in [ffi::SQLITE_BUSY, ffi::SQLITE_LOCKED] {
            let err = DbError::Sqlite(rusqlite::Error::SqliteFailure(ffi::Error::new(code), None));
            assert!(err.is_lock_contention());
        }

        let io = DbError::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_IOERR),
            None,
        ));
        assert!(!io.is_lock_contention());
        assert!(!DbError::UnsupportedSchemaVersion {
            db_version: 9,
            latest_supported: 2,
        }
        .is_lock_contention());
    }
}
