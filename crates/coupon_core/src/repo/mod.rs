//! Repository layer: the two storage primitives the claim protocol relies on.
//!
//! # Responsibility
//! - Define the Resource Store (conditional decrement) and Claim Ledger
//!   (reserve-if-absent, release) contracts.
//! - Isolate SQLite query details from the coordinator.
//!
//! # Invariants
//! - Each primitive is a single SQLite statement; its linearization point is
//!   the database write lock, never application-level locking.
//! - Repository APIs return semantic outcomes (`InsufficientStock`,
//!   `AlreadyExists`) as values; only storage faults and invalid input are
//!   errors.

use crate::db::DbError;
use crate::model::resource::{ResourceId, ResourceValidationError};
use rusqlite::{ffi, Connection};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod claim_repo;
pub mod resource_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for resource and claim persistence.
#[derive(Debug)]
pub enum RepoError {
    Validation(ResourceValidationError),
    Db(DbError),
    NotFound(ResourceId),
    DuplicateName(String),
    InvalidArgument(&'static str),
    InvalidData(String),
    MissingRequiredTable(&'static str),
}

impl RepoError {
    /// Whether the failure came from waiting on another writer.
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_lock_contention())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "resource not found: {id}"),
            Self::DuplicateName(name) => write!(f, "resource already exists: `{name}`"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::MissingRequiredTable(table) => {
                write!(f, "connection is missing required table `{table}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResourceValidationError> for RepoError {
    fn from(value: ResourceValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Whether a failed statement hit a PRIMARY KEY or UNIQUE constraint.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(inner, _) => matches!(
            inner.extended_code,
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE
        ),
        _ => false,
    }
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

pub(crate) fn units_from_db(value: i64, column: &str) -> RepoResult<u32> {
    u32::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid unit count `{value}` in {column}")))
}

pub(crate) fn ensure_tables(conn: &Connection, tables: &[&'static str]) -> RepoResult<()> {
    for table in tables {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [*table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}
