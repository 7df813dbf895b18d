//! Resource Store contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist named resources with total/remaining stock.
//! - Provide the conditional decrement primitive.
//!
//! # Invariants
//! - `remaining` changes only through [`ResourceStore::decrement`].
//! - The `remaining >= amount` check runs inside the same statement as the
//!   write, so a decrement below zero is never applied or observed.
//! - Resources are never deleted; only `is_active` toggles.

use crate::model::resource::{Resource, ResourceId};
use crate::repo::{
    ensure_tables, is_unique_violation, parse_uuid, units_from_db, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const RESOURCE_SELECT_SQL: &str = "SELECT
    id,
    name,
    total,
    remaining,
    is_active,
    created_at,
    expires_at,
    updated_at
FROM resources";

/// Result of a conditional decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// Stock was deducted; `remaining` is the post-decrement value.
    Applied { remaining: u32 },
    /// No resource with the given id.
    NotFound,
    /// `remaining < amount`; nothing changed.
    InsufficientStock,
}

/// Repository interface for resource stock.
pub trait ResourceStore {
    /// Inserts a new resource and returns its id.
    fn create_resource(&self, resource: &Resource) -> RepoResult<ResourceId>;
    fn get_resource(&self, id: ResourceId) -> RepoResult<Option<Resource>>;
    fn get_resource_by_name(&self, name: &str) -> RepoResult<Option<Resource>>;
    /// Atomically deducts `amount` units when at least that many remain.
    fn decrement(&self, id: ResourceId, amount: u32) -> RepoResult<DecrementOutcome>;
    /// Toggles the soft-deactivation flag.
    fn set_active(&self, id: ResourceId, is_active: bool) -> RepoResult<()>;
}

/// SQLite-backed resource store.
pub struct SqliteResourceStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteResourceStore<'conn> {
    /// Constructs a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["resources"])?;
        Ok(Self { conn })
    }
}

impl ResourceStore for SqliteResourceStore<'_> {
    fn create_resource(&self, resource: &Resource) -> RepoResult<ResourceId> {
        resource.validate()?;

        let inserted = self.conn.execute(
            "INSERT INTO resources (
                id,
                name,
                total,
                remaining,
                is_active,
                expires_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                resource.id.to_string(),
                resource.name.as_str(),
                i64::from(resource.total),
                i64::from(resource.remaining),
                bool_to_int(resource.is_active),
                resource.expires_at,
            ],
        );

        match inserted {
            Ok(_) => Ok(resource.id),
            Err(err) if is_unique_violation(&err) => {
                Err(RepoError::DuplicateName(resource.name.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn get_resource(&self, id: ResourceId) -> RepoResult<Option<Resource>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{RESOURCE_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_resource_row(row)?));
        }
        Ok(None)
    }

    fn get_resource_by_name(&self, name: &str) -> RepoResult<Option<Resource>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{RESOURCE_SELECT_SQL} WHERE name = ?1;"))?;
        let mut rows = stmt.query([name])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_resource_row(row)?));
        }
        Ok(None)
    }

    fn decrement(&self, id: ResourceId, amount: u32) -> RepoResult<DecrementOutcome> {
        if amount == 0 {
            return Err(RepoError::InvalidArgument(
                "decrement amount must be positive",
            ));
        }

        let id_text = id.to_string();
        // All changes of an UPDATE ... RETURNING happen on the first step, so
        // reading one row is enough to apply and observe the decrement.
        let remaining: Option<i64> = self
            .conn
            .query_row(
                "UPDATE resources
                 SET
                    remaining = remaining - ?2,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1
                   AND remaining >= ?2
                 RETURNING remaining;",
                params![id_text.as_str(), i64::from(amount)],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(remaining) = remaining {
            return Ok(DecrementOutcome::Applied {
                remaining: units_from_db(remaining, "resources.remaining")?,
            });
        }

        // Resources are never deleted, so this follow-up read cannot turn an
        // existing resource into NotFound.
        if resource_exists(self.conn, id_text.as_str())? {
            Ok(DecrementOutcome::InsufficientStock)
        } else {
            Ok(DecrementOutcome::NotFound)
        }
    }

    fn set_active(&self, id: ResourceId, is_active: bool) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE resources
             SET
                is_active = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), bool_to_int(is_active)],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }
}

fn resource_exists(conn: &Connection, id: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM resources WHERE id = ?1);",
        [id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn parse_resource_row(row: &Row<'_>) -> RepoResult<Resource> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "resources.id")?;

    let is_active = match row.get::<_, i64>("is_active")? {
        0 => false,
        1 => true,
        other => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_active value `{other}` in resources.is_active"
            )));
        }
    };

    let resource = Resource {
        id,
        name: row.get("name")?,
        total: units_from_db(row.get("total")?, "resources.total")?,
        remaining: units_from_db(row.get("remaining")?, "resources.remaining")?,
        is_active,
        created_at: row.get("created_at")?,
        expires_at: row.get("expires_at")?,
        updated_at: row.get("updated_at")?,
    };
    resource.validate()?;
    Ok(resource)
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
