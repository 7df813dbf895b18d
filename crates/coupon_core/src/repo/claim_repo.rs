//! Claim Ledger contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide reserve-if-absent over the `(actor_id, resource_id)` key.
//! - Provide release primitives used by compensation and manual unblocking.
//! - Persist compensations that failed in-line for later reconciliation.
//!
//! # Invariants
//! - Uniqueness is enforced by the `claims` primary key; a constraint
//!   violation on insert is the `AlreadyExists` signal.
//! - Releases are idempotent; deleting a missing row is not an error.
//! - `release_reservation` only deletes the row minted by that reservation.

use crate::model::claim::{Claim, ClaimId, PendingRelease, Reservation};
use crate::model::resource::ResourceId;
use crate::repo::{ensure_tables, is_unique_violation, parse_uuid, RepoResult};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

const CLAIM_SELECT_SQL: &str = "SELECT
    claim_id,
    actor_id,
    resource_id,
    resource_name,
    created_at
FROM claims";

/// Result of a reserve-if-absent attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// The slot was free and is now held by this reservation.
    Created(Reservation),
    /// A row for the pair already exists.
    AlreadyExists,
}

/// Repository interface for claim records.
pub trait ClaimLedger {
    /// Inserts a claim row for the pair unless one already exists.
    fn reserve(
        &self,
        actor_id: &str,
        resource_id: ResourceId,
        resource_name: &str,
    ) -> RepoResult<ReserveOutcome>;
    /// Unconditionally removes the pair's row, whatever reservation made it.
    fn release(&self, actor_id: &str, resource_id: ResourceId) -> RepoResult<()>;
    /// Removes the row only if it still belongs to `reservation`.
    fn release_reservation(&self, reservation: &Reservation) -> RepoResult<()>;
    fn get_claim(&self, actor_id: &str, resource_id: ResourceId) -> RepoResult<Option<Claim>>;
    /// Lists claims for one resource ordered by `created_at ASC, actor_id ASC`.
    fn list_claims(&self, resource_id: ResourceId) -> RepoResult<Vec<Claim>>;
    /// Queues a failed compensation. Re-recording the same claim id
    /// refreshes `last_error`.
    fn record_pending_release(&self, pending: &PendingRelease) -> RepoResult<()>;
    fn list_pending_releases(&self) -> RepoResult<Vec<PendingRelease>>;
    fn clear_pending_release(&self, claim_id: ClaimId) -> RepoResult<()>;
}

/// SQLite-backed claim ledger.
pub struct SqliteClaimLedger<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteClaimLedger<'conn> {
    /// Constructs a ledger from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["claims", "pending_releases"])?;
        Ok(Self { conn })
    }
}

impl ClaimLedger for SqliteClaimLedger<'_> {
    fn reserve(
        &self,
        actor_id: &str,
        resource_id: ResourceId,
        resource_name: &str,
    ) -> RepoResult<ReserveOutcome> {
        let claim_id = Uuid::new_v4();
        let inserted = self.conn.execute(
            "INSERT INTO claims (
                claim_id,
                actor_id,
                resource_id,
                resource_name
            ) VALUES (?1, ?2, ?3, ?4);",
            params![
                claim_id.to_string(),
                actor_id,
                resource_id.to_string(),
                resource_name,
            ],
        );

        match inserted {
            Ok(_) => Ok(ReserveOutcome::Created(Reservation {
                claim_id,
                actor_id: actor_id.to_string(),
                resource_id,
            })),
            Err(err) if is_unique_violation(&err) => Ok(ReserveOutcome::AlreadyExists),
            Err(err) => Err(err.into()),
        }
    }

    fn release(&self, actor_id: &str, resource_id: ResourceId) -> RepoResult<()> {
        self.conn.execute(
            "DELETE FROM claims WHERE actor_id = ?1 AND resource_id = ?2;",
            params![actor_id, resource_id.to_string()],
        )?;
        Ok(())
    }

    fn release_reservation(&self, reservation: &Reservation) -> RepoResult<()> {
        self.conn.execute(
            "DELETE FROM claims
             WHERE claim_id = ?1
               AND actor_id = ?2
               AND resource_id = ?3;",
            params![
                reservation.claim_id.to_string(),
                reservation.actor_id.as_str(),
                reservation.resource_id.to_string(),
            ],
        )?;
        Ok(())
    }

    fn get_claim(&self, actor_id: &str, resource_id: ResourceId) -> RepoResult<Option<Claim>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CLAIM_SELECT_SQL} WHERE actor_id = ?1 AND resource_id = ?2;"
        ))?;
        let mut rows = stmt.query(params![actor_id, resource_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_claim_row(row)?));
        }
        Ok(None)
    }

    fn list_claims(&self, resource_id: ResourceId) -> RepoResult<Vec<Claim>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CLAIM_SELECT_SQL}
             WHERE resource_id = ?1
             ORDER BY created_at ASC, actor_id ASC;"
        ))?;
        let mut rows = stmt.query([resource_id.to_string()])?;
        let mut claims = Vec::new();
        while let Some(row) = rows.next()? {
            claims.push(parse_claim_row(row)?);
        }
        Ok(claims)
    }

    fn record_pending_release(&self, pending: &PendingRelease) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO pending_releases (
                claim_id,
                actor_id,
                resource_id,
                last_error
            ) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (claim_id) DO UPDATE SET last_error = excluded.last_error;",
            params![
                pending.claim_id.to_string(),
                pending.actor_id.as_str(),
                pending.resource_id.to_string(),
                pending.last_error.as_deref(),
            ],
        )?;
        Ok(())
    }

    fn list_pending_releases(&self) -> RepoResult<Vec<PendingRelease>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                claim_id,
                actor_id,
                resource_id,
                recorded_at,
                last_error
             FROM pending_releases
             ORDER BY recorded_at ASC, claim_id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut pending = Vec::new();
        while let Some(row) = rows.next()? {
            let claim_id: String = row.get("claim_id")?;
            let resource_id: String = row.get("resource_id")?;
            pending.push(PendingRelease {
                claim_id: parse_uuid(&claim_id, "pending_releases.claim_id")?,
                actor_id: row.get("actor_id")?,
                resource_id: parse_uuid(&resource_id, "pending_releases.resource_id")?,
                recorded_at: row.get("recorded_at")?,
                last_error: row.get("last_error")?,
            });
        }
        Ok(pending)
    }

    fn clear_pending_release(&self, claim_id: ClaimId) -> RepoResult<()> {
        self.conn.execute(
            "DELETE FROM pending_releases WHERE claim_id = ?1;",
            [claim_id.to_string()],
        )?;
        Ok(())
    }
}

fn parse_claim_row(row: &Row<'_>) -> RepoResult<Claim> {
    let claim_id: String = row.get("claim_id")?;
    let resource_id: String = row.get("resource_id")?;
    Ok(Claim {
        claim_id: parse_uuid(&claim_id, "claims.claim_id")?,
        actor_id: row.get("actor_id")?,
        resource_id: parse_uuid(&resource_id, "claims.resource_id")?,
        resource_name: row.get("resource_name")?,
        created_at: row.get("created_at")?,
    })
}
