//! Claim Coordinator: the concurrent claim protocol.
//!
//! # Responsibility
//! - Sequence reserve-then-decrement for one `(actor, resource)` request.
//! - Compensate stale reservations when no unit could be deducted.
//! - Drain queued compensations and provide manual unblocking.
//!
//! # Invariants
//! - The claim slot is reserved before stock is touched; only actors who
//!   have not claimed before ever reach the decrement.
//! - A reservation whose decrement did not apply is released, or queued and
//!   reported as `CompensationFailed`. Never both absent.
//! - The coordinator holds no locks and no shared state of its own.

use crate::config::CompensationPolicy;
use crate::logging::sanitize_message;
use crate::model::claim::{
    validate_actor_id, Claim, ClaimOutcome, ClaimValidationError, FailureKind, PendingRelease,
};
use crate::repo::claim_repo::{ClaimLedger, ReserveOutcome};
use crate::repo::resource_repo::{DecrementOutcome, ResourceStore};
use crate::repo::{RepoError, RepoResult};
use crate::service::compensation::{
    CompensationFailure, ReservationGuard, MAX_PERSISTED_ERROR_CHARS,
};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Units deducted by one successful claim.
pub const UNITS_PER_CLAIM: u32 = 1;

/// Errors surfaced by the coordinator. Expected contention results
/// (`AlreadyClaimed`, `NoStock`, ...) are outcomes, not errors.
#[derive(Debug)]
pub enum ClaimError {
    /// Request rejected before any storage call.
    InvalidInput(ClaimValidationError),
    /// Storage failure. Every step before it is a no-op or was compensated,
    /// so the whole claim may be retried.
    Storage(RepoError),
    /// A stale reservation could not be released.
    CompensationFailed(CompensationFailure),
}

impl ClaimError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidInput(_) => FailureKind::InvalidInput,
            Self::Storage(_) | Self::CompensationFailed(_) => FailureKind::StorageFault,
        }
    }
}

impl Display for ClaimError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(err) => write!(f, "invalid claim request: {err}"),
            Self::Storage(err) => write!(f, "storage fault: {err}"),
            Self::CompensationFailed(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ClaimError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidInput(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::CompensationFailed(err) => Some(err),
        }
    }
}

impl From<ClaimValidationError> for ClaimError {
    fn from(value: ClaimValidationError) -> Self {
        Self::InvalidInput(value)
    }
}

impl From<RepoError> for ClaimError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}

impl From<CompensationFailure> for ClaimError {
    fn from(value: CompensationFailure) -> Self {
        Self::CompensationFailed(value)
    }
}

/// Result of draining the pending-release queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub released: u32,
    pub failed: u32,
}

/// Result of a manual unblock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnblockOutcome {
    /// The pair's row was removed.
    Released(Claim),
    /// The pair had no row.
    NoClaim,
    ResourceNotFound,
}

/// Coordinates the Resource Store and Claim Ledger for claim requests.
pub struct ClaimCoordinator<S: ResourceStore, L: ClaimLedger> {
    store: S,
    ledger: L,
    policy: CompensationPolicy,
}

impl<S: ResourceStore, L: ClaimLedger> ClaimCoordinator<S, L> {
    /// Creates a coordinator with the default compensation policy.
    pub fn new(store: S, ledger: L) -> Self {
        Self {
            store,
            ledger,
            policy: CompensationPolicy::default(),
        }
    }

    /// Replaces the compensation retry policy.
    pub fn with_policy(mut self, policy: CompensationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Attempts to claim one unit of `resource_name` for `actor_id`.
    ///
    /// # Contract
    /// - Unknown resource: `ResourceNotFound`, no side effects.
    /// - Existing row for the pair: `AlreadyClaimed`, stock untouched.
    /// - Reserved and decremented: `Claimed`.
    /// - Reserved but no stock: reservation released, then `NoStock`.
    pub fn claim_resource(
        &self,
        actor_id: &str,
        resource_name: &str,
    ) -> Result<ClaimOutcome, ClaimError> {
        let started_at = Instant::now();
        let result = self.run_claim(actor_id, resource_name);
        let duration_ms = started_at.elapsed().as_millis();

        match &result {
            Ok(outcome) => info!(
                "event=claim module=coordinator status=ok outcome={} resource={} duration_ms={}",
                outcome, resource_name, duration_ms
            ),
            Err(err) => error!(
                "event=claim module=coordinator status=error error_kind={:?} resource={} duration_ms={} error={}",
                err.kind(),
                resource_name,
                duration_ms,
                err
            ),
        }

        result
    }

    fn run_claim(&self, actor_id: &str, resource_name: &str) -> Result<ClaimOutcome, ClaimError> {
        validate_actor_id(actor_id)?;

        let Some(resource) = self.store.get_resource_by_name(resource_name)? else {
            return Ok(ClaimOutcome::ResourceNotFound);
        };

        let reservation = match self.ledger.reserve(actor_id, resource.id, &resource.name)? {
            ReserveOutcome::Created(reservation) => reservation,
            ReserveOutcome::AlreadyExists => return Ok(ClaimOutcome::AlreadyClaimed),
        };
        let claim_id = reservation.claim_id;
        let guard = ReservationGuard::new(&self.ledger, reservation);

        match self.store.decrement(resource.id, UNITS_PER_CLAIM) {
            Ok(DecrementOutcome::Applied { remaining }) => {
                guard.commit();
                debug!(
                    "event=decrement module=coordinator status=ok claim_id={} remaining={}",
                    claim_id, remaining
                );
                Ok(ClaimOutcome::Claimed)
            }
            Ok(DecrementOutcome::InsufficientStock) => {
                guard.compensate(&self.policy)?;
                Ok(ClaimOutcome::NoStock)
            }
            Ok(DecrementOutcome::NotFound) => {
                // Resolved a moment ago; only reachable if the row was removed
                // out of band.
                warn!(
                    "event=decrement module=coordinator status=not_found claim_id={} resource_id={}",
                    claim_id, resource.id
                );
                guard.compensate(&self.policy)?;
                Ok(ClaimOutcome::ResourceNotFound)
            }
            Err(err) => {
                // A failed statement leaves `remaining` unchanged, so the
                // reservation is stale.
                warn!(
                    "event=decrement module=coordinator status=error claim_id={} lock_contention={} error={}",
                    claim_id,
                    err.is_lock_contention(),
                    err
                );
                guard.compensate(&self.policy)?;
                Err(ClaimError::Storage(err))
            }
        }
    }

    /// Retries every queued compensation once.
    ///
    /// Entries that fail again stay queued with a refreshed `last_error`.
    pub fn reconcile_pending_releases(&self) -> RepoResult<ReconcileReport> {
        let pending = self.ledger.list_pending_releases()?;
        let mut report = ReconcileReport::default();

        for entry in pending {
            let reservation = entry.reservation();
            let result = self
                .ledger
                .release_reservation(&reservation)
                .and_then(|()| self.ledger.clear_pending_release(entry.claim_id));

            match result {
                Ok(()) => report.released += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        "event=reconcile module=coordinator status=retry_later claim_id={} error={}",
                        entry.claim_id, err
                    );
                    let refreshed = PendingRelease::for_reservation(
                        &reservation,
                        Some(sanitize_message(&err.to_string(), MAX_PERSISTED_ERROR_CHARS)),
                    );
                    if let Err(record_err) = self.ledger.record_pending_release(&refreshed) {
                        warn!(
                            "event=reconcile module=coordinator status=error claim_id={} error={}",
                            entry.claim_id, record_err
                        );
                    }
                }
            }
        }

        info!(
            "event=reconcile module=coordinator status=ok released={} failed={}",
            report.released, report.failed
        );
        Ok(report)
    }

    /// Removes whatever row holds the `(actor, resource)` slot.
    ///
    /// Operator escape hatch for reservations orphaned by a failed
    /// compensation. Using it on a real claim lets the actor claim again.
    pub fn unblock_actor(
        &self,
        actor_id: &str,
        resource_name: &str,
    ) -> Result<UnblockOutcome, ClaimError> {
        validate_actor_id(actor_id)?;

        let Some(resource) = self.store.get_resource_by_name(resource_name)? else {
            return Ok(UnblockOutcome::ResourceNotFound);
        };
        let Some(claim) = self.ledger.get_claim(actor_id, resource.id)? else {
            return Ok(UnblockOutcome::NoClaim);
        };

        self.ledger.release(actor_id, resource.id)?;
        warn!(
            "event=unblock module=coordinator status=ok actor_id={} resource_id={} claim_id={}",
            actor_id, resource.id, claim.claim_id
        );
        Ok(UnblockOutcome::Released(claim))
    }
}
