//! Compensating release for reservations whose decrement did not apply.
//!
//! # Responsibility
//! - Hold a reservation between reserve and decrement.
//! - Undo it with bounded retries, queueing it for reconciliation when every
//!   attempt fails.
//!
//! # Invariants
//! - A guard is always resolved: committed, compensated, or released on
//!   drop. A reservation is never abandoned silently.
//! - Compensation deletes only the row minted by its own reservation.

use crate::config::CompensationPolicy;
use crate::logging::sanitize_message;
use crate::model::claim::{PendingRelease, Reservation};
use crate::repo::claim_repo::ClaimLedger;
use crate::repo::RepoError;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Cap for storage error text persisted with a pending release.
pub(crate) const MAX_PERSISTED_ERROR_CHARS: usize = 240;

/// Compensation that exhausted its attempts.
///
/// The reservation is still in the ledger and blocks the actor from claiming
/// the resource until it is reconciled or unblocked.
#[derive(Debug)]
pub struct CompensationFailure {
    pub reservation: Reservation,
    pub attempts: u32,
    /// Whether the reservation reached the pending-release queue.
    pub queued: bool,
    pub source: RepoError,
}

impl Display for CompensationFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "failed to release reservation {} for actor `{}` on resource {} after {} attempt(s) (queued={}): {}",
            self.reservation.claim_id,
            self.reservation.actor_id,
            self.reservation.resource_id,
            self.attempts,
            self.queued,
            self.source
        )
    }
}

impl Error for CompensationFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Scope guard around a live reservation.
///
/// Dropping an unresolved guard (a panic between reserve and decrement)
/// makes one release attempt and queues the reservation if that fails.
pub(crate) struct ReservationGuard<'a, L: ClaimLedger> {
    ledger: &'a L,
    reservation: Reservation,
    armed: bool,
}

impl<'a, L: ClaimLedger> ReservationGuard<'a, L> {
    pub(crate) fn new(ledger: &'a L, reservation: Reservation) -> Self {
        Self {
            ledger,
            reservation,
            armed: true,
        }
    }

    /// Keeps the reservation as a permanent claim.
    pub(crate) fn commit(mut self) {
        self.armed = false;
    }

    /// Releases the reservation, retrying per `policy`.
    ///
    /// Returns the number of attempts used on success.
    pub(crate) fn compensate(
        mut self,
        policy: &CompensationPolicy,
    ) -> Result<u32, CompensationFailure> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;
        let last_error = loop {
            attempt += 1;
            match self.ledger.release_reservation(&self.reservation) {
                Ok(()) => {
                    self.armed = false;
                    info!(
                        "event=compensation module=coordinator status=ok claim_id={} attempts={}",
                        self.reservation.claim_id, attempt
                    );
                    return Ok(attempt);
                }
                Err(err) => {
                    warn!(
                        "event=compensation module=coordinator status=retry claim_id={} attempt={} max_attempts={} lock_contention={} error={}",
                        self.reservation.claim_id,
                        attempt,
                        max_attempts,
                        err.is_lock_contention(),
                        err
                    );
                    if attempt >= max_attempts {
                        break err;
                    }
                    let delay = policy.backoff_after(attempt);
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
            }
        };

        self.armed = false;
        let queued = queue_pending_release(self.ledger, &self.reservation, &last_error);
        error!(
            "event=compensation module=coordinator status=error error_code=orphaned_reservation actor_id={} resource_id={} claim_id={} attempts={} queued={} error={}",
            self.reservation.actor_id,
            self.reservation.resource_id,
            self.reservation.claim_id,
            attempt,
            queued,
            last_error
        );

        Err(CompensationFailure {
            reservation: self.reservation.clone(),
            attempts: attempt,
            queued,
            source: last_error,
        })
    }
}

impl<L: ClaimLedger> Drop for ReservationGuard<'_, L> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        match self.ledger.release_reservation(&self.reservation) {
            Ok(()) => warn!(
                "event=compensation module=coordinator status=ok trigger=unwind claim_id={}",
                self.reservation.claim_id
            ),
            Err(err) => {
                let queued = queue_pending_release(self.ledger, &self.reservation, &err);
                error!(
                    "event=compensation module=coordinator status=error trigger=unwind error_code=orphaned_reservation actor_id={} resource_id={} claim_id={} queued={} error={}",
                    self.reservation.actor_id,
                    self.reservation.resource_id,
                    self.reservation.claim_id,
                    queued,
                    err
                );
            }
        }
    }
}

fn queue_pending_release<L: ClaimLedger>(
    ledger: &L,
    reservation: &Reservation,
    cause: &RepoError,
) -> bool {
    let message = sanitize_message(&cause.to_string(), MAX_PERSISTED_ERROR_CHARS);
    let pending = PendingRelease::for_reservation(reservation, Some(message));
    match ledger.record_pending_release(&pending) {
        Ok(()) => true,
        Err(err) => {
            error!(
                "event=pending_release_record module=coordinator status=error claim_id={} error={}",
                reservation.claim_id, err
            );
            false
        }
    }
}
