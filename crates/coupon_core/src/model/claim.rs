//! Claim domain model and protocol outcomes.
//!
//! # Responsibility
//! - Define the claim record, the reservation handle, and pending
//!   compensations.
//! - Define the four terminal claim outcomes and the failure taxonomy.
//!
//! # Invariants
//! - A `Claim` row is keyed by `(actor_id, resource_id)`.
//! - A `Reservation` is a claim row whose decrement has not been confirmed
//!   yet; it carries the `claim_id` that scopes its compensation.

use crate::model::resource::ResourceId;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Maximum accepted actor id length, in characters.
pub const MAX_ACTOR_ID_CHARS: usize = 128;

/// Identifier of one reservation attempt. A fresh id is minted per reserve,
/// so a released-then-retaken pair never shares an id.
pub type ClaimId = Uuid;

/// Persisted claim record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: ClaimId,
    pub actor_id: String,
    pub resource_id: ResourceId,
    /// Denormalized for reporting.
    pub resource_name: String,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// Handle to a freshly taken claim slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub claim_id: ClaimId,
    pub actor_id: String,
    pub resource_id: ResourceId,
}

/// A compensation that could not be completed in-line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRelease {
    pub claim_id: ClaimId,
    pub actor_id: String,
    pub resource_id: ResourceId,
    /// Unix epoch milliseconds.
    pub recorded_at: i64,
    pub last_error: Option<String>,
}

impl PendingRelease {
    /// Builds a queue entry for a reservation whose release failed.
    pub fn for_reservation(reservation: &Reservation, last_error: Option<String>) -> Self {
        Self {
            claim_id: reservation.claim_id,
            actor_id: reservation.actor_id.clone(),
            resource_id: reservation.resource_id,
            recorded_at: 0,
            last_error,
        }
    }

    /// Reservation handle used to perform the deferred release.
    pub fn reservation(&self) -> Reservation {
        Reservation {
            claim_id: self.claim_id,
            actor_id: self.actor_id.clone(),
            resource_id: self.resource_id,
        }
    }
}

/// Terminal outcome of one claim request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOutcome {
    /// A unit was deducted and the claim record is permanent.
    Claimed,
    /// The actor already holds a claim (or an in-flight reservation).
    AlreadyClaimed,
    /// No unit was available; the reservation was compensated.
    NoStock,
    /// No resource with the requested name exists.
    ResourceNotFound,
}

impl ClaimOutcome {
    pub fn is_claimed(self) -> bool {
        matches!(self, Self::Claimed)
    }

    /// Failure class for non-success outcomes.
    pub fn failure_kind(self) -> Option<FailureKind> {
        match self {
            Self::Claimed => None,
            Self::AlreadyClaimed => Some(FailureKind::Conflict),
            Self::NoStock => Some(FailureKind::Exhausted),
            Self::ResourceNotFound => Some(FailureKind::NotFound),
        }
    }

    /// Stable snake_case label used in logs and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Claimed => "claimed",
            Self::AlreadyClaimed => "already_claimed",
            Self::NoStock => "no_stock",
            Self::ResourceNotFound => "resource_not_found",
        }
    }
}

impl Display for ClaimOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy shared by outcomes and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Resource absent.
    NotFound,
    /// Duplicate claim.
    Conflict,
    /// No stock left.
    Exhausted,
    /// Transient storage or infrastructure failure.
    StorageFault,
    /// Request rejected before any side effect.
    InvalidInput,
}

impl FailureKind {
    /// Whether the whole claim attempt may be retried automatically.
    ///
    /// `Exhausted` is left to the caller: retrying only helps if stock is
    /// replenished.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::StorageFault)
    }
}

/// Actor id shape violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimValidationError {
    BlankActorId,
    ActorIdTooLong { chars: usize },
}

impl Display for ClaimValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankActorId => write!(f, "actor id must not be blank"),
            Self::ActorIdTooLong { chars } => write!(
                f,
                "actor id has {chars} chars; limit is {MAX_ACTOR_ID_CHARS}"
            ),
        }
    }
}

impl Error for ClaimValidationError {}

/// Validates an actor id before it reaches the ledger.
pub fn validate_actor_id(actor_id: &str) -> Result<(), ClaimValidationError> {
    if actor_id.trim().is_empty() {
        return Err(ClaimValidationError::BlankActorId);
    }
    let chars = actor_id.chars().count();
    if chars > MAX_ACTOR_ID_CHARS {
        return Err(ClaimValidationError::ActorIdTooLong { chars });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_actor_id, ClaimOutcome, ClaimValidationError, FailureKind};

    #[test]
    fn outcomes_map_to_failure_kinds() {
        assert_eq!(ClaimOutcome::Claimed.failure_kind(), None);
        assert_eq!(
            ClaimOutcome::AlreadyClaimed.failure_kind(),
            Some(FailureKind::Conflict)
        );
        assert_eq!(
            ClaimOutcome::NoStock.failure_kind(),
            Some(FailureKind::Exhausted)
        );
        assert_eq!(
            ClaimOutcome::ResourceNotFound.failure_kind(),
            Some(FailureKind::NotFound)
        );
    }

    #[test]
    fn only_storage_faults_are_retryable() {
        assert!(FailureKind::StorageFault.is_retryable());
        assert!(!FailureKind::Exhausted.is_retryable());
        assert!(!FailureKind::Conflict.is_retryable());
    }

    #[test]
    fn outcome_serializes_as_snake_case() {
        let json = serde_json::to_string(&ClaimOutcome::AlreadyClaimed).unwrap();
        assert_eq!(json, "\"already_claimed\"");
        assert_eq!(ClaimOutcome::NoStock.to_string(), "no_stock");
    }

    #[test]
    fn actor_id_validation() {
        assert!(validate_actor_id("user-1").is_ok());
        assert_eq!(
            validate_actor_id(""),
            Err(ClaimValidationError::BlankActorId)
        );
        assert!(matches!(
            validate_actor_id(&"a".repeat(200)),
            Err(ClaimValidationError::ActorIdTooLong { chars: 200 })
        ));
    }
}
