//! Core claim protocol for finite, named resources ("coupons").
//! This crate is the single source of truth for the no-oversell and
//! no-double-claim invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{CompensationPolicy, ConfigError, CoreConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::claim::{
    Claim, ClaimId, ClaimOutcome, ClaimValidationError, FailureKind, PendingRelease, Reservation,
};
pub use model::resource::{Resource, ResourceId, ResourceValidationError};
pub use repo::claim_repo::{ClaimLedger, ReserveOutcome, SqliteClaimLedger};
pub use repo::resource_repo::{DecrementOutcome, ResourceStore, SqliteResourceStore};
pub use repo::{RepoError, RepoResult};
pub use service::claim_service::{
    ClaimCoordinator, ClaimError, ReconcileReport, UnblockOutcome, UNITS_PER_CLAIM,
};
pub use service::compensation::CompensationFailure;
pub use service::resource_service::{ResourceService, ResourceServiceError};
pub use service::status_service::{ResourceStatus, StatusError, StatusService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
