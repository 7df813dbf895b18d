//! Domain model for finite-stock resources and their claims.
//!
//! # Responsibility
//! - Define canonical data structures used by the claim protocol.
//! - Define the terminal outcomes and failure taxonomy surfaced to callers.
//!
//! # Invariants
//! - Every resource is identified by a stable `ResourceId` and a unique name.
//! - Resources are never deleted; deactivation is a soft flag.
//! - At most one claim exists per `(actor_id, resource_id)`.

pub mod claim;
pub mod resource;
