//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate the Resource Store and Claim Ledger into the claim protocol.
//! - Provide read-only status reporting and resource provisioning.
//!
//! # Invariants
//! - Services never bypass repository contracts to touch SQL directly.
//! - Services hold no locks; all synchronization lives in storage.

pub mod claim_service;
pub mod compensation;
pub mod resource_service;
pub mod status_service;
