//! Resource domain model.
//!
//! # Responsibility
//! - Define the named, finite-stock record that actors claim units of.
//! - Validate shape invariants before persistence.
//!
//! # Invariants
//! - `id` is stable and never reused for another resource.
//! - `total` is fixed at creation; `remaining` stays within `0..=total`.
//! - `expires_at` is informational only and not enforced by the core.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Maximum accepted resource name length, in characters.
pub const MAX_RESOURCE_NAME_CHARS: usize = 128;

/// Stable identifier for a resource.
pub type ResourceId = Uuid;

/// Named finite-stock entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    /// Unique, human-facing lookup key.
    pub name: String,
    /// Units provisioned at creation. Immutable afterwards.
    pub total: u32,
    /// Units still available for claiming.
    pub remaining: u32,
    /// Soft-deactivation flag.
    pub is_active: bool,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds. Stored and reported, never enforced.
    pub expires_at: Option<i64>,
    /// Unix epoch milliseconds of the last stock or flag change.
    pub updated_at: i64,
}

/// Shape violations detected by [`Resource::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceValidationError {
    BlankName,
    NameTooLong { chars: usize },
    RemainingExceedsTotal { remaining: u32, total: u32 },
}

impl Display for ResourceValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "resource name must not be blank"),
            Self::NameTooLong { chars } => write!(
                f,
                "resource name has {chars} chars; limit is {MAX_RESOURCE_NAME_CHARS}"
            ),
            Self::RemainingExceedsTotal { remaining, total } => {
                write!(f, "remaining {remaining} exceeds total {total}")
            }
        }
    }
}

impl Error for ResourceValidationError {}

impl Resource {
    /// Builds a fresh, fully stocked resource with a generated id.
    ///
    /// Timestamps are placeholders until the row is persisted; storage
    /// assigns `created_at`/`updated_at`.
    pub fn new(name: impl Into<String>, total: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            total,
            remaining: total,
            is_active: true,
            created_at: 0,
            expires_at: None,
            updated_at: 0,
        }
    }

    /// Sets an informational expiry timestamp.
    pub fn with_expiry(mut self, expires_at: Option<i64>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Checks shape invariants.
    pub fn validate(&self) -> Result<(), ResourceValidationError> {
        validate_resource_name(&self.name)?;
        if self.remaining > self.total {
            return Err(ResourceValidationError::RemainingExceedsTotal {
                remaining: self.remaining,
                total: self.total,
            });
        }
        Ok(())
    }

    /// Units already handed out.
    pub fn claimed_units(&self) -> u32 {
        self.total - self.remaining
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Validates a resource name used for lookup or creation.
pub fn validate_resource_name(name: &str) -> Result<(), ResourceValidationError> {
    if name.trim().is_empty() {
        return Err(ResourceValidationError::BlankName);
    }
    let chars = name.chars().count();
    if chars > MAX_RESOURCE_NAME_CHARS {
        return Err(ResourceValidationError::NameTooLong { chars });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_resource_name, Resource, ResourceValidationError};

    #[test]
    fn new_resource_starts_fully_stocked_and_active() {
        let resource = Resource::new("FLASH_SALE", 5);
        assert_eq!(resource.remaining, 5);
        assert!(resource.is_active);
        assert_eq!(resource.claimed_units(), 0);
        assert!(resource.validate().is_ok());
    }

    #[test]
    fn validate_rejects_remaining_above_total() {
        let mut resource = Resource::new("X", 1);
        resource.remaining = 2;
        assert_eq!(
            resource.validate(),
            Err(ResourceValidationError::RemainingExceedsTotal {
                remaining: 2,
                total: 1
            })
        );
    }

    #[test]
    fn name_validation_rejects_blank_and_oversized() {
        assert_eq!(
            validate_resource_name("   "),
            Err(ResourceValidationError::BlankName)
        );
        let long = "n".repeat(129);
        assert!(matches!(
            validate_resource_name(&long),
            Err(ResourceValidationError::NameTooLong { chars: 129 })
        ));
    }
}
