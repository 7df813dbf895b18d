//! Query facade: read-only resource status.
//!
//! # Invariants
//! - Never writes. Reads resource and claims separately; under concurrent
//!   claims the two reads may straddle a claim in flight.

use crate::repo::claim_repo::ClaimLedger;
use crate::repo::resource_repo::ResourceStore;
use crate::repo::RepoError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Status snapshot for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub name: String,
    pub total: u32,
    pub remaining: u32,
    pub is_active: bool,
    pub expires_at: Option<i64>,
    /// Actor ids with a live claim row, oldest first.
    pub claimants: Vec<String>,
}

#[derive(Debug)]
pub enum StatusError {
    ResourceNotFound(String),
    Repo(RepoError),
}

impl Display for StatusError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResourceNotFound(name) => write!(f, "resource not found: `{name}`"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StatusError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::ResourceNotFound(_) => None,
        }
    }
}

impl From<RepoError> for StatusError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Read-only join of resource stock and claimants.
pub struct StatusService<S: ResourceStore, L: ClaimLedger> {
    store: S,
    ledger: L,
}

impl<S: ResourceStore, L: ClaimLedger> StatusService<S, L> {
    pub fn new(store: S, ledger: L) -> Self {
        Self { store, ledger }
    }

    /// Returns stock and claimants for `resource_name`.
    pub fn get_status(&self, resource_name: &str) -> Result<ResourceStatus, StatusError> {
        let resource = self
            .store
            .get_resource_by_name(resource_name)?
            .ok_or_else(|| StatusError::ResourceNotFound(resource_name.to_string()))?;

        let claimants = self
            .ledger
            .list_claims(resource.id)?
            .into_iter()
            .map(|claim| claim.actor_id)
            .collect();

        Ok(ResourceStatus {
            name: resource.name,
            total: resource.total,
            remaining: resource.remaining,
            is_active: resource.is_active,
            expires_at: resource.expires_at,
            claimants,
        })
    }
}
