//! Resource provisioning use-cases.
//!
//! # Responsibility
//! - Create resources with a fixed total.
//! - Soft-deactivate resources; nothing is ever deleted.

use crate::model::resource::{Resource, ResourceValidationError};
use crate::repo::resource_repo::ResourceStore;
use crate::repo::{RepoError, RepoResult};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum ResourceServiceError {
    AlreadyExists(String),
    ResourceNotFound(String),
    Validation(ResourceValidationError),
    Repo(RepoError),
    /// Write succeeded but read-back did not find the row.
    InconsistentState(&'static str),
}

impl Display for ResourceServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyExists(name) => write!(f, "resource already exists: `{name}`"),
            Self::ResourceNotFound(name) => write!(f, "resource not found: `{name}`"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => {
                write!(f, "inconsistent resource state: {details}")
            }
        }
    }
}

impl Error for ResourceServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ResourceServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::DuplicateName(name) => Self::AlreadyExists(name),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

/// Provisioning facade over a resource store.
pub struct ResourceService<S: ResourceStore> {
    store: S,
}

impl<S: ResourceStore> ResourceService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates a fully stocked resource.
    ///
    /// `expires_at` (epoch ms) is recorded for reporting only.
    pub fn create_resource(
        &self,
        name: impl Into<String>,
        total: u32,
        expires_at: Option<i64>,
    ) -> Result<Resource, ResourceServiceError> {
        let resource = Resource::new(name, total).with_expiry(expires_at);
        let id = self.store.create_resource(&resource)?;
        info!(
            "event=resource_create module=provisioning status=ok resource_id={} total={}",
            id, total
        );
        self.store
            .get_resource(id)?
            .ok_or(ResourceServiceError::InconsistentState(
                "created resource not found in read-back",
            ))
    }

    /// Clears the active flag. Idempotent.
    pub fn deactivate_resource(&self, name: &str) -> Result<Resource, ResourceServiceError> {
        let resource = self
            .store
            .get_resource_by_name(name)?
            .ok_or_else(|| ResourceServiceError::ResourceNotFound(name.to_string()))?;

        self.store.set_active(resource.id, false)?;
        info!(
            "event=resource_deactivate module=provisioning status=ok resource_id={}",
            resource.id
        );
        self.store
            .get_resource(resource.id)?
            .ok_or(ResourceServiceError::InconsistentState(
                "deactivated resource not found in read-back",
            ))
    }

    pub fn get_resource(&self, name: &str) -> RepoResult<Option<Resource>> {
        self.store.get_resource_by_name(name)
    }
}
