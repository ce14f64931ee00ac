//! Business services: validation, lifecycle rules and audit around the
//! storage layer.
//!
//! Each service borrows a [`Database`] for the duration of a call and
//! records every successful mutation through an [`AuditSink`].

mod appointments;
mod audit;
mod availability;
mod bills;
mod doctors;
mod guard;
mod patients;

pub use appointments::*;
pub use audit::*;
pub use availability::*;
pub use bills::*;
pub use doctors::*;
pub use guard::*;
pub use patients::*;

use thiserror::Error;

use crate::billing::BillingError;
use crate::db::DbError;
use crate::models::{EntityKind, InvalidValue};

/// Errors surfaced to callers of the services.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("cannot delete {entity} {id}: {appointments} appointment(s) and {bills} bill(s) depend on it")]
    DependencyBlocked {
        entity: EntityKind,
        id: String,
        appointments: u64,
        bills: u64,
    },

    #[error("storage error: {0}")]
    Storage(DbError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse error category, for mapping onto transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    DependencyBlocked,
    Internal,
}

impl ServiceError {
    pub fn not_found(entity: EntityKind, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotFound { .. } => ErrorKind::NotFound,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::DependencyBlocked { .. } => ErrorKind::DependencyBlocked,
            ServiceError::Storage(_) | ServiceError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to return to API callers. Storage detail is withheld.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Constraint(_) => {
                tracing::warn!(error = %e, "storage constraint rejected write");
                ServiceError::Conflict("a conflicting record already exists".to_string())
            }
            other => ServiceError::Storage(other),
        }
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::from(e).into()
    }
}

impl From<InvalidValue> for ServiceError {
    fn from(e: InvalidValue) -> Self {
        ServiceError::Validation(e.to_string())
    }
}

impl From<BillingError> for ServiceError {
    fn from(e: BillingError) -> Self {
        ServiceError::Validation(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ServiceError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ServiceError::Internal(format!("Lock poisoned: {}", e))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Current timestamp in the stored format.
pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Reject missing or blank required text.
pub(crate) fn require_text(field: &str, value: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Reject a blank replacement for a required field.
pub(crate) fn require_text_opt(field: &str, value: Option<&String>) -> ServiceResult<()> {
    match value {
        Some(v) => require_text(field, v),
        None => Ok(()),
    }
}
