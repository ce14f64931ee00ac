//! Best-effort audit recording.

use serde::Serialize;
use thiserror::Error;

use crate::db::Database;
use crate::models::{AuditAction, EntityKind, NewAuditEntry};

/// An audit sink failure.
#[derive(Error, Debug)]
#[error("audit sink failed: {0}")]
pub struct AuditError(pub String);

/// Destination for audit entries.
pub trait AuditSink {
    fn append(&self, entry: &NewAuditEntry) -> Result<(), AuditError>;
}

impl AuditSink for Database {
    fn append(&self, entry: &NewAuditEntry) -> Result<(), AuditError> {
        let append = || -> crate::db::DbResult<()> {
            let tx = self.immediate_transaction()?;
            self.append_audit_entry(entry)?;
            tx.commit()?;
            Ok(())
        };
        append().map_err(|e| AuditError(e.to_string()))
    }
}

/// Records mutations on a sink. Failures are logged and swallowed so they
/// never undo or fail the mutation being recorded.
#[derive(Clone, Copy)]
pub struct AuditRecorder<'a> {
    sink: &'a dyn AuditSink,
}

impl<'a> AuditRecorder<'a> {
    pub fn new(sink: &'a dyn AuditSink) -> Self {
        Self { sink }
    }

    /// Record a mutation with optional before/after snapshots.
    pub fn record<T: Serialize>(
        &self,
        action: AuditAction,
        entity: EntityKind,
        id: &str,
        old: Option<&T>,
        new: Option<&T>,
    ) {
        let entry = match (snapshot(old), snapshot(new)) {
            (Ok(old_data), Ok(new_data)) => NewAuditEntry::new(action, entity, id)
                .with_old(old_data)
                .with_new(new_data),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(%action, %entity, %id, error = %e, "audit snapshot failed");
                return;
            }
        };

        if let Err(e) = self.sink.append(&entry) {
            tracing::warn!(%action, %entity, %id, error = %e, "audit recording failed");
        }
    }
}

fn snapshot<T: Serialize>(value: Option<&T>) -> Result<Option<serde_json::Value>, serde_json::Error> {
    value.map(serde_json::to_value).transpose()
}
