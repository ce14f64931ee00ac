//! Audit trail models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{EntityKind, InvalidValue};

/// The kind of mutation an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Confirm,
    Cancel,
    Complete,
    MarkPaid,
    StatusChange,
    /// Administrative delete including dependent records
    Purge,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Confirm => "CONFIRM",
            AuditAction::Cancel => "CANCEL",
            AuditAction::Complete => "COMPLETE",
            AuditAction::MarkPaid => "MARK_PAID",
            AuditAction::StatusChange => "STATUS_CHANGE",
            AuditAction::Purge => "PURGE",
        }
    }
}

impl FromStr for AuditAction {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(AuditAction::Create),
            "UPDATE" => Ok(AuditAction::Update),
            "DELETE" => Ok(AuditAction::Delete),
            "CONFIRM" => Ok(AuditAction::Confirm),
            "CANCEL" => Ok(AuditAction::Cancel),
            "COMPLETE" => Ok(AuditAction::Complete),
            "MARK_PAID" => Ok(AuditAction::MarkPaid),
            "STATUS_CHANGE" => Ok(AuditAction::StatusChange),
            "PURGE" => Ok(AuditAction::Purge),
            _ => Err(InvalidValue::new("audit action", s)),
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An audit record as handed to the recorder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAuditEntry {
    /// Acting user; always `None` until authentication exists
    pub actor: Option<String>,
    pub action: AuditAction,
    pub entity_type: EntityKind,
    pub entity_id: String,
    /// Snapshot before the mutation
    pub old_data: Option<Value>,
    /// Snapshot after the mutation
    pub new_data: Option<Value>,
    pub timestamp: String,
}

impl NewAuditEntry {
    pub fn new(action: AuditAction, entity_type: EntityKind, entity_id: impl Into<String>) -> Self {
        Self {
            actor: None,
            action,
            entity_type,
            entity_id: entity_id.into(),
            old_data: None,
            new_data: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_old(mut self, old_data: Option<Value>) -> Self {
        self.old_data = old_data;
        self
    }

    pub fn with_new(mut self, new_data: Option<Value>) -> Self {
        self.new_data = new_data;
        self
    }

    /// Canonical serialization used for the hash chain.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        // serde_json maps keep keys sorted, so nested snapshots hash stably
        serde_json::to_string(&serde_json::to_value(self)?)
    }
}

/// A stored audit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub id: i64,
    #[serde(flatten)]
    pub entry: NewAuditEntry,
    /// Hash of the preceding entry (all zeros for the first)
    pub prev_hash: String,
    /// SHA-256 over `prev_hash` and the canonical entry
    pub entry_hash: String,
}
