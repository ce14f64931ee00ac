//! Append-only, hash-chained audit log.

use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Database, DbError, DbResult};
use crate::models::{AuditEntry, EntityKind, NewAuditEntry};

/// `prev_hash` of the first entry in the chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

const AUDIT_COLUMNS: &str = "id, actor, action, entity_type, entity_id, old_data, new_data, \
     timestamp, prev_hash, entry_hash";

/// Result of walking the audit chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditChainReport {
    /// Entries examined
    pub entries: u64,
    /// Id of the first entry whose links or hash do not match
    pub broken_at: Option<i64>,
}

impl AuditChainReport {
    pub fn is_intact(&self) -> bool {
        self.broken_at.is_none()
    }
}

/// SHA-256 of arbitrary data, hex encoded.
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash of an entry chained onto `prev_hash`.
pub fn chain_hash(prev_hash: &str, entry: &NewAuditEntry) -> DbResult<String> {
    let canonical = entry.to_canonical_json()?;
    Ok(hash_data(format!("{prev_hash}{canonical}").as_bytes()))
}

impl Database {
    /// Append an entry to the audit log.
    ///
    /// Must run inside a write transaction when other connections may
    /// append concurrently, so the chain head does not move underneath.
    pub fn append_audit_entry(&self, entry: &NewAuditEntry) -> DbResult<AuditEntry> {
        let prev_hash = self.audit_head()?.unwrap_or_else(|| GENESIS_HASH.to_string());
        let entry_hash = chain_hash(&prev_hash, entry)?;

        let old_data = entry.old_data.as_ref().map(serde_json::to_string).transpose()?;
        let new_data = entry.new_data.as_ref().map(serde_json::to_string).transpose()?;

        self.conn.execute(
            r#"
            INSERT INTO audit_log (
                actor, action, entity_type, entity_id, old_data, new_data,
                timestamp, prev_hash, entry_hash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                entry.actor,
                entry.action.as_str(),
                entry.entity_type.as_str(),
                entry.entity_id,
                old_data,
                new_data,
                entry.timestamp,
                prev_hash,
                entry_hash,
            ],
        )?;

        Ok(AuditEntry {
            id: self.conn.last_insert_rowid(),
            entry: entry.clone(),
            prev_hash,
            entry_hash,
        })
    }

    /// Hash of the most recent entry.
    pub fn audit_head(&self) -> DbResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT entry_hash FROM audit_log ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Audit history of one record, oldest first.
    pub fn audit_entries_for(&self, kind: EntityKind, entity_id: &str) -> DbResult<Vec<AuditEntry>> {
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE entity_type = ? AND entity_id = ? ORDER BY id"
        );
        self.fetch_all(
            &sql,
            &[kind.as_str().to_string().into(), entity_id.to_string().into()],
            audit_row,
        )
    }

    /// The most recent `limit` entries, newest first.
    pub fn recent_audit_entries(&self, limit: u32) -> DbResult<Vec<AuditEntry>> {
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_log ORDER BY id DESC LIMIT ?");
        self.fetch_all(&sql, &[i64::from(limit).into()], audit_row)
    }

    /// Walk the whole log and check every link and hash.
    pub fn verify_audit_chain(&self) -> DbResult<AuditChainReport> {
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_log ORDER BY id");
        let entries: Vec<AuditEntry> = self.fetch_all(&sql, &[], audit_row)?;

        let mut expected_prev = GENESIS_HASH.to_string();
        for stored in &entries {
            let recomputed = chain_hash(&stored.prev_hash, &stored.entry)?;
            if stored.prev_hash != expected_prev || recomputed != stored.entry_hash {
                tracing::warn!(entry_id = stored.id, "audit chain broken");
                return Ok(AuditChainReport {
                    entries: entries.len() as u64,
                    broken_at: Some(stored.id),
                });
            }
            expected_prev = stored.entry_hash.clone();
        }

        Ok(AuditChainReport {
            entries: entries.len() as u64,
            broken_at: None,
        })
    }
}

/// Intermediate row struct for database mapping.
pub(crate) struct AuditRow {
    id: i64,
    actor: Option<String>,
    action: String,
    entity_type: String,
    entity_id: String,
    old_data: Option<String>,
    new_data: Option<String>,
    timestamp: String,
    prev_hash: String,
    entry_hash: String,
}

fn audit_row(row: &Row<'_>) -> rusqlite::Result<AuditRow> {
    Ok(AuditRow {
        id: row.get(0)?,
        actor: row.get(1)?,
        action: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        old_data: row.get(5)?,
        new_data: row.get(6)?,
        timestamp: row.get(7)?,
        prev_hash: row.get(8)?,
        entry_hash: row.get(9)?,
    })
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = DbError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let old_data = row.old_data.as_deref().map(serde_json::from_str).transpose()?;
        let new_data = row.new_data.as_deref().map(serde_json::from_str).transpose()?;
        Ok(AuditEntry {
            id: row.id,
            entry: NewAuditEntry {
                actor: row.actor,
                action: row.action.parse()?,
                entity_type: row.entity_type.parse()?,
                entity_id: row.entity_id,
                old_data,
                new_data,
                timestamp: row.timestamp,
            },
            prev_hash: row.prev_hash,
            entry_hash: row.entry_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuditAction;
    use serde_json::json;

    fn entry(action: AuditAction, id: &str) -> NewAuditEntry {
        NewAuditEntry::new(action, EntityKind::Patient, id).with_new(Some(json!({"id": id})))
    }

    #[test]
    fn test_hash_data_known_vector() {
        assert_eq!(
            hash_data(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_first_entry_links_to_genesis() {
        let db = Database::open_in_memory().unwrap();
        let stored = db.append_audit_entry(&entry(AuditAction::Create, "P0001")).unwrap();

        assert_eq!(stored.prev_hash, GENESIS_HASH);
        assert_eq!(stored.entry_hash.len(), 64);
        assert_eq!(db.audit_head().unwrap(), Some(stored.entry_hash));
    }

    #[test]
    fn test_chain_links_and_verifies() {
        let db = Database::open_in_memory().unwrap();
        let first = db.append_audit_entry(&entry(AuditAction::Create, "P0001")).unwrap();
        let second = db
            .append_audit_entry(
                &entry(AuditAction::Update, "P0001").with_old(Some(json!({"id": "P0001"}))),
            )
            .unwrap();
        db.append_audit_entry(&entry(AuditAction::Create, "P0002")).unwrap();

        assert_eq!(second.prev_hash, first.entry_hash);

        let report = db.verify_audit_chain().unwrap();
        assert_eq!(report.entries, 3);
        assert!(report.is_intact());

        let history = db.audit_entries_for(EntityKind::Patient, "P0001").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].entry.action, AuditAction::Update);
        assert_eq!(history[1], second);

        let recent = db.recent_audit_entries(1).unwrap();
        assert_eq!(recent[0].entry.entity_id, "P0002");
    }

    #[test]
    fn test_tampering_is_detected() {
        let db = Database::open_in_memory().unwrap();
        db.append_audit_entry(&entry(AuditAction::Create, "P0001")).unwrap();
        db.append_audit_entry(&entry(AuditAction::Create, "P0002")).unwrap();

        // Bypass the append-only triggers the way a raw file edit would
        db.conn()
            .execute_batch(
                r#"
                DROP TRIGGER audit_log_no_update;
                UPDATE audit_log SET entity_id = 'P9999' WHERE id = 2;
                "#,
            )
            .unwrap();

        let report = db.verify_audit_chain().unwrap();
        assert_eq!(report.broken_at, Some(2));
        assert!(!report.is_intact());
    }

    #[test]
    fn test_empty_chain_is_intact() {
        let db = Database::open_in_memory().unwrap();
        let report = db.verify_audit_chain().unwrap();
        assert_eq!(report.entries, 0);
        assert!(report.is_intact());
    }
}
