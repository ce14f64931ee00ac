//! Sequential identifier generation.

use super::{Database, DbResult};
use crate::models::EntityKind;

impl Database {
    /// Next identifier for `kind`: one past the highest existing sequence number.
    ///
    /// Sequence numbers are compared numerically, so the order stays correct
    /// once identifiers grow past four digits. Call inside the same write
    /// transaction as the insert that consumes the identifier.
    pub fn next_id(&self, kind: EntityKind) -> DbResult<String> {
        let sql = format!(
            "SELECT MAX(CAST(substr(id, 2) AS INTEGER)) FROM {} WHERE id GLOB ?",
            kind.table()
        );
        let pattern = format!("{}[0-9]*", kind.prefix());
        let max: Option<i64> = self.conn.query_row(&sql, [pattern], |row| row.get(0))?;

        let next = max.map_or(1, |n| n.max(0) as u64 + 1);
        let id = kind.format_id(next);
        tracing::debug!(entity = %kind, %id, "generated identifier");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn insert_patient_with_id(db: &Database, id: &str) {
        db.conn()
            .execute(
                "INSERT INTO patients (id, name, age, gender, phone) VALUES (?1, 'X', 1, 'Other', ?1)",
                [id],
            )
            .unwrap();
    }

    #[test]
    fn test_first_id_starts_at_one() {
        let db = Database::open_in_memory().unwrap();
        for kind in EntityKind::ALL {
            assert_eq!(db.next_id(kind).unwrap(), kind.format_id(1));
        }
    }

    #[test]
    fn test_increments_highest_suffix() {
        let db = Database::open_in_memory().unwrap();
        insert_patient_with_id(&db, "P0001");
        insert_patient_with_id(&db, "P0007");
        insert_patient_with_id(&db, "P0003");
        assert_eq!(db.next_id(EntityKind::Patient).unwrap(), "P0008");
    }

    #[test]
    fn test_past_four_digits() {
        let db = Database::open_in_memory().unwrap();
        insert_patient_with_id(&db, "P9999");
        assert_eq!(db.next_id(EntityKind::Patient).unwrap(), "P10000");

        insert_patient_with_id(&db, "P10000");
        // Lexicographically "P9999" sorts last; numerically it does not
        assert_eq!(db.next_id(EntityKind::Patient).unwrap(), "P10001");
    }

    proptest! {
        #[test]
        fn prop_next_id_exceeds_every_existing(suffixes in proptest::collection::btree_set(1u64..50_000, 1..20)) {
            let db = Database::open_in_memory().unwrap();
            for n in &suffixes {
                insert_patient_with_id(&db, &EntityKind::Patient.format_id(*n));
            }

            let next = db.next_id(EntityKind::Patient).unwrap();
            let next_n = EntityKind::Patient.parse_id(&next).unwrap();
            prop_assert!(suffixes.iter().all(|n| next_n > *n));
        }
    }
}
