//! SQLite schema definition.

/// Complete database schema for medicore.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Patients
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,                         -- P0001
    name TEXT NOT NULL,
    age INTEGER NOT NULL CHECK (age >= 0),
    gender TEXT NOT NULL CHECK (gender IN ('Male', 'Female', 'Other')),
    phone TEXT NOT NULL UNIQUE,
    email TEXT,
    blood_group TEXT CHECK (blood_group IN ('A+', 'A-', 'B+', 'B-', 'AB+', 'AB-', 'O+', 'O-')),
    address TEXT,
    medical_history TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(name);
CREATE INDEX IF NOT EXISTS idx_patients_created ON patients(created_at);

-- ============================================================================
-- Doctors
-- ============================================================================

CREATE TABLE IF NOT EXISTS doctors (
    id TEXT PRIMARY KEY,                         -- D0001
    name TEXT NOT NULL,
    specialization TEXT NOT NULL,
    phone TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    experience INTEGER NOT NULL CHECK (experience >= 0),
    qualification TEXT NOT NULL,
    consultation_fee TEXT NOT NULL,              -- decimal string, 2 places
    status TEXT NOT NULL DEFAULT 'Active' CHECK (status IN ('Active', 'On Leave', 'Inactive')),
    address TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_doctors_specialization ON doctors(specialization);
CREATE INDEX IF NOT EXISTS idx_doctors_status ON doctors(status);

-- ============================================================================
-- Appointments
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointments (
    id TEXT PRIMARY KEY,                         -- A0001
    patient_id TEXT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    doctor_id TEXT NOT NULL REFERENCES doctors(id) ON DELETE CASCADE,
    date TEXT NOT NULL,                          -- YYYY-MM-DD
    time TEXT NOT NULL,                          -- HH:MM
    reason TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'confirmed', 'completed', 'cancelled')),
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_appointments_patient ON appointments(patient_id);
CREATE INDEX IF NOT EXISTS idx_appointments_doctor ON appointments(doctor_id);
CREATE INDEX IF NOT EXISTS idx_appointments_date ON appointments(date);
CREATE INDEX IF NOT EXISTS idx_appointments_status ON appointments(status);

-- At most one active appointment per slot
CREATE UNIQUE INDEX IF NOT EXISTS idx_appointments_active_slot
    ON appointments(doctor_id, date, time)
    WHERE status IN ('pending', 'confirmed');

-- ============================================================================
-- Bills
-- ============================================================================

CREATE TABLE IF NOT EXISTS bills (
    id TEXT PRIMARY KEY,                         -- B0001
    patient_id TEXT NOT NULL REFERENCES patients(id) ON DELETE CASCADE,
    appointment_id TEXT REFERENCES appointments(id) ON DELETE CASCADE,
    subtotal TEXT NOT NULL,                      -- decimal strings, 2 places
    discount TEXT NOT NULL DEFAULT '0.00',
    tax_rate TEXT NOT NULL DEFAULT '0.00',       -- percentage
    tax TEXT NOT NULL DEFAULT '0.00',            -- computed amount
    total_amount TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'partial', 'paid')),
    payment_method TEXT CHECK (payment_method IN ('cash', 'card', 'upi', 'insurance')),
    notes TEXT,
    date TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_bills_patient ON bills(patient_id);
CREATE INDEX IF NOT EXISTS idx_bills_appointment ON bills(appointment_id);
CREATE INDEX IF NOT EXISTS idx_bills_status ON bills(status);
CREATE INDEX IF NOT EXISTS idx_bills_date ON bills(date);

CREATE TABLE IF NOT EXISTS bill_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bill_id TEXT NOT NULL REFERENCES bills(id) ON DELETE CASCADE,
    description TEXT NOT NULL,
    amount TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_bill_items_bill ON bill_items(bill_id);

-- Paid bills are immutable
CREATE TRIGGER IF NOT EXISTS bills_paid_no_update BEFORE UPDATE ON bills
WHEN old.status = 'paid'
BEGIN
    SELECT RAISE(ABORT, 'Paid bills cannot be modified');
END;

-- ============================================================================
-- Audit Log (Append-Only)
-- ============================================================================

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    actor TEXT,                                  -- NULL until authentication exists
    action TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    old_data TEXT,                               -- JSON snapshot
    new_data TEXT,                               -- JSON snapshot
    timestamp TEXT NOT NULL,
    prev_hash TEXT NOT NULL,
    entry_hash TEXT NOT NULL UNIQUE
);

CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity_type, entity_id);

CREATE TRIGGER IF NOT EXISTS audit_log_no_update BEFORE UPDATE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'Audit log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS audit_log_no_delete BEFORE DELETE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'Audit log is append-only');
END;
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO patients (id, name, age, gender, phone) VALUES ('P0001', 'A', 30, 'Male', '111')",
            [],
        )
        .unwrap();
        conn.execute(
            r#"INSERT INTO doctors (id, name, specialization, phone, email, experience, qualification, consultation_fee)
               VALUES ('D0001', 'Dr. B', 'Cardiology', '222', 'b@example.com', 10, 'MD', '500.00')"#,
            [],
        )
        .unwrap();
        conn
    }

    fn book(conn: &Connection, id: &str, status: &str) -> rusqlite::Result<usize> {
        conn.execute(
            r#"INSERT INTO appointments (id, patient_id, doctor_id, date, time, reason, status)
               VALUES (?1, 'P0001', 'D0001', '2024-01-10', '09:00', 'checkup', ?2)"#,
            [id, status],
        )
    }

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_active_slot_unique() {
        let conn = setup();

        assert!(book(&conn, "A0001", "pending").is_ok());
        // Second active booking in the same slot is rejected
        assert!(book(&conn, "A0002", "confirmed").is_err());
        // Inactive appointments never occupy the slot
        assert!(book(&conn, "A0003", "cancelled").is_ok());
        assert!(book(&conn, "A0004", "completed").is_ok());
    }

    #[test]
    fn test_cancelled_slot_can_be_rebooked() {
        let conn = setup();

        book(&conn, "A0001", "pending").unwrap();
        conn.execute("UPDATE appointments SET status = 'cancelled' WHERE id = 'A0001'", [])
            .unwrap();
        assert!(book(&conn, "A0002", "pending").is_ok());
    }

    #[test]
    fn test_audit_log_append_only() {
        let conn = setup();
        conn.execute(
            r#"INSERT INTO audit_log (action, entity_type, entity_id, timestamp, prev_hash, entry_hash)
               VALUES ('CREATE', 'patient', 'P0001', 'now', '0', 'h1')"#,
            [],
        )
        .unwrap();

        assert!(conn
            .execute("UPDATE audit_log SET action = 'DELETE'", [])
            .is_err());
        assert!(conn.execute("DELETE FROM audit_log", []).is_err());
    }

    #[test]
    fn test_paid_bill_cannot_be_updated() {
        let conn = setup();
        conn.execute(
            r#"INSERT INTO bills (id, patient_id, subtotal, total_amount, status, date)
               VALUES ('B0001', 'P0001', '10.00', '10.00', 'paid', '2024-01-10T00:00:00Z')"#,
            [],
        )
        .unwrap();

        assert!(conn
            .execute("UPDATE bills SET notes = 'x' WHERE id = 'B0001'", [])
            .is_err());
    }

    #[test]
    fn test_patient_delete_cascades() {
        let conn = setup();
        book(&conn, "A0001", "pending").unwrap();
        conn.execute(
            r#"INSERT INTO bills (id, patient_id, appointment_id, subtotal, total_amount, date)
               VALUES ('B0001', 'P0001', 'A0001', '10.00', '10.00', '2024-01-10T00:00:00Z')"#,
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO bill_items (bill_id, description, amount) VALUES ('B0001', 'x', '10.00')",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM patients WHERE id = 'P0001'", []).unwrap();

        for table in ["appointments", "bills", "bill_items"] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
                .unwrap();
            assert_eq!(count, 0, "{table} should be empty");
        }
    }
}
