//! Patient database operations.

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension, Row};

use super::{parse_opt, Database, DbError, DbResult, QueryFilter};
use crate::models::{
    zeroed, BloodGroup, Gender, Page, PageRequest, Patient, PatientFilter, PatientStatistics,
    DATE_FORMAT,
};

const PATIENT_COLUMNS: &str = "p.id, p.name, p.age, p.gender, p.phone, p.email, p.blood_group, \
     p.address, p.medical_history, p.created_at, p.updated_at";

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO patients (
                id, name, age, gender, phone, email, blood_group,
                address, medical_history, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                patient.id,
                patient.name,
                patient.age,
                patient.gender.as_str(),
                patient.phone,
                patient.email,
                patient.blood_group.map(|bg| bg.as_str()),
                patient.address,
                patient.medical_history,
                patient.created_at,
                patient.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing patient.
    pub fn update_patient(&self, patient: &Patient) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                name = ?2,
                age = ?3,
                gender = ?4,
                phone = ?5,
                email = ?6,
                blood_group = ?7,
                address = ?8,
                medical_history = ?9,
                updated_at = ?10
            WHERE id = ?1
            "#,
            params![
                patient.id,
                patient.name,
                patient.age,
                patient.gender.as_str(),
                patient.phone,
                patient.email,
                patient.blood_group.map(|bg| bg.as_str()),
                patient.address,
                patient.medical_history,
                patient.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, id: &str) -> DbResult<Option<Patient>> {
        let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients p WHERE p.id = ?");
        self.conn
            .query_row(&sql, [id], patient_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get a patient by phone number.
    pub fn get_patient_by_phone(&self, phone: &str) -> DbResult<Option<Patient>> {
        let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients p WHERE p.phone = ?");
        self.conn
            .query_row(&sql, [phone], patient_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List patients, newest first.
    pub fn list_patients(&self, filter: &PatientFilter, page: PageRequest) -> DbResult<Page<Patient>> {
        let mut query = QueryFilter::new();
        if let Some(search) = &filter.search {
            query.push_search(&["p.name", "p.id", "p.phone", "p.email"], search);
        }
        self.fetch_page(
            PATIENT_COLUMNS,
            "patients p",
            &query,
            "p.created_at DESC, p.id DESC",
            page,
            patient_row,
        )
    }

    /// Delete a patient. Dependent appointments and bills cascade.
    pub fn delete_patient(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM patients WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Number of appointments referencing a patient.
    pub fn count_patient_appointments(&self, id: &str) -> DbResult<u64> {
        self.count_where("appointments", "patient_id", id)
    }

    /// Number of bills referencing a patient.
    pub fn count_patient_bills(&self, id: &str) -> DbResult<u64> {
        self.count_where("bills", "patient_id", id)
    }

    /// Patient statistics. Patients registered on or after `since` count as new.
    pub fn patient_statistics(&self, since: NaiveDate) -> DbResult<PatientStatistics> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
        let new_patients: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM patients WHERE substr(created_at, 1, 10) >= ?",
            [since.format(DATE_FORMAT).to_string()],
            |row| row.get(0),
        )?;

        let mut blood_groups = zeroed(&BloodGroup::ALL);
        for (value, count) in self.group_counts(
            "SELECT blood_group, COUNT(*) FROM patients WHERE blood_group IS NOT NULL GROUP BY blood_group",
        )? {
            blood_groups.insert(value.parse::<BloodGroup>()?, count);
        }

        let mut gender_distribution = zeroed(&Gender::ALL);
        for (value, count) in
            self.group_counts("SELECT gender, COUNT(*) FROM patients GROUP BY gender")?
        {
            gender_distribution.insert(value.parse::<Gender>()?, count);
        }

        Ok(PatientStatistics {
            total_patients: total as u64,
            new_patients: new_patients as u64,
            blood_groups,
            gender_distribution,
        })
    }

    /// Run a `SELECT value, COUNT(*) ... GROUP BY value` query.
    pub(crate) fn group_counts_with(
        &self,
        sql: &str,
        values: &[Value],
    ) -> DbResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub(crate) fn group_counts(&self, sql: &str) -> DbResult<Vec<(String, u64)>> {
        self.group_counts_with(sql, &[])
    }
}

/// Intermediate row struct for database mapping.
pub(crate) struct PatientRow {
    id: String,
    name: String,
    age: u32,
    gender: String,
    phone: String,
    email: Option<String>,
    blood_group: Option<String>,
    address: Option<String>,
    medical_history: Option<String>,
    created_at: String,
    updated_at: String,
}

fn patient_row(row: &Row<'_>) -> rusqlite::Result<PatientRow> {
    Ok(PatientRow {
        id: row.get(0)?,
        name: row.get(1)?,
        age: row.get(2)?,
        gender: row.get(3)?,
        phone: row.get(4)?,
        email: row.get(5)?,
        blood_group: row.get(6)?,
        address: row.get(7)?,
        medical_history: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl TryFrom<PatientRow> for Patient {
    type Error = DbError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        Ok(Patient {
            id: row.id,
            name: row.name,
            age: row.age,
            gender: row.gender.parse()?,
            phone: row.phone,
            email: row.email,
            blood_group: parse_opt(row.blood_group)?,
            address: row.address,
            medical_history: row.medical_history,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
