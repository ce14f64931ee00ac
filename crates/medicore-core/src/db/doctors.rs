//! Doctor database operations.

use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension, Row};
use rust_decimal::Decimal;

use super::{parse_money, Database, DbError, DbResult, QueryFilter};
use crate::models::{
    round_money, zeroed, Doctor, DoctorFilter, DoctorPerformance, DoctorStatistics, DoctorStatus,
    Page, PageRequest, SpecializationCount,
};

const DOCTOR_COLUMNS: &str = "d.id, d.name, d.specialization, d.phone, d.email, d.experience, \
     d.qualification, d.consultation_fee, d.status, d.address, d.created_at, d.updated_at";

/// Number of specializations reported in doctor statistics.
const TOP_SPECIALIZATIONS: usize = 10;

impl Database {
    /// Insert a new doctor.
    pub fn insert_doctor(&self, doctor: &Doctor) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO doctors (
                id, name, specialization, phone, email, experience, qualification,
                consultation_fee, status, address, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                doctor.id,
                doctor.name,
                doctor.specialization,
                doctor.phone,
                doctor.email,
                doctor.experience,
                doctor.qualification,
                doctor.consultation_fee.to_string(),
                doctor.status.as_str(),
                doctor.address,
                doctor.created_at,
                doctor.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing doctor.
    pub fn update_doctor(&self, doctor: &Doctor) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE doctors SET
                name = ?2,
                specialization = ?3,
                phone = ?4,
                email = ?5,
                experience = ?6,
                qualification = ?7,
                consultation_fee = ?8,
                status = ?9,
                address = ?10,
                updated_at = ?11
            WHERE id = ?1
            "#,
            params![
                doctor.id,
                doctor.name,
                doctor.specialization,
                doctor.phone,
                doctor.email,
                doctor.experience,
                doctor.qualification,
                doctor.consultation_fee.to_string(),
                doctor.status.as_str(),
                doctor.address,
                doctor.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a doctor by ID.
    pub fn get_doctor(&self, id: &str) -> DbResult<Option<Doctor>> {
        let sql = format!("SELECT {DOCTOR_COLUMNS} FROM doctors d WHERE d.id = ?");
        self.conn
            .query_row(&sql, [id], doctor_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get a doctor by phone number.
    pub fn get_doctor_by_phone(&self, phone: &str) -> DbResult<Option<Doctor>> {
        let sql = format!("SELECT {DOCTOR_COLUMNS} FROM doctors d WHERE d.phone = ?");
        self.conn
            .query_row(&sql, [phone], doctor_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get a doctor by email address.
    pub fn get_doctor_by_email(&self, email: &str) -> DbResult<Option<Doctor>> {
        let sql = format!("SELECT {DOCTOR_COLUMNS} FROM doctors d WHERE d.email = ?");
        self.conn
            .query_row(&sql, [email], doctor_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List doctors, newest first.
    pub fn list_doctors(&self, filter: &DoctorFilter, page: PageRequest) -> DbResult<Page<Doctor>> {
        let mut query = QueryFilter::new();
        if let Some(search) = &filter.search {
            query.push_search(&["d.name", "d.id", "d.specialization", "d.email"], search);
        }
        if let Some(specialization) = &filter.specialization {
            query.push("d.specialization = ?", specialization.clone());
        }
        if let Some(status) = filter.status {
            query.push("d.status = ?", status.as_str().to_string());
        }
        self.fetch_page(
            DOCTOR_COLUMNS,
            "doctors d",
            &query,
            "d.created_at DESC, d.id DESC",
            page,
            doctor_row,
        )
    }

    /// Doctors with the given status, by name.
    pub fn doctors_with_status(&self, status: DoctorStatus) -> DbResult<Vec<Doctor>> {
        let sql = format!("SELECT {DOCTOR_COLUMNS} FROM doctors d WHERE d.status = ? ORDER BY d.name");
        self.fetch_all(&sql, &[Value::Text(status.as_str().to_string())], doctor_row)
    }

    /// Doctors with the given specialization, by name.
    pub fn doctors_by_specialization(&self, specialization: &str) -> DbResult<Vec<Doctor>> {
        let sql = format!(
            "SELECT {DOCTOR_COLUMNS} FROM doctors d WHERE d.specialization = ? ORDER BY d.name"
        );
        self.fetch_all(&sql, &[Value::Text(specialization.to_string())], doctor_row)
    }

    /// Distinct specializations with their doctor counts, sorted by name.
    pub fn specializations(&self) -> DbResult<Vec<SpecializationCount>> {
        Ok(self
            .group_counts(
                "SELECT specialization, COUNT(*) FROM doctors GROUP BY specialization ORDER BY specialization",
            )?
            .into_iter()
            .map(|(specialization, count)| SpecializationCount {
                specialization,
                count,
            })
            .collect())
    }

    /// Set a doctor's status without touching other fields.
    pub fn set_doctor_status(&self, id: &str, status: DoctorStatus, updated_at: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE doctors SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), updated_at],
        )?;
        Ok(rows_affected > 0)
    }

    /// Delete a doctor. Dependent appointments cascade.
    pub fn delete_doctor(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM doctors WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Number of appointments referencing a doctor.
    pub fn count_doctor_appointments(&self, id: &str) -> DbResult<u64> {
        self.count_where("appointments", "doctor_id", id)
    }

    /// Appointment counts and linked revenue for one doctor.
    pub fn doctor_performance(&self, id: &str) -> DbResult<DoctorPerformance> {
        let (total, completed): (i64, i64) = self.conn.query_row(
            r#"
            SELECT COUNT(*), COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0)
            FROM appointments WHERE doctor_id = ?
            "#,
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT b.total_amount FROM bills b
            JOIN appointments a ON a.id = b.appointment_id
            WHERE a.doctor_id = ?
            "#,
        )?;
        let totals = stmt.query_map([id], |row| row.get::<_, String>(0))?;
        let mut total_revenue = Decimal::ZERO;
        for total in totals {
            total_revenue += parse_money("total_amount", &total?)?;
        }

        let completion_rate = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Ok(DoctorPerformance {
            doctor_id: id.to_string(),
            total_appointments: total as u64,
            completed_appointments: completed as u64,
            completion_rate,
            total_revenue: round_money(total_revenue),
        })
    }

    /// Doctor statistics.
    pub fn doctor_statistics(&self) -> DbResult<DoctorStatistics> {
        let mut status_distribution = zeroed(&DoctorStatus::ALL);
        for (value, count) in
            self.group_counts("SELECT status, COUNT(*) FROM doctors GROUP BY status")?
        {
            status_distribution.insert(value.parse::<DoctorStatus>()?, count);
        }
        let total_doctors: u64 = status_distribution.values().sum();
        let active_doctors = status_distribution[&DoctorStatus::Active];

        let mut stmt = self.conn.prepare("SELECT consultation_fee FROM doctors")?;
        let fees = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut fee_sum = Decimal::ZERO;
        for fee in &fees {
            fee_sum += parse_money("consultation_fee", fee)?;
        }
        let average_consultation_fee = if fees.is_empty() {
            round_money(Decimal::ZERO)
        } else {
            round_money(fee_sum / Decimal::from(fees.len()))
        };

        let top_specializations = self
            .group_counts(&format!(
                r#"
                SELECT specialization, COUNT(*) AS n FROM doctors
                GROUP BY specialization ORDER BY n DESC, specialization ASC
                LIMIT {TOP_SPECIALIZATIONS}
                "#
            ))?
            .into_iter()
            .map(|(specialization, count)| SpecializationCount {
                specialization,
                count,
            })
            .collect();

        Ok(DoctorStatistics {
            total_doctors,
            active_doctors,
            status_distribution,
            average_consultation_fee,
            top_specializations,
        })
    }
}

/// Intermediate row struct for database mapping.
pub(crate) struct DoctorRow {
    id: String,
    name: String,
    specialization: String,
    phone: String,
    email: String,
    experience: u32,
    qualification: String,
    consultation_fee: String,
    status: String,
    address: Option<String>,
    created_at: String,
    updated_at: String,
}

fn doctor_row(row: &Row<'_>) -> rusqlite::Result<DoctorRow> {
    Ok(DoctorRow {
        id: row.get(0)?,
        name: row.get(1)?,
        specialization: row.get(2)?,
        phone: row.get(3)?,
        email: row.get(4)?,
        experience: row.get(5)?,
        qualification: row.get(6)?,
        consultation_fee: row.get(7)?,
        status: row.get(8)?,
        address: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

impl TryFrom<DoctorRow> for Doctor {
    type Error = DbError;

    fn try_from(row: DoctorRow) -> Result<Self, Self::Error> {
        Ok(Doctor {
            id: row.id,
            name: row.name,
            specialization: row.specialization,
            phone: row.phone,
            email: row.email,
            experience: row.experience,
            qualification: row.qualification,
            consultation_fee: parse_money("consultation_fee", &row.consultation_fee)?,
            status: row.status.parse()?,
            address: row.address,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
