//! Appointment database operations.

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult, QueryFilter};
use crate::models::{
    parse_date, parse_time, zeroed, Appointment, AppointmentFilter, AppointmentStatistics,
    AppointmentStatus, DateCount, Page, PageRequest, Slot, DATE_FORMAT, TIME_FORMAT,
};

const APPOINTMENT_COLUMNS: &str = "a.id, a.patient_id, a.doctor_id, a.date, a.time, a.reason, \
     a.status, a.notes, a.created_at, a.updated_at";

const ACTIVE_STATUS_SQL: &str = "a.status IN ('pending', 'confirmed')";

impl Database {
    /// Insert a new appointment.
    pub fn insert_appointment(&self, appointment: &Appointment) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO appointments (
                id, patient_id, doctor_id, date, time, reason, status, notes,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                appointment.id,
                appointment.patient_id,
                appointment.doctor_id,
                appointment.date.format(DATE_FORMAT).to_string(),
                appointment.time.format(TIME_FORMAT).to_string(),
                appointment.reason,
                appointment.status.as_str(),
                appointment.notes,
                appointment.created_at,
                appointment.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing appointment. `patient_id` is never rewritten.
    pub fn update_appointment(&self, appointment: &Appointment) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE appointments SET
                doctor_id = ?2,
                date = ?3,
                time = ?4,
                reason = ?5,
                status = ?6,
                notes = ?7,
                updated_at = ?8
            WHERE id = ?1
            "#,
            params![
                appointment.id,
                appointment.doctor_id,
                appointment.date.format(DATE_FORMAT).to_string(),
                appointment.time.format(TIME_FORMAT).to_string(),
                appointment.reason,
                appointment.status.as_str(),
                appointment.notes,
                appointment.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get an appointment by ID.
    pub fn get_appointment(&self, id: &str) -> DbResult<Option<Appointment>> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments a WHERE a.id = ?");
        self.conn
            .query_row(&sql, [id], appointment_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// The active appointment holding `slot`, if any, ignoring `exclude`.
    pub fn find_active_in_slot(&self, slot: &Slot, exclude: Option<&str>) -> DbResult<Option<String>> {
        let sql = format!(
            r#"
            SELECT a.id FROM appointments a
            WHERE a.doctor_id = ?1 AND a.date = ?2 AND a.time = ?3 AND {ACTIVE_STATUS_SQL}
              AND (?4 IS NULL OR a.id != ?4)
            LIMIT 1
            "#
        );
        let id = self
            .conn
            .query_row(
                &sql,
                params![slot.doctor_id, slot.date_key(), slot.time_key(), exclude],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// List appointments, most recent first.
    pub fn list_appointments(
        &self,
        filter: &AppointmentFilter,
        page: PageRequest,
    ) -> DbResult<Page<Appointment>> {
        let mut query = QueryFilter::new();
        if let Some(search) = &filter.search {
            query.push_search(&["a.id", "p.name", "d.name"], search);
        }
        if let Some(status) = filter.status {
            query.push("a.status = ?", status.as_str().to_string());
        }
        if let Some(date) = filter.date {
            query.push("a.date = ?", date.format(DATE_FORMAT).to_string());
        }
        if let Some(doctor_id) = &filter.doctor_id {
            query.push("a.doctor_id = ?", doctor_id.clone());
        }
        if let Some(patient_id) = &filter.patient_id {
            query.push("a.patient_id = ?", patient_id.clone());
        }
        self.fetch_page(
            APPOINTMENT_COLUMNS,
            "appointments a JOIN patients p ON p.id = a.patient_id JOIN doctors d ON d.id = a.doctor_id",
            &query,
            "a.date DESC, a.time DESC, a.id DESC",
            page,
            appointment_row,
        )
    }

    /// All appointments on `date`, by time.
    pub fn appointments_on_date(&self, date: NaiveDate) -> DbResult<Vec<Appointment>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments a WHERE a.date = ? ORDER BY a.time, a.id"
        );
        self.fetch_all(
            &sql,
            &[Value::Text(date.format(DATE_FORMAT).to_string())],
            appointment_row,
        )
    }

    /// Active appointments dated `from` or later, soonest first.
    pub fn upcoming_appointments(
        &self,
        from: NaiveDate,
        doctor_id: Option<&str>,
        patient_id: Option<&str>,
    ) -> DbResult<Vec<Appointment>> {
        let mut sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments a WHERE a.date >= ? AND {ACTIVE_STATUS_SQL}"
        );
        let mut values = vec![Value::Text(from.format(DATE_FORMAT).to_string())];
        if let Some(doctor_id) = doctor_id {
            sql.push_str(" AND a.doctor_id = ?");
            values.push(Value::Text(doctor_id.to_string()));
        }
        if let Some(patient_id) = patient_id {
            sql.push_str(" AND a.patient_id = ?");
            values.push(Value::Text(patient_id.to_string()));
        }
        sql.push_str(" ORDER BY a.date, a.time, a.id");
        self.fetch_all(&sql, &values, appointment_row)
    }

    /// Set an appointment's status without touching other fields.
    pub fn set_appointment_status(
        &self,
        id: &str,
        status: AppointmentStatus,
        updated_at: &str,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE appointments SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), updated_at],
        )?;
        Ok(rows_affected > 0)
    }

    /// Delete an appointment. Linked bills cascade.
    pub fn delete_appointment(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM appointments WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Number of bills referencing an appointment.
    pub fn count_appointment_bills(&self, id: &str) -> DbResult<u64> {
        self.count_where("bills", "appointment_id", id)
    }

    /// Appointment statistics.
    ///
    /// `start`/`end` bound every figure (inclusive). Per-date counts also
    /// start no earlier than `recent_since`.
    pub fn appointment_statistics(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        recent_since: NaiveDate,
    ) -> DbResult<AppointmentStatistics> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(start) = start {
            clauses.push("date >= ?");
            values.push(Value::Text(start.format(DATE_FORMAT).to_string()));
        }
        if let Some(end) = end {
            clauses.push("date <= ?");
            values.push(Value::Text(end.format(DATE_FORMAT).to_string()));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let mut status_distribution = zeroed(&AppointmentStatus::ALL);
        for (value, count) in self.group_counts_with(
            &format!("SELECT status, COUNT(*) FROM appointments{where_sql} GROUP BY status"),
            &values,
        )? {
            status_distribution.insert(value.parse::<AppointmentStatus>()?, count);
        }
        let total_appointments: u64 = status_distribution.values().sum();

        clauses.push("date >= ?");
        values.push(Value::Text(recent_since.format(DATE_FORMAT).to_string()));
        let by_date_sql = format!(
            "SELECT date, COUNT(*) FROM appointments WHERE {} GROUP BY date ORDER BY date",
            clauses.join(" AND ")
        );
        let appointments_by_date = self
            .group_counts_with(&by_date_sql, &values)?
            .into_iter()
            .map(|(date, count)| -> DbResult<DateCount> {
                Ok(DateCount {
                    date: parse_date(&date)?,
                    count,
                })
            })
            .collect::<DbResult<Vec<_>>>()?;

        Ok(AppointmentStatistics {
            total_appointments,
            status_distribution,
            appointments_by_date,
        })
    }
}

/// Intermediate row struct for database mapping.
pub(crate) struct AppointmentRow {
    id: String,
    patient_id: String,
    doctor_id: String,
    date: String,
    time: String,
    reason: String,
    status: String,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

fn appointment_row(row: &Row<'_>) -> rusqlite::Result<AppointmentRow> {
    Ok(AppointmentRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        date: row.get(3)?,
        time: row.get(4)?,
        reason: row.get(5)?,
        status: row.get(6)?,
        notes: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = DbError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Appointment {
            id: row.id,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            date: parse_date(&row.date)?,
            time: parse_time(&row.time)?,
            reason: row.reason,
            status: row.status.parse()?,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
