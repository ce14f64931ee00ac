//! Slot availability.
//!
//! A slot is taken when an active (pending or confirmed) appointment holds
//! exactly the same doctor, date and time. There is no duration model: two
//! appointments one minute apart never conflict.

use super::{ServiceError, ServiceResult};
use crate::db::Database;
use crate::models::Slot;

/// Checks slots against stored appointments.
pub struct AvailabilityChecker<'a> {
    db: &'a Database,
}

impl<'a> AvailabilityChecker<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Whether no active appointment occupies `slot`.
    pub fn is_available(&self, slot: &Slot) -> ServiceResult<bool> {
        Ok(self.conflicting_appointment(slot, None)?.is_none())
    }

    /// The active appointment occupying `slot`, ignoring `exclude`.
    pub fn conflicting_appointment(
        &self,
        slot: &Slot,
        exclude: Option<&str>,
    ) -> ServiceResult<Option<String>> {
        let holder = self.db.find_active_in_slot(slot, exclude)?;
        tracing::debug!(%slot, holder = holder.as_deref(), "availability check");
        Ok(holder)
    }

    /// Fail with `Conflict` when `slot` is taken by an appointment other than `exclude`.
    pub fn ensure_available(&self, slot: &Slot, exclude: Option<&str>) -> ServiceResult<()> {
        match self.conflicting_appointment(slot, exclude)? {
            Some(holder) => {
                tracing::warn!(%slot, %holder, "slot unavailable");
                Err(ServiceError::Conflict(format!(
                    "doctor {} is already booked on {} at {} (appointment {})",
                    slot.doctor_id,
                    slot.date_key(),
                    slot.time_key(),
                    holder
                )))
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        parse_date, parse_time, Appointment, AppointmentStatus, Doctor, Gender, NewAppointment,
        NewDoctor, NewPatient, Patient,
    };

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.insert_patient(&Patient::from_new(
            "P0001".into(),
            NewPatient::new("A", 30, Gender::Male, "111"),
        ))
        .unwrap();
        db.insert_doctor(&Doctor::from_new(
            "D0001".into(),
            NewDoctor {
                name: "Dr. B".into(),
                specialization: "General".into(),
                phone: "222".into(),
                email: "b@example.com".into(),
                experience: 1,
                qualification: "MBBS".into(),
                consultation_fee: "100".parse().unwrap(),
                status: None,
                address: None,
            },
        ))
        .unwrap();
        db
    }

    fn slot(time: &str) -> Slot {
        Slot::new("D0001", parse_date("2024-01-10").unwrap(), parse_time(time).unwrap())
    }

    fn book(db: &Database, id: &str, status: AppointmentStatus) {
        let mut appointment = Appointment::from_new(
            id.into(),
            NewAppointment {
                patient_id: "P0001".into(),
                doctor_id: "D0001".into(),
                date: parse_date("2024-01-10").unwrap(),
                time: parse_time("09:00").unwrap(),
                reason: "checkup".into(),
                notes: None,
            },
        );
        appointment.status = status;
        db.insert_appointment(&appointment).unwrap();
    }

    #[test]
    fn test_free_slot() {
        let db = setup_db();
        assert!(AvailabilityChecker::new(&db).is_available(&slot("09:00")).unwrap());
    }

    #[test]
    fn test_active_statuses_block() {
        for status in AppointmentStatus::ACTIVE {
            let db = setup_db();
            book(&db, "A0001", status);
            let checker = AvailabilityChecker::new(&db);
            assert!(!checker.is_available(&slot("09:00")).unwrap(), "{status} should block");
            assert!(matches!(
                checker.ensure_available(&slot("09:00"), None),
                Err(ServiceError::Conflict(_))
            ));
            // Exact match only
            assert!(checker.is_available(&slot("09:01")).unwrap());
        }
    }

    #[test]
    fn test_inactive_statuses_never_block() {
        let db = setup_db();
        book(&db, "A0001", AppointmentStatus::Cancelled);
        book(&db, "A0002", AppointmentStatus::Completed);
        assert!(AvailabilityChecker::new(&db).is_available(&slot("09:00")).unwrap());
    }

    #[test]
    fn test_own_slot_is_available_to_self() {
        let db = setup_db();
        book(&db, "A0001", AppointmentStatus::Pending);
        let checker = AvailabilityChecker::new(&db);
        assert!(checker.ensure_available(&slot("09:00"), Some("A0001")).is_ok());
        assert!(checker.ensure_available(&slot("09:00"), Some("A0002")).is_err());
    }
}
