//! Appointment booking and lifecycle.
//!
//! Every write runs inside an immediate transaction that also covers the
//! reads its checks depend on, so a booking cannot interleave with another
//! connection claiming the same slot or deleting the patient. The partial
//! unique index on active slots backs this up at the storage layer.

use chrono::{Duration, NaiveDate, NaiveTime};

use super::{
    ensure_appointment_transition, ensure_doctor_bookable, ensure_no_dependents, now,
    require_text, require_text_opt, AppointmentAction, AuditRecorder, AuditSink,
    AvailabilityChecker, ServiceError, ServiceResult,
};
use crate::db::{Database, DbError};
use crate::models::{
    Appointment, AppointmentFilter, AppointmentPatch, AppointmentStatistics, AuditAction, Bill,
    EntityKind, NewAppointment, Page, PageRequest, Slot,
};

/// Days covered by the per-date appointment counts.
const RECENT_DAYS: i64 = 30;

/// Appointment operations.
pub struct AppointmentService<'a> {
    db: &'a Database,
    audit: AuditRecorder<'a>,
}

impl<'a> AppointmentService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self::with_audit(db, db)
    }

    pub fn with_audit(db: &'a Database, sink: &'a dyn AuditSink) -> Self {
        Self {
            db,
            audit: AuditRecorder::new(sink),
        }
    }

    /// Book a pending appointment.
    ///
    /// Fails with `NotFound` for an unknown patient or doctor and with
    /// `Conflict` when the doctor is not active or the slot is taken.
    pub fn create(&self, new: NewAppointment) -> ServiceResult<Appointment> {
        require_text("patient_id", &new.patient_id)?;
        require_text("doctor_id", &new.doctor_id)?;
        require_text("reason", &new.reason)?;

        let slot = new.slot();
        let tx = self.db.immediate_transaction()?;
        if self.db.get_patient(&new.patient_id)?.is_none() {
            return Err(ServiceError::not_found(EntityKind::Patient, &new.patient_id));
        }
        let doctor = self
            .db
            .get_doctor(&new.doctor_id)?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Doctor, &new.doctor_id))?;
        ensure_doctor_bookable(&doctor)?;
        AvailabilityChecker::new(self.db).ensure_available(&slot, None)?;
        let id = self.db.next_id(EntityKind::Appointment)?;
        let appointment = Appointment::from_new(id, new);
        self.db
            .insert_appointment(&appointment)
            .map_err(|e| slot_conflict(e, &slot))?;
        tx.commit()?;

        tracing::info!(
            appointment_id = %appointment.id,
            patient_id = %appointment.patient_id,
            %slot,
            "appointment booked"
        );
        self.audit.record(
            AuditAction::Create,
            EntityKind::Appointment,
            &appointment.id,
            None,
            Some(&appointment),
        );
        Ok(appointment)
    }

    pub fn get(&self, id: &str) -> ServiceResult<Appointment> {
        self.db
            .get_appointment(id)?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Appointment, id))
    }

    /// Apply a partial update.
    ///
    /// A reassigned doctor must exist and be active. The slot is re-checked
    /// when an active appointment moves; the appointment never conflicts
    /// with itself.
    pub fn update(&self, id: &str, patch: AppointmentPatch) -> ServiceResult<Appointment> {
        require_text_opt("reason", patch.reason.as_ref())?;
        require_text_opt("doctor_id", patch.doctor_id.as_ref())?;

        let tx = self.db.immediate_transaction()?;
        let old = self.get(id)?;
        if let Some(doctor_id) = patch.doctor_id.as_deref().filter(|d| *d != old.doctor_id) {
            let doctor = self
                .db
                .get_doctor(doctor_id)?
                .ok_or_else(|| ServiceError::not_found(EntityKind::Doctor, doctor_id))?;
            ensure_doctor_bookable(&doctor)?;
        }

        let moves = old.is_active() && patch.changes_slot(&old);
        let slot = patch.target_slot(&old);
        if moves {
            AvailabilityChecker::new(self.db).ensure_available(&slot, Some(id))?;
        }
        let mut appointment = old.clone();
        patch.apply_to(&mut appointment);
        appointment.touch();
        self.db
            .update_appointment(&appointment)
            .map_err(|e| slot_conflict(e, &slot))?;
        tx.commit()?;

        tracing::info!(appointment_id = %id, rescheduled = moves, "appointment updated");
        self.audit.record(
            AuditAction::Update,
            EntityKind::Appointment,
            id,
            Some(&old),
            Some(&appointment),
        );
        Ok(appointment)
    }

    pub fn confirm(&self, id: &str) -> ServiceResult<Appointment> {
        self.transition(id, AppointmentAction::Confirm)
    }

    pub fn cancel(&self, id: &str) -> ServiceResult<Appointment> {
        self.transition(id, AppointmentAction::Cancel)
    }

    pub fn complete(&self, id: &str) -> ServiceResult<Appointment> {
        self.transition(id, AppointmentAction::Complete)
    }

    /// Run a lifecycle action, refusing transitions the guard rejects.
    pub fn transition(&self, id: &str, action: AppointmentAction) -> ServiceResult<Appointment> {
        let tx = self.db.immediate_transaction()?;
        let old = self.get(id)?;
        let status = ensure_appointment_transition(id, old.status, action)?;
        let updated_at = now();
        self.db.set_appointment_status(id, status, &updated_at)?;
        tx.commit()?;

        let appointment = Appointment {
            status,
            updated_at,
            ..old.clone()
        };
        tracing::info!(appointment_id = %id, %action, from = %old.status, to = %status, "appointment transitioned");
        self.audit.record(
            action.audit_action(),
            EntityKind::Appointment,
            id,
            Some(&old),
            Some(&appointment),
        );
        Ok(appointment)
    }

    /// Delete an appointment no bill refers to.
    pub fn delete(&self, id: &str) -> ServiceResult<()> {
        let tx = self.db.immediate_transaction()?;
        let appointment = self.get(id)?;
        let bills = self.db.count_appointment_bills(id)?;
        ensure_no_dependents(EntityKind::Appointment, id, 0, bills)?;
        self.db.delete_appointment(id)?;
        tx.commit()?;

        tracing::info!(appointment_id = %id, "appointment deleted");
        self.audit.record(
            AuditAction::Delete,
            EntityKind::Appointment,
            id,
            Some(&appointment),
            None,
        );
        Ok(())
    }

    /// Whether the doctor's slot is free. Fails with `NotFound` for an unknown doctor.
    pub fn check_availability(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> ServiceResult<bool> {
        if self.db.get_doctor(doctor_id)?.is_none() {
            return Err(ServiceError::not_found(EntityKind::Doctor, doctor_id));
        }
        AvailabilityChecker::new(self.db).is_available(&Slot::new(doctor_id, date, time))
    }

    pub fn list(
        &self,
        filter: &AppointmentFilter,
        page: PageRequest,
    ) -> ServiceResult<Page<Appointment>> {
        Ok(self.db.list_appointments(filter, page)?)
    }

    /// Every appointment on `date`, by time.
    pub fn on_date(&self, date: NaiveDate) -> ServiceResult<Vec<Appointment>> {
        Ok(self.db.appointments_on_date(date)?)
    }

    pub fn upcoming(
        &self,
        doctor_id: Option<&str>,
        patient_id: Option<&str>,
        today: NaiveDate,
    ) -> ServiceResult<Vec<Appointment>> {
        Ok(self.db.upcoming_appointments(today, doctor_id, patient_id)?)
    }

    /// The bill raised for an appointment, if any.
    pub fn bill_for(&self, id: &str) -> ServiceResult<Option<Bill>> {
        self.get(id)?;
        Ok(self.db.bills_for_appointment(id)?.into_iter().next())
    }

    pub fn statistics(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> ServiceResult<AppointmentStatistics> {
        let recent_since = today - Duration::days(RECENT_DAYS);
        Ok(self.db.appointment_statistics(start, end, recent_since)?)
    }
}

/// A unique-index violation while writing an appointment means another
/// active appointment claimed the slot first.
fn slot_conflict(e: DbError, slot: &Slot) -> ServiceError {
    match e {
        DbError::Constraint(detail) => {
            tracing::warn!(%slot, %detail, "slot claimed concurrently");
            ServiceError::Conflict(format!(
                "doctor {} is already booked on {} at {}",
                slot.doctor_id,
                slot.date_key(),
                slot.time_key()
            ))
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        parse_date, parse_time, AppointmentStatus, Doctor, DoctorStatus, Gender, NewDoctor,
        NewPatient, Patient,
    };

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.insert_patient(&Patient::from_new(
            "P0001".into(),
            NewPatient::new("A", 30, Gender::Male, "111"),
        ))
        .unwrap();
        for (id, email, phone) in [("D0001", "b@example.com", "222"), ("D0002", "c@example.com", "333")] {
            db.insert_doctor(&Doctor::from_new(
                id.into(),
                NewDoctor {
                    name: "Dr. B".into(),
                    specialization: "General".into(),
                    phone: phone.into(),
                    email: email.into(),
                    experience: 1,
                    qualification: "MBBS".into(),
                    consultation_fee: "100".parse().unwrap(),
                    status: None,
                    address: None,
                },
            ))
            .unwrap();
        }
        db
    }

    fn booking(time: &str) -> NewAppointment {
        NewAppointment {
            patient_id: "P0001".into(),
            doctor_id: "D0001".into(),
            date: parse_date("2024-01-10").unwrap(),
            time: parse_time(time).unwrap(),
            reason: "checkup".into(),
            notes: None,
        }
    }

    #[test]
    fn test_create_pending() {
        let db = setup_db();
        let service = AppointmentService::new(&db);

        let appointment = service.create(booking("09:00")).unwrap();
        assert_eq!(appointment.id, "A0001");
        assert_eq!(appointment.status, AppointmentStatus::Pending);
        assert_eq!(service.get("A0001").unwrap(), appointment);
    }

    #[test]
    fn test_create_requires_existing_parties() {
        let db = setup_db();
        let service = AppointmentService::new(&db);

        let mut unknown_patient = booking("09:00");
        unknown_patient.patient_id = "P0404".into();
        assert!(matches!(
            service.create(unknown_patient),
            Err(ServiceError::NotFound { entity: EntityKind::Patient, .. })
        ));

        let mut unknown_doctor = booking("09:00");
        unknown_doctor.doctor_id = "D0404".into();
        assert!(matches!(
            service.create(unknown_doctor),
            Err(ServiceError::NotFound { entity: EntityKind::Doctor, .. })
        ));

        let mut no_reason = booking("09:00");
        no_reason.reason = " ".into();
        assert!(matches!(service.create(no_reason), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_double_booking_conflicts() {
        let db = setup_db();
        let service = AppointmentService::new(&db);
        service.create(booking("09:00")).unwrap();

        assert!(matches!(service.create(booking("09:00")), Err(ServiceError::Conflict(_))));
        assert!(service.create(booking("09:01")).is_ok());
    }

    #[test]
    fn test_cancelled_slot_can_be_rebooked() {
        let db = setup_db();
        let service = AppointmentService::new(&db);
        service.create(booking("09:00")).unwrap();
        service.cancel("A0001").unwrap();

        let rebooked = service.create(booking("09:00")).unwrap();
        assert_eq!(rebooked.id, "A0002");
    }

    #[test]
    fn test_inactive_doctor_rejected() {
        let db = setup_db();
        db.set_doctor_status("D0001", DoctorStatus::Inactive, &now()).unwrap();
        let service = AppointmentService::new(&db);
        assert!(matches!(service.create(booking("09:00")), Err(ServiceError::Conflict(_))));
    }

    #[test]
    fn test_lifecycle_actions() {
        let db = setup_db();
        let service = AppointmentService::new(&db);
        service.create(booking("09:00")).unwrap();

        assert_eq!(service.confirm("A0001").unwrap().status, AppointmentStatus::Confirmed);
        assert!(matches!(service.confirm("A0001"), Err(ServiceError::Conflict(_))));
        assert_eq!(service.complete("A0001").unwrap().status, AppointmentStatus::Completed);
        assert!(matches!(service.cancel("A0001"), Err(ServiceError::Conflict(_))));
        assert_eq!(service.get("A0001").unwrap().status, AppointmentStatus::Completed);

        let history = db.audit_entries_for(EntityKind::Appointment, "A0001").unwrap();
        let actions: Vec<_> = history.iter().map(|e| e.entry.action).collect();
        assert_eq!(
            actions,
            vec![AuditAction::Create, AuditAction::Confirm, AuditAction::Complete]
        );
    }

    #[test]
    fn test_update_rechecks_slot_but_not_self() {
        let db = setup_db();
        let service = AppointmentService::new(&db);
        service.create(booking("09:00")).unwrap();
        service.create(booking("10:00")).unwrap();

        let same_slot = service.update(
            "A0001",
            AppointmentPatch {
                time: Some(parse_time("09:00").unwrap()),
                reason: Some("follow-up".into()),
                ..Default::default()
            },
        );
        assert_eq!(same_slot.unwrap().reason, "follow-up");

        let taken = service.update(
            "A0001",
            AppointmentPatch {
                time: Some(parse_time("10:00").unwrap()),
                ..Default::default()
            },
        );
        assert!(matches!(taken, Err(ServiceError::Conflict(_))));

        let reassigned = service
            .update(
                "A0001",
                AppointmentPatch {
                    doctor_id: Some("D0002".into()),
                    time: Some(parse_time("10:00").unwrap()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(reassigned.doctor_id, "D0002");
        assert_eq!(reassigned.patient_id, "P0001");
    }

    #[test]
    fn test_check_availability() {
        let db = setup_db();
        let service = AppointmentService::new(&db);
        let date = parse_date("2024-01-10").unwrap();
        let nine = parse_time("09:00").unwrap();

        assert!(service.check_availability("D0001", date, nine).unwrap());
        service.create(booking("09:00")).unwrap();
        assert!(!service.check_availability("D0001", date, nine).unwrap());
        assert!(matches!(
            service.check_availability("D0404", date, nine),
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_on_date_and_upcoming() {
        let db = setup_db();
        let service = AppointmentService::new(&db);
        service.create(booking("11:00")).unwrap();
        service.create(booking("09:00")).unwrap();
        service.cancel("A0001").unwrap();

        let day: Vec<_> = service
            .on_date(parse_date("2024-01-10").unwrap())
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(day, vec!["A0002", "A0001"]);

        let upcoming = service
            .upcoming(None, Some("P0001"), parse_date("2024-01-01").unwrap())
            .unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, "A0002");
    }

    #[test]
    fn test_delete_without_bills() {
        let db = setup_db();
        let service = AppointmentService::new(&db);
        service.create(booking("09:00")).unwrap();

        assert_eq!(service.bill_for("A0001").unwrap(), None);
        service.delete("A0001").unwrap();
        assert!(matches!(service.get("A0001"), Err(ServiceError::NotFound { .. })));
    }
}
