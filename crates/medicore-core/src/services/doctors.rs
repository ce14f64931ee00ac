//! Doctor records, availability status and performance.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::{
    ensure_no_dependents, now, require_text, require_text_opt, AuditRecorder, AuditSink,
    ServiceError, ServiceResult,
};
use crate::db::Database;
use crate::models::{
    Appointment, AppointmentFilter, AuditAction, Doctor, DoctorFilter, DoctorPatch,
    DoctorPerformance, DoctorStatistics, DoctorStatus, EntityKind, NewDoctor, Page, PageRequest,
    SpecializationCount,
};

/// Doctor operations.
pub struct DoctorService<'a> {
    db: &'a Database,
    audit: AuditRecorder<'a>,
}

impl<'a> DoctorService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self::with_audit(db, db)
    }

    pub fn with_audit(db: &'a Database, sink: &'a dyn AuditSink) -> Self {
        Self {
            db,
            audit: AuditRecorder::new(sink),
        }
    }

    /// Add a doctor. Status defaults to `Active`.
    pub fn create(&self, new: NewDoctor) -> ServiceResult<Doctor> {
        require_text("name", &new.name)?;
        require_text("specialization", &new.specialization)?;
        require_text("phone", &new.phone)?;
        require_text("email", &new.email)?;
        require_text("qualification", &new.qualification)?;
        ensure_fee(new.consultation_fee)?;

        let tx = self.db.immediate_transaction()?;
        self.ensure_email_free(&new.email, None)?;
        self.ensure_phone_free(&new.phone, None)?;
        let id = self.db.next_id(EntityKind::Doctor)?;
        let doctor = Doctor::from_new(id, new);
        self.db.insert_doctor(&doctor)?;
        tx.commit()?;

        tracing::info!(doctor_id = %doctor.id, specialization = %doctor.specialization, "doctor created");
        self.audit
            .record(AuditAction::Create, EntityKind::Doctor, &doctor.id, None, Some(&doctor));
        Ok(doctor)
    }

    pub fn get(&self, id: &str) -> ServiceResult<Doctor> {
        self.db
            .get_doctor(id)?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Doctor, id))
    }

    pub fn get_by_email(&self, email: &str) -> ServiceResult<Option<Doctor>> {
        Ok(self.db.get_doctor_by_email(email)?)
    }

    pub fn update(&self, id: &str, patch: DoctorPatch) -> ServiceResult<Doctor> {
        for (field, value) in [
            ("name", patch.name.as_ref()),
            ("specialization", patch.specialization.as_ref()),
            ("phone", patch.phone.as_ref()),
            ("email", patch.email.as_ref()),
            ("qualification", patch.qualification.as_ref()),
        ] {
            require_text_opt(field, value)?;
        }
        if let Some(fee) = patch.consultation_fee {
            ensure_fee(fee)?;
        }

        let tx = self.db.immediate_transaction()?;
        let old = self.get(id)?;
        if let Some(email) = &patch.email {
            self.ensure_email_free(email, Some(id))?;
        }
        if let Some(phone) = &patch.phone {
            self.ensure_phone_free(phone, Some(id))?;
        }
        let mut doctor = old.clone();
        patch.apply_to(&mut doctor);
        doctor.touch();
        self.db.update_doctor(&doctor)?;
        tx.commit()?;

        tracing::info!(doctor_id = %id, "doctor updated");
        self.audit
            .record(AuditAction::Update, EntityKind::Doctor, id, Some(&old), Some(&doctor));
        Ok(doctor)
    }

    /// Change a doctor's status. Existing appointments are left as they are.
    pub fn set_status(&self, id: &str, status: DoctorStatus) -> ServiceResult<Doctor> {
        let tx = self.db.immediate_transaction()?;
        let old = self.get(id)?;
        let updated_at = now();
        self.db.set_doctor_status(id, status, &updated_at)?;
        tx.commit()?;

        let doctor = Doctor {
            status,
            updated_at,
            ..old.clone()
        };
        tracing::info!(doctor_id = %id, from = %old.status, to = %status, "doctor status changed");
        self.audit
            .record(AuditAction::StatusChange, EntityKind::Doctor, id, Some(&old), Some(&doctor));
        Ok(doctor)
    }

    /// Delete a doctor with no appointments.
    pub fn delete(&self, id: &str) -> ServiceResult<()> {
        let tx = self.db.immediate_transaction()?;
        let doctor = self.get(id)?;
        let appointments = self.db.count_doctor_appointments(id)?;
        ensure_no_dependents(EntityKind::Doctor, id, appointments, 0)?;
        self.db.delete_doctor(id)?;
        tx.commit()?;

        tracing::info!(doctor_id = %id, "doctor deleted");
        self.audit
            .record(AuditAction::Delete, EntityKind::Doctor, id, Some(&doctor), None);
        Ok(())
    }

    /// Administrative delete: removes the doctor with every appointment and
    /// the bills linked to them.
    pub fn purge(&self, id: &str) -> ServiceResult<()> {
        let tx = self.db.immediate_transaction()?;
        let doctor = self.get(id)?;
        let appointments = self.db.count_doctor_appointments(id)?;
        self.db.delete_doctor(id)?;
        tx.commit()?;

        tracing::warn!(doctor_id = %id, appointments, "doctor purged");
        self.audit
            .record(AuditAction::Purge, EntityKind::Doctor, id, Some(&doctor), None);
        Ok(())
    }

    pub fn list(&self, filter: &DoctorFilter, page: PageRequest) -> ServiceResult<Page<Doctor>> {
        Ok(self.db.list_doctors(filter, page)?)
    }

    pub fn active_doctors(&self) -> ServiceResult<Vec<Doctor>> {
        Ok(self.db.doctors_with_status(DoctorStatus::Active)?)
    }

    pub fn by_specialization(&self, specialization: &str) -> ServiceResult<Vec<Doctor>> {
        Ok(self.db.doctors_by_specialization(specialization)?)
    }

    pub fn specializations(&self) -> ServiceResult<Vec<SpecializationCount>> {
        Ok(self.db.specializations()?)
    }

    pub fn appointments_for(&self, id: &str, page: PageRequest) -> ServiceResult<Page<Appointment>> {
        self.get(id)?;
        let filter = AppointmentFilter {
            doctor_id: Some(id.to_string()),
            ..Default::default()
        };
        Ok(self.db.list_appointments(&filter, page)?)
    }

    /// Active appointments from `today` on, soonest first.
    pub fn upcoming_for(&self, id: &str, today: NaiveDate) -> ServiceResult<Vec<Appointment>> {
        self.get(id)?;
        Ok(self.db.upcoming_appointments(today, Some(id), None)?)
    }

    pub fn performance(&self, id: &str) -> ServiceResult<DoctorPerformance> {
        self.get(id)?;
        Ok(self.db.doctor_performance(id)?)
    }

    pub fn statistics(&self) -> ServiceResult<DoctorStatistics> {
        Ok(self.db.doctor_statistics()?)
    }

    fn ensure_email_free(&self, email: &str, owner: Option<&str>) -> ServiceResult<()> {
        if let Some(existing) = self.db.get_doctor_by_email(email)? {
            if owner != Some(existing.id.as_str()) {
                tracing::warn!(%email, existing = %existing.id, "duplicate doctor email");
                return Err(ServiceError::Conflict(format!(
                    "email {email} is already registered to doctor {}",
                    existing.id
                )));
            }
        }
        Ok(())
    }

    fn ensure_phone_free(&self, phone: &str, owner: Option<&str>) -> ServiceResult<()> {
        if let Some(existing) = self.db.get_doctor_by_phone(phone)? {
            if owner != Some(existing.id.as_str()) {
                tracing::warn!(%phone, existing = %existing.id, "duplicate doctor phone");
                return Err(ServiceError::Conflict(format!(
                    "phone {phone} is already registered to doctor {}",
                    existing.id
                )));
            }
        }
        Ok(())
    }
}

fn ensure_fee(fee: Decimal) -> ServiceResult<()> {
    if fee < Decimal::ZERO {
        return Err(ServiceError::Validation(format!(
            "consultation fee must not be negative, got {fee}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        parse_date, parse_time, AppointmentStatus, Gender, NewAppointment, NewPatient, Patient,
    };

    fn new_doctor(email: &str, phone: &str) -> NewDoctor {
        NewDoctor {
            name: "Dr. Rao".into(),
            specialization: "Cardiology".into(),
            phone: phone.into(),
            email: email.into(),
            experience: 12,
            qualification: "MD".into(),
            consultation_fee: "500".parse().unwrap(),
            status: None,
            address: None,
        }
    }

    fn book(db: &Database, id: &str, date: &str, status: AppointmentStatus) {
        if db.get_patient("P0001").unwrap().is_none() {
            db.insert_patient(&Patient::from_new(
                "P0001".into(),
                NewPatient::new("A", 30, Gender::Male, "111"),
            ))
            .unwrap();
        }
        let mut appointment = Appointment::from_new(
            id.into(),
            NewAppointment {
                patient_id: "P0001".into(),
                doctor_id: "D0001".into(),
                date: parse_date(date).unwrap(),
                time: parse_time("09:00").unwrap(),
                reason: "checkup".into(),
                notes: None,
            },
        );
        appointment.status = status;
        db.insert_appointment(&appointment).unwrap();
    }

    #[test]
    fn test_create_and_read_back() {
        let db = Database::open_in_memory().unwrap();
        let service = DoctorService::new(&db);

        let doctor = service.create(new_doctor("rao@example.com", "222")).unwrap();
        assert_eq!(doctor.id, "D0001");
        assert_eq!(doctor.status, DoctorStatus::Active);
        assert_eq!(service.get("D0001").unwrap(), doctor);
        assert_eq!(
            service.get_by_email("rao@example.com").unwrap().map(|d| d.id),
            Some("D0001".to_string())
        );
    }

    #[test]
    fn test_create_validation() {
        let db = Database::open_in_memory().unwrap();
        let service = DoctorService::new(&db);

        let mut negative = new_doctor("a@example.com", "1");
        negative.consultation_fee = "-1".parse().unwrap();
        assert!(matches!(service.create(negative), Err(ServiceError::Validation(_))));

        let mut blank = new_doctor("a@example.com", "1");
        blank.qualification = "".into();
        assert!(matches!(service.create(blank), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_duplicate_email_and_phone_conflict() {
        let db = Database::open_in_memory().unwrap();
        let service = DoctorService::new(&db);
        service.create(new_doctor("rao@example.com", "222")).unwrap();

        assert!(matches!(
            service.create(new_doctor("rao@example.com", "333")),
            Err(ServiceError::Conflict(msg)) if msg.contains("D0001")
        ));
        assert!(matches!(
            service.create(new_doctor("other@example.com", "222")),
            Err(ServiceError::Conflict(msg)) if msg.contains("phone 222") && msg.contains("D0001")
        ));
    }

    #[test]
    fn test_update_phone_uniqueness() {
        let db = Database::open_in_memory().unwrap();
        let service = DoctorService::new(&db);
        service.create(new_doctor("rao@example.com", "222")).unwrap();
        service.create(new_doctor("lee@example.com", "333")).unwrap();

        let taken = service.update(
            "D0002",
            DoctorPatch {
                phone: Some("222".into()),
                ..Default::default()
            },
        );
        assert!(matches!(taken, Err(ServiceError::Conflict(msg)) if msg.contains("phone 222")));

        let own = service
            .update(
                "D0001",
                DoctorPatch {
                    phone: Some("222".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(own.phone, "222");
    }

    #[test]
    fn test_update_email_uniqueness() {
        let db = Database::open_in_memory().unwrap();
        let service = DoctorService::new(&db);
        service.create(new_doctor("rao@example.com", "222")).unwrap();
        service.create(new_doctor("lee@example.com", "333")).unwrap();

        let taken = service.update(
            "D0002",
            DoctorPatch {
                email: Some("rao@example.com".into()),
                ..Default::default()
            },
        );
        assert!(matches!(taken, Err(ServiceError::Conflict(_))));

        let kept = service
            .update(
                "D0002",
                DoctorPatch {
                    email: Some("lee@example.com".into()),
                    experience: Some(4),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(kept.experience, 4);
    }

    #[test]
    fn test_set_status_is_audited() {
        let db = Database::open_in_memory().unwrap();
        let service = DoctorService::new(&db);
        service.create(new_doctor("rao@example.com", "222")).unwrap();

        let doctor = service.set_status("D0001", DoctorStatus::OnLeave).unwrap();
        assert_eq!(doctor.status, DoctorStatus::OnLeave);
        assert_eq!(service.get("D0001").unwrap().status, DoctorStatus::OnLeave);
        assert!(service.active_doctors().unwrap().is_empty());

        let history = db.audit_entries_for(EntityKind::Doctor, "D0001").unwrap();
        assert_eq!(history.last().unwrap().entry.action, AuditAction::StatusChange);
    }

    #[test]
    fn test_delete_blocked_by_appointments() {
        let db = Database::open_in_memory().unwrap();
        let service = DoctorService::new(&db);
        service.create(new_doctor("rao@example.com", "222")).unwrap();
        book(&db, "A0001", "2024-01-10", AppointmentStatus::Cancelled);

        assert!(matches!(
            service.delete("D0001"),
            Err(ServiceError::DependencyBlocked { appointments: 1, bills: 0, .. })
        ));

        service.purge("D0001").unwrap();
        assert!(db.get_appointment("A0001").unwrap().is_none());
        assert!(matches!(service.get("D0001"), Err(ServiceError::NotFound { .. })));
    }

    #[test]
    fn test_upcoming_and_performance() {
        let db = Database::open_in_memory().unwrap();
        let service = DoctorService::new(&db);
        service.create(new_doctor("rao@example.com", "222")).unwrap();
        book(&db, "A0001", "2024-01-09", AppointmentStatus::Completed);
        book(&db, "A0002", "2024-01-12", AppointmentStatus::Pending);
        book(&db, "A0003", "2024-01-11", AppointmentStatus::Confirmed);

        let upcoming = service
            .upcoming_for("D0001", parse_date("2024-01-10").unwrap())
            .unwrap();
        let ids: Vec<_> = upcoming.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["A0003", "A0002"]);

        let performance = service.performance("D0001").unwrap();
        assert_eq!(performance.total_appointments, 3);
        assert_eq!(performance.completed_appointments, 1);
        assert!(matches!(
            service.performance("D0404"),
            Err(ServiceError::NotFound { .. })
        ));
    }
}
