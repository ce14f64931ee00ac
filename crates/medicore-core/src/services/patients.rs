//! Patient registration and records.

use chrono::{Duration, NaiveDate};

use super::{
    ensure_no_dependents, require_text, require_text_opt, AuditRecorder, AuditSink,
    ServiceError, ServiceResult,
};
use crate::db::Database;
use crate::models::{
    Appointment, AppointmentFilter, AuditAction, Bill, BillFilter, EntityKind, NewPatient, Page,
    PageRequest, Patient, PatientFilter, PatientPatch, PatientStatistics,
};

/// Window for counting newly registered patients.
const NEW_PATIENT_DAYS: i64 = 30;

/// Patient operations.
pub struct PatientService<'a> {
    db: &'a Database,
    audit: AuditRecorder<'a>,
}

impl<'a> PatientService<'a> {
    /// Service auditing into the same database.
    pub fn new(db: &'a Database) -> Self {
        Self::with_audit(db, db)
    }

    pub fn with_audit(db: &'a Database, sink: &'a dyn AuditSink) -> Self {
        Self {
            db,
            audit: AuditRecorder::new(sink),
        }
    }

    /// Register a patient.
    pub fn create(&self, new: NewPatient) -> ServiceResult<Patient> {
        require_text("name", &new.name)?;
        require_text("phone", &new.phone)?;

        let tx = self.db.immediate_transaction()?;
        self.ensure_phone_free(&new.phone, None)?;
        let id = self.db.next_id(EntityKind::Patient)?;
        let patient = Patient::from_new(id, new);
        self.db.insert_patient(&patient)?;
        tx.commit()?;

        tracing::info!(patient_id = %patient.id, "patient created");
        self.audit
            .record(AuditAction::Create, EntityKind::Patient, &patient.id, None, Some(&patient));
        Ok(patient)
    }

    pub fn get(&self, id: &str) -> ServiceResult<Patient> {
        self.db
            .get_patient(id)?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Patient, id))
    }

    pub fn get_by_phone(&self, phone: &str) -> ServiceResult<Option<Patient>> {
        Ok(self.db.get_patient_by_phone(phone)?)
    }

    /// Apply a partial update. The id and creation time never change.
    pub fn update(&self, id: &str, patch: PatientPatch) -> ServiceResult<Patient> {
        require_text_opt("name", patch.name.as_ref())?;
        require_text_opt("phone", patch.phone.as_ref())?;

        let tx = self.db.immediate_transaction()?;
        let old = self.get(id)?;
        if let Some(phone) = &patch.phone {
            self.ensure_phone_free(phone, Some(id))?;
        }
        let mut patient = old.clone();
        patch.apply_to(&mut patient);
        patient.touch();
        self.db.update_patient(&patient)?;
        tx.commit()?;

        tracing::info!(patient_id = %id, "patient updated");
        self.audit
            .record(AuditAction::Update, EntityKind::Patient, id, Some(&old), Some(&patient));
        Ok(patient)
    }

    /// Delete a patient with no appointments and no bills. Dependents are
    /// counted inside the write transaction.
    pub fn delete(&self, id: &str) -> ServiceResult<()> {
        let tx = self.db.immediate_transaction()?;
        let patient = self.get(id)?;
        let appointments = self.db.count_patient_appointments(id)?;
        let bills = self.db.count_patient_bills(id)?;
        ensure_no_dependents(EntityKind::Patient, id, appointments, bills)?;
        self.db.delete_patient(id)?;
        tx.commit()?;

        tracing::info!(patient_id = %id, "patient deleted");
        self.audit
            .record(AuditAction::Delete, EntityKind::Patient, id, Some(&patient), None);
        Ok(())
    }

    /// Administrative delete: removes the patient with every appointment and bill.
    pub fn purge(&self, id: &str) -> ServiceResult<()> {
        let tx = self.db.immediate_transaction()?;
        let patient = self.get(id)?;
        let appointments = self.db.count_patient_appointments(id)?;
        let bills = self.db.count_patient_bills(id)?;
        self.db.delete_patient(id)?;
        tx.commit()?;

        tracing::warn!(patient_id = %id, appointments, bills, "patient purged");
        self.audit
            .record(AuditAction::Purge, EntityKind::Patient, id, Some(&patient), None);
        Ok(())
    }

    pub fn list(&self, filter: &PatientFilter, page: PageRequest) -> ServiceResult<Page<Patient>> {
        Ok(self.db.list_patients(filter, page)?)
    }

    pub fn appointments_for(&self, id: &str, page: PageRequest) -> ServiceResult<Page<Appointment>> {
        self.get(id)?;
        let filter = AppointmentFilter {
            patient_id: Some(id.to_string()),
            ..Default::default()
        };
        Ok(self.db.list_appointments(&filter, page)?)
    }

    pub fn bills_for(&self, id: &str, page: PageRequest) -> ServiceResult<Page<Bill>> {
        self.get(id)?;
        let filter = BillFilter {
            patient_id: Some(id.to_string()),
            ..Default::default()
        };
        Ok(self.db.list_bills(&filter, page)?)
    }

    /// Totals and distributions. Patients registered in the 30 days before
    /// `today` count as new.
    pub fn statistics(&self, today: NaiveDate) -> ServiceResult<PatientStatistics> {
        let since = today - Duration::days(NEW_PATIENT_DAYS);
        Ok(self.db.patient_statistics(since)?)
    }

    fn ensure_phone_free(&self, phone: &str, owner: Option<&str>) -> ServiceResult<()> {
        if let Some(existing) = self.db.get_patient_by_phone(phone)? {
            if owner != Some(existing.id.as_str()) {
                tracing::warn!(%phone, existing = %existing.id, "duplicate patient phone");
                return Err(ServiceError::Conflict(format!(
                    "phone {phone} is already registered to patient {}",
                    existing.id
                )));
            }
        }
        Ok(())
    }
}
