//! Medicore Core Library
//!
//! Hospital back-office records: patients, doctors, appointments and bills
//! on SQLite, with a hash-chained audit trail.
//!
//! # Architecture
//!
//! ```text
//!  caller (CLI / API surface)
//!          │
//!          ▼
//!   HospitalCore ── lock ──► services ──► Lifecycle Guard
//!                                │        Availability Checker
//!                                │        Billing Calculator
//!                                ▼
//!                          db::Database (repositories, ID generator)
//!                                │
//!                                ▼
//!                         Audit Recorder ──► audit_log (append-only, chained)
//! ```
//!
//! Statistics and exports read straight from the repositories.
//!
//! # Modules
//!
//! - [`db`]: SQLite storage, per-entity repositories, identifier generation
//! - [`models`]: Domain types (Patient, Doctor, Appointment, Bill, ...)
//! - [`billing`]: Bill total computation and export
//! - [`services`]: Validation, lifecycle rules and audit around storage
//! - [`config`]: Runtime configuration resolved at startup

pub mod billing;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use billing::{compute_totals, BillExport, BillTotals, BillingError};
pub use config::{ConfigError, CoreConfig};
pub use db::{AuditChainReport, Database, DbError};
pub use models::{
    Appointment, AppointmentStatus, Bill, BillStatus, Doctor, DoctorStatus, EntityKind, Page,
    PageRequest, Patient, PaymentMethod,
};
pub use services::{
    AppointmentAction, AppointmentService, AuditSink, AvailabilityChecker, BillingService,
    DoctorService, ErrorKind, PatientService, ServiceError, ServiceResult,
};

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveTime};

use models::{
    AppointmentFilter, AppointmentPatch, AppointmentStatistics, AuditEntry, BillFilter, BillItem,
    BillPatch, BillingStatistics, DoctorFilter, DoctorPatch, DoctorPerformance, DoctorStatistics,
    NewAppointment, NewBill, NewDoctor, NewPatient, PatientFilter, PatientPatch,
    PatientStatistics, SpecializationCount,
};

/// Thread-safe handle over one database connection.
///
/// Every method locks the connection, builds the service it needs and
/// delegates, so calls are serialised within the process. Clones share the
/// same connection.
#[derive(Clone)]
pub struct HospitalCore {
    db: Arc<Mutex<Database>>,
    config: Arc<CoreConfig>,
}

impl HospitalCore {
    /// Open (or create) the database named by `config`.
    pub fn open(config: CoreConfig) -> ServiceResult<Self> {
        let db = Database::open_with_timeout(config.db_path(), config.busy_timeout())?;
        tracing::info!(path = %config.db_path().display(), "database opened");
        Ok(Self::from_database(db, config))
    }

    /// In-memory database with default configuration (for testing).
    pub fn open_in_memory() -> ServiceResult<Self> {
        Ok(Self::from_database(
            Database::open_in_memory()?,
            CoreConfig::default(),
        ))
    }

    pub fn from_database(db: Database, config: CoreConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Page request with the configured default and maximum page sizes applied.
    pub fn page_request(&self, page: u32, per_page: Option<u32>) -> PageRequest {
        PageRequest::new(page, per_page.unwrap_or(self.config.page_size()))
            .clamp_to(self.config.max_page_size())
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> ServiceResult<T>) -> ServiceResult<T> {
        let db = self.db.lock()?;
        f(&db)
    }

    // =========================================================================
    // Patient Operations
    // =========================================================================

    pub fn create_patient(&self, new: NewPatient) -> ServiceResult<Patient> {
        self.with_db(|db| PatientService::new(db).create(new))
    }

    pub fn get_patient(&self, id: &str) -> ServiceResult<Patient> {
        self.with_db(|db| PatientService::new(db).get(id))
    }

    pub fn get_patient_by_phone(&self, phone: &str) -> ServiceResult<Option<Patient>> {
        self.with_db(|db| PatientService::new(db).get_by_phone(phone))
    }

    pub fn update_patient(&self, id: &str, patch: PatientPatch) -> ServiceResult<Patient> {
        self.with_db(|db| PatientService::new(db).update(id, patch))
    }

    pub fn delete_patient(&self, id: &str) -> ServiceResult<()> {
        self.with_db(|db| PatientService::new(db).delete(id))
    }

    /// Delete a patient together with every appointment and bill.
    pub fn purge_patient(&self, id: &str) -> ServiceResult<()> {
        self.with_db(|db| PatientService::new(db).purge(id))
    }

    pub fn list_patients(
        &self,
        filter: &PatientFilter,
        page: u32,
        per_page: Option<u32>,
    ) -> ServiceResult<Page<Patient>> {
        let request = self.page_request(page, per_page);
        self.with_db(|db| PatientService::new(db).list(filter, request))
    }

    pub fn patient_appointments(
        &self,
        id: &str,
        page: u32,
        per_page: Option<u32>,
    ) -> ServiceResult<Page<Appointment>> {
        let request = self.page_request(page, per_page);
        self.with_db(|db| PatientService::new(db).appointments_for(id, request))
    }

    pub fn patient_bills(
        &self,
        id: &str,
        page: u32,
        per_page: Option<u32>,
    ) -> ServiceResult<Page<Bill>> {
        let request = self.page_request(page, per_page);
        self.with_db(|db| PatientService::new(db).bills_for(id, request))
    }

    pub fn patient_statistics(&self, today: NaiveDate) -> ServiceResult<PatientStatistics> {
        self.with_db(|db| PatientService::new(db).statistics(today))
    }

    // =========================================================================
    // Doctor Operations
    // =========================================================================

    pub fn create_doctor(&self, new: NewDoctor) -> ServiceResult<Doctor> {
        self.with_db(|db| DoctorService::new(db).create(new))
    }

    pub fn get_doctor(&self, id: &str) -> ServiceResult<Doctor> {
        self.with_db(|db| DoctorService::new(db).get(id))
    }

    pub fn get_doctor_by_email(&self, email: &str) -> ServiceResult<Option<Doctor>> {
        self.with_db(|db| DoctorService::new(db).get_by_email(email))
    }

    pub fn update_doctor(&self, id: &str, patch: DoctorPatch) -> ServiceResult<Doctor> {
        self.with_db(|db| DoctorService::new(db).update(id, patch))
    }

    pub fn set_doctor_status(&self, id: &str, status: DoctorStatus) -> ServiceResult<Doctor> {
        self.with_db(|db| DoctorService::new(db).set_status(id, status))
    }

    pub fn delete_doctor(&self, id: &str) -> ServiceResult<()> {
        self.with_db(|db| DoctorService::new(db).delete(id))
    }

    /// Delete a doctor together with every appointment and linked bill.
    pub fn purge_doctor(&self, id: &str) -> ServiceResult<()> {
        self.with_db(|db| DoctorService::new(db).purge(id))
    }

    pub fn list_doctors(
        &self,
        filter: &DoctorFilter,
        page: u32,
        per_page: Option<u32>,
    ) -> ServiceResult<Page<Doctor>> {
        let request = self.page_request(page, per_page);
        self.with_db(|db| DoctorService::new(db).list(filter, request))
    }

    pub fn active_doctors(&self) -> ServiceResult<Vec<Doctor>> {
        self.with_db(|db| DoctorService::new(db).active_doctors())
    }

    pub fn doctors_by_specialization(&self, specialization: &str) -> ServiceResult<Vec<Doctor>> {
        self.with_db(|db| DoctorService::new(db).by_specialization(specialization))
    }

    pub fn specializations(&self) -> ServiceResult<Vec<SpecializationCount>> {
        self.with_db(|db| DoctorService::new(db).specializations())
    }

    pub fn doctor_appointments(
        &self,
        id: &str,
        page: u32,
        per_page: Option<u32>,
    ) -> ServiceResult<Page<Appointment>> {
        let request = self.page_request(page, per_page);
        self.with_db(|db| DoctorService::new(db).appointments_for(id, request))
    }

    pub fn doctor_upcoming(&self, id: &str, today: NaiveDate) -> ServiceResult<Vec<Appointment>> {
        self.with_db(|db| DoctorService::new(db).upcoming_for(id, today))
    }

    pub fn doctor_performance(&self, id: &str) -> ServiceResult<DoctorPerformance> {
        self.with_db(|db| DoctorService::new(db).performance(id))
    }

    pub fn doctor_statistics(&self) -> ServiceResult<DoctorStatistics> {
        self.with_db(|db| DoctorService::new(db).statistics())
    }

    // =========================================================================
    // Appointment Operations
    // =========================================================================

    pub fn create_appointment(&self, new: NewAppointment) -> ServiceResult<Appointment> {
        self.with_db(|db| AppointmentService::new(db).create(new))
    }

    pub fn get_appointment(&self, id: &str) -> ServiceResult<Appointment> {
        self.with_db(|db| AppointmentService::new(db).get(id))
    }

    pub fn update_appointment(
        &self,
        id: &str,
        patch: AppointmentPatch,
    ) -> ServiceResult<Appointment> {
        self.with_db(|db| AppointmentService::new(db).update(id, patch))
    }

    pub fn confirm_appointment(&self, id: &str) -> ServiceResult<Appointment> {
        self.with_db(|db| AppointmentService::new(db).confirm(id))
    }

    pub fn cancel_appointment(&self, id: &str) -> ServiceResult<Appointment> {
        self.with_db(|db| AppointmentService::new(db).cancel(id))
    }

    pub fn complete_appointment(&self, id: &str) -> ServiceResult<Appointment> {
        self.with_db(|db| AppointmentService::new(db).complete(id))
    }

    pub fn delete_appointment(&self, id: &str) -> ServiceResult<()> {
        self.with_db(|db| AppointmentService::new(db).delete(id))
    }

    pub fn check_availability(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> ServiceResult<bool> {
        self.with_db(|db| AppointmentService::new(db).check_availability(doctor_id, date, time))
    }

    pub fn list_appointments(
        &self,
        filter: &AppointmentFilter,
        page: u32,
        per_page: Option<u32>,
    ) -> ServiceResult<Page<Appointment>> {
        let request = self.page_request(page, per_page);
        self.with_db(|db| AppointmentService::new(db).list(filter, request))
    }

    pub fn appointments_on(&self, date: NaiveDate) -> ServiceResult<Vec<Appointment>> {
        self.with_db(|db| AppointmentService::new(db).on_date(date))
    }

    pub fn upcoming_appointments(
        &self,
        doctor_id: Option<&str>,
        patient_id: Option<&str>,
        today: NaiveDate,
    ) -> ServiceResult<Vec<Appointment>> {
        self.with_db(|db| AppointmentService::new(db).upcoming(doctor_id, patient_id, today))
    }

    pub fn appointment_bill(&self, id: &str) -> ServiceResult<Option<Bill>> {
        self.with_db(|db| AppointmentService::new(db).bill_for(id))
    }

    pub fn appointment_statistics(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> ServiceResult<AppointmentStatistics> {
        self.with_db(|db| AppointmentService::new(db).statistics(start, end, today))
    }

    // =========================================================================
    // Bill Operations
    // =========================================================================

    pub fn create_bill(&self, new: NewBill) -> ServiceResult<Bill> {
        self.with_db(|db| BillingService::new(db).create(new))
    }

    pub fn get_bill(&self, id: &str) -> ServiceResult<Bill> {
        self.with_db(|db| BillingService::new(db).get(id))
    }

    pub fn update_bill(&self, id: &str, patch: BillPatch) -> ServiceResult<Bill> {
        self.with_db(|db| BillingService::new(db).update(id, patch))
    }

    pub fn mark_bill_paid(
        &self,
        id: &str,
        payment_method: Option<PaymentMethod>,
    ) -> ServiceResult<Bill> {
        self.with_db(|db| BillingService::new(db).mark_paid(id, payment_method))
    }

    pub fn delete_bill(&self, id: &str) -> ServiceResult<()> {
        self.with_db(|db| BillingService::new(db).delete(id))
    }

    pub fn list_bills(
        &self,
        filter: &BillFilter,
        page: u32,
        per_page: Option<u32>,
    ) -> ServiceResult<Page<Bill>> {
        let request = self.page_request(page, per_page);
        self.with_db(|db| BillingService::new(db).list(filter, request))
    }

    pub fn outstanding_bills(&self) -> ServiceResult<Vec<Bill>> {
        self.with_db(|db| BillingService::new(db).outstanding())
    }

    pub fn bill_items(&self, id: &str) -> ServiceResult<Vec<BillItem>> {
        self.with_db(|db| BillingService::new(db).items(id))
    }

    pub fn billing_statistics(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> ServiceResult<BillingStatistics> {
        self.with_db(|db| BillingService::new(db).statistics(start, end))
    }

    pub fn export_bills(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> ServiceResult<BillExport> {
        self.with_db(|db| BillingService::new(db).export(start, end))
    }

    // =========================================================================
    // Audit Operations
    // =========================================================================

    pub fn audit_history(&self, entity: EntityKind, id: &str) -> ServiceResult<Vec<AuditEntry>> {
        self.with_db(|db| Ok(db.audit_entries_for(entity, id)?))
    }

    pub fn recent_audit_entries(&self, limit: u32) -> ServiceResult<Vec<AuditEntry>> {
        self.with_db(|db| Ok(db.recent_audit_entries(limit)?))
    }

    /// Walk the audit hash chain from the first entry.
    pub fn verify_audit_chain(&self) -> ServiceResult<AuditChainReport> {
        self.with_db(|db| {
            let report = db.verify_audit_chain()?;
            if !report.is_intact() {
                tracing::warn!(broken_at = ?report.broken_at, "audit chain broken");
            }
            Ok(report)
        })
    }
}
