//! Bill creation, payment and reporting.

use chrono::NaiveDate;

use super::{
    ensure_bill_mutable, ensure_bill_payable, now, require_text, AuditRecorder, AuditSink,
    ServiceError, ServiceResult,
};
use crate::billing::{compute_totals, BillExport, BillExporter, BillTotals};
use crate::db::Database;
use crate::models::{
    AuditAction, Bill, BillFilter, BillItem, BillPatch, BillStatus, BillingStatistics, EntityKind,
    NewBill, NewBillItem, Page, PageRequest, PaymentMethod,
};

/// Bill operations.
pub struct BillingService<'a> {
    db: &'a Database,
    audit: AuditRecorder<'a>,
}

impl<'a> BillingService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self::with_audit(db, db)
    }

    pub fn with_audit(db: &'a Database, sink: &'a dyn AuditSink) -> Self {
        Self {
            db,
            audit: AuditRecorder::new(sink),
        }
    }

    /// Raise a pending bill. Totals are derived from the items.
    pub fn create(&self, new: NewBill) -> ServiceResult<Bill> {
        require_text("patient_id", &new.patient_id)?;
        validate_items(&new.items)?;
        let amounts: Vec<_> = new.items.iter().map(|item| item.amount).collect();
        let totals = compute_totals(&amounts, new.discount, new.tax_rate)?;

        let tx = self.db.immediate_transaction()?;
        if self.db.get_patient(&new.patient_id)?.is_none() {
            return Err(ServiceError::not_found(EntityKind::Patient, &new.patient_id));
        }
        if let Some(appointment_id) = &new.appointment_id {
            self.ensure_appointment_of(appointment_id, &new.patient_id)?;
        }
        let timestamp = now();
        let id = self.db.next_id(EntityKind::Bill)?;
        let mut bill = Bill {
            id,
            patient_id: new.patient_id,
            appointment_id: new.appointment_id,
            subtotal: Default::default(),
            discount: Default::default(),
            tax_rate: new.tax_rate,
            tax: Default::default(),
            total_amount: Default::default(),
            status: BillStatus::Pending,
            payment_method: new.payment_method,
            notes: new.notes,
            date: timestamp.clone(),
            created_at: timestamp.clone(),
            updated_at: timestamp.clone(),
            items: Vec::new(),
        };
        apply_totals(&mut bill, totals);
        self.db.insert_bill(&bill)?;
        bill.items = self.db.replace_bill_items(&bill.id, &new.items, &timestamp)?;
        tx.commit()?;

        tracing::info!(bill_id = %bill.id, patient_id = %bill.patient_id, total = %bill.total_amount, "bill created");
        self.audit
            .record(AuditAction::Create, EntityKind::Bill, &bill.id, None, Some(&bill));
        Ok(bill)
    }

    pub fn get(&self, id: &str) -> ServiceResult<Bill> {
        self.db
            .get_bill(id)?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Bill, id))
    }

    /// Apply a partial update to an unpaid bill.
    ///
    /// New items, a new discount or a new tax rate each trigger a full
    /// recomputation; missing inputs are taken from the stored bill.
    /// Setting the status to paid is refused here, see [`Self::mark_paid`].
    pub fn update(&self, id: &str, patch: BillPatch) -> ServiceResult<Bill> {
        let tx = self.db.immediate_transaction()?;
        let old = self.get(id)?;
        ensure_bill_mutable(&old)?;
        if patch.status == Some(BillStatus::Paid) {
            return Err(ServiceError::Validation(
                "status paid can only be set by marking the bill paid".to_string(),
            ));
        }
        if let Some(items) = &patch.items {
            validate_items(items)?;
        }
        if let Some(appointment_id) = &patch.appointment_id {
            self.ensure_appointment_of(appointment_id, &old.patient_id)?;
        }

        let mut bill = old.clone();
        if patch.touches_totals() {
            let amounts: Vec<_> = match &patch.items {
                Some(items) => items.iter().map(|item| item.amount).collect(),
                None => old.item_amounts(),
            };
            let discount = patch.discount.unwrap_or(old.discount);
            let tax_rate = patch.tax_rate.unwrap_or(old.tax_rate);
            let totals = compute_totals(&amounts, discount, tax_rate)?;
            bill.tax_rate = tax_rate;
            apply_totals(&mut bill, totals);
        }
        if patch.appointment_id.is_some() {
            bill.appointment_id = patch.appointment_id;
        }
        if let Some(status) = patch.status {
            bill.status = status;
        }
        if patch.payment_method.is_some() {
            bill.payment_method = patch.payment_method;
        }
        if patch.notes.is_some() {
            bill.notes = patch.notes;
        }
        bill.touch();

        if let Some(items) = &patch.items {
            bill.items = self.db.replace_bill_items(id, items, &bill.updated_at)?;
        }
        self.db.update_bill(&bill)?;
        tx.commit()?;

        tracing::info!(bill_id = %id, total = %bill.total_amount, "bill updated");
        self.audit
            .record(AuditAction::Update, EntityKind::Bill, id, Some(&old), Some(&bill));
        Ok(bill)
    }

    /// Settle a bill, optionally recording how it was paid.
    pub fn mark_paid(&self, id: &str, payment_method: Option<PaymentMethod>) -> ServiceResult<Bill> {
        let tx = self.db.immediate_transaction()?;
        let old = self.get(id)?;
        ensure_bill_payable(&old)?;
        let updated_at = now();
        self.db.mark_bill_paid(id, payment_method, &updated_at)?;
        tx.commit()?;

        let bill = Bill {
            status: BillStatus::Paid,
            payment_method: payment_method.or(old.payment_method),
            updated_at,
            ..old.clone()
        };

        tracing::info!(bill_id = %id, method = ?bill.payment_method, "bill paid");
        self.audit
            .record(AuditAction::MarkPaid, EntityKind::Bill, id, Some(&old), Some(&bill));
        Ok(bill)
    }

    /// Delete an unpaid bill and its items.
    pub fn delete(&self, id: &str) -> ServiceResult<()> {
        let tx = self.db.immediate_transaction()?;
        let bill = self.get(id)?;
        ensure_bill_mutable(&bill)?;
        self.db.delete_bill(id)?;
        tx.commit()?;

        tracing::info!(bill_id = %id, "bill deleted");
        self.audit
            .record(AuditAction::Delete, EntityKind::Bill, id, Some(&bill), None);
        Ok(())
    }

    pub fn list(&self, filter: &BillFilter, page: PageRequest) -> ServiceResult<Page<Bill>> {
        Ok(self.db.list_bills(filter, page)?)
    }

    /// Pending and partially paid bills.
    pub fn outstanding(&self) -> ServiceResult<Vec<Bill>> {
        Ok(self.db.outstanding_bills()?)
    }

    pub fn items(&self, bill_id: &str) -> ServiceResult<Vec<BillItem>> {
        self.get(bill_id)?;
        Ok(self.db.bill_items(bill_id)?)
    }

    /// Revenue and status figures over bills dated within an inclusive range.
    pub fn statistics(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> ServiceResult<BillingStatistics> {
        ensure_range(start, end)?;
        Ok(self.db.billing_statistics(start, end)?)
    }

    /// Bills dated within an inclusive range, ready for JSON or CSV output.
    pub fn export(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> ServiceResult<BillExport> {
        ensure_range(start, end)?;
        Ok(BillExporter::new(self.db).export(start, end)?)
    }

    fn ensure_appointment_of(&self, appointment_id: &str, patient_id: &str) -> ServiceResult<()> {
        let appointment = self
            .db
            .get_appointment(appointment_id)?
            .ok_or_else(|| ServiceError::not_found(EntityKind::Appointment, appointment_id))?;
        if appointment.patient_id != patient_id {
            return Err(ServiceError::Validation(format!(
                "appointment {appointment_id} belongs to patient {}, not {patient_id}",
                appointment.patient_id
            )));
        }
        Ok(())
    }
}

fn ensure_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> ServiceResult<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(ServiceError::Validation(format!(
                "date range starts after it ends ({start} > {end})"
            )));
        }
    }
    Ok(())
}

fn validate_items(items: &[NewBillItem]) -> ServiceResult<()> {
    for (index, item) in items.iter().enumerate() {
        if item.description.trim().is_empty() {
            return Err(ServiceError::Validation(format!(
                "item {index} needs a description"
            )));
        }
    }
    Ok(())
}

fn apply_totals(bill: &mut Bill, totals: BillTotals) {
    bill.subtotal = totals.subtotal;
    bill.discount = totals.discount;
    bill.tax = totals.tax_amount;
    bill.total_amount = totals.total;
}
