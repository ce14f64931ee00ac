//! Bill and bill item database operations.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use rust_decimal::Decimal;

use super::{parse_money, parse_opt, Database, DbError, DbResult, QueryFilter};
use crate::models::{
    round_money, zeroed, Bill, BillFilter, BillItem, BillStatus, BillingStatistics,
    MonthlyRevenue, NewBillItem, Page, PageRequest, PaymentMethod, DATE_FORMAT,
};

const BILL_COLUMNS: &str = "b.id, b.patient_id, b.appointment_id, b.subtotal, b.discount, \
     b.tax_rate, b.tax, b.total_amount, b.status, b.payment_method, b.notes, b.date, \
     b.created_at, b.updated_at";

/// Months reported in revenue statistics.
const REVENUE_MONTHS: usize = 12;

impl Database {
    /// Insert a bill row. Items are written separately with [`Database::replace_bill_items`].
    pub fn insert_bill(&self, bill: &Bill) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO bills (
                id, patient_id, appointment_id, subtotal, discount, tax_rate, tax,
                total_amount, status, payment_method, notes, date, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                bill.id,
                bill.patient_id,
                bill.appointment_id,
                bill.subtotal.to_string(),
                bill.discount.to_string(),
                bill.tax_rate.to_string(),
                bill.tax.to_string(),
                bill.total_amount.to_string(),
                bill.status.as_str(),
                bill.payment_method.map(|m| m.as_str()),
                bill.notes,
                bill.date,
                bill.created_at,
                bill.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update a bill row. `patient_id` and the items are not touched.
    ///
    /// Paid bills are rejected by the storage trigger.
    pub fn update_bill(&self, bill: &Bill) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE bills SET
                appointment_id = ?2,
                subtotal = ?3,
                discount = ?4,
                tax_rate = ?5,
                tax = ?6,
                total_amount = ?7,
                status = ?8,
                payment_method = ?9,
                notes = ?10,
                updated_at = ?11
            WHERE id = ?1
            "#,
            params![
                bill.id,
                bill.appointment_id,
                bill.subtotal.to_string(),
                bill.discount.to_string(),
                bill.tax_rate.to_string(),
                bill.tax.to_string(),
                bill.total_amount.to_string(),
                bill.status.as_str(),
                bill.payment_method.map(|m| m.as_str()),
                bill.notes,
                bill.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Replace every item of a bill.
    pub fn replace_bill_items(
        &self,
        bill_id: &str,
        items: &[NewBillItem],
        created_at: &str,
    ) -> DbResult<Vec<BillItem>> {
        self.conn
            .execute("DELETE FROM bill_items WHERE bill_id = ?", [bill_id])?;

        let mut stmt = self.conn.prepare(
            "INSERT INTO bill_items (bill_id, description, amount, created_at) VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut stored = Vec::with_capacity(items.len());
        for item in items {
            let amount = round_money(item.amount);
            stmt.execute(params![bill_id, item.description, amount.to_string(), created_at])?;
            stored.push(BillItem {
                id: self.conn.last_insert_rowid(),
                bill_id: bill_id.to_string(),
                description: item.description.clone(),
                amount,
                created_at: created_at.to_string(),
            });
        }
        Ok(stored)
    }

    /// Items of a bill, in insertion order.
    pub fn bill_items(&self, bill_id: &str) -> DbResult<Vec<BillItem>> {
        self.fetch_all(
            "SELECT id, bill_id, description, amount, created_at FROM bill_items WHERE bill_id = ? ORDER BY id",
            &[Value::Text(bill_id.to_string())],
            bill_item_row,
        )
    }

    /// Get a bill with its items.
    pub fn get_bill(&self, id: &str) -> DbResult<Option<Bill>> {
        let sql = format!("SELECT {BILL_COLUMNS} FROM bills b WHERE b.id = ?");
        let bill = self
            .conn
            .query_row(&sql, [id], bill_row)
            .optional()?
            .map(Bill::try_from)
            .transpose()?;
        bill.map(|bill| self.with_items(bill)).transpose()
    }

    /// List bills, most recent first.
    pub fn list_bills(&self, filter: &BillFilter, page: PageRequest) -> DbResult<Page<Bill>> {
        let mut query = QueryFilter::new();
        if let Some(search) = &filter.search {
            query.push_search(&["b.id", "p.name"], search);
        }
        if let Some(status) = filter.status {
            query.push("b.status = ?", status.as_str().to_string());
        }
        if let Some(patient_id) = &filter.patient_id {
            query.push("b.patient_id = ?", patient_id.clone());
        }
        if let Some(start) = filter.start_date {
            query.push("substr(b.date, 1, 10) >= ?", start.format(DATE_FORMAT).to_string());
        }
        if let Some(end) = filter.end_date {
            query.push("substr(b.date, 1, 10) <= ?", end.format(DATE_FORMAT).to_string());
        }

        let mut page: Page<Bill> = self.fetch_page(
            BILL_COLUMNS,
            "bills b JOIN patients p ON p.id = b.patient_id",
            &query,
            "b.date DESC, b.id DESC",
            page,
            bill_row,
        )?;
        for bill in &mut page.items {
            bill.items = self.bill_items(&bill.id)?;
        }
        Ok(page)
    }

    /// Bills still carrying an amount due, oldest first.
    pub fn outstanding_bills(&self) -> DbResult<Vec<Bill>> {
        let sql = format!(
            "SELECT {BILL_COLUMNS} FROM bills b WHERE b.status IN ('pending', 'partial') ORDER BY b.date, b.id"
        );
        self.bills_with_items(&sql, &[])
    }

    /// Bills linked to an appointment.
    pub fn bills_for_appointment(&self, appointment_id: &str) -> DbResult<Vec<Bill>> {
        let sql = format!("SELECT {BILL_COLUMNS} FROM bills b WHERE b.appointment_id = ? ORDER BY b.id");
        self.bills_with_items(&sql, &[Value::Text(appointment_id.to_string())])
    }

    /// Bills dated within an inclusive range, oldest first.
    pub fn bills_in_range(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> DbResult<Vec<Bill>> {
        let (clause, values) = date_bounds(start, end);
        let sql = format!("SELECT {BILL_COLUMNS} FROM bills b WHERE 1 = 1{clause} ORDER BY b.date, b.id");
        self.bills_with_items(&sql, &values)
    }

    /// Settle a bill.
    pub fn mark_bill_paid(
        &self,
        id: &str,
        payment_method: Option<PaymentMethod>,
        updated_at: &str,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE bills SET
                status = 'paid',
                payment_method = COALESCE(?2, payment_method),
                updated_at = ?3
            WHERE id = ?1
            "#,
            params![id, payment_method.map(|m| m.as_str()), updated_at],
        )?;
        Ok(rows_affected > 0)
    }

    /// Delete a bill and its items.
    pub fn delete_bill(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM bills WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Billing statistics over bills dated within an inclusive range.
    pub fn billing_statistics(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> DbResult<BillingStatistics> {
        let mut status_distribution = zeroed(&BillStatus::ALL);
        let mut total_revenue = Decimal::ZERO;
        let mut pending_amount = Decimal::ZERO;
        let mut by_month: BTreeMap<String, (Decimal, u64)> = BTreeMap::new();

        let (clause, values) = date_bounds(start, end);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT b.status, b.total_amount, substr(b.date, 1, 7) FROM bills b WHERE 1 = 1{clause}"
        ))?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (status, total, month) = row?;
            let status: BillStatus = status.parse()?;
            let total = parse_money("total_amount", &total)?;

            *status_distribution.entry(status).or_insert(0) += 1;
            if status == BillStatus::Paid {
                total_revenue += total;
                let entry = by_month.entry(month).or_insert((Decimal::ZERO, 0));
                entry.0 += total;
                entry.1 += 1;
            } else {
                pending_amount += total;
            }
        }

        let revenue_by_month = by_month
            .into_iter()
            .rev()
            .take(REVENUE_MONTHS)
            .map(|(month, (revenue, count))| MonthlyRevenue {
                month,
                revenue: round_money(revenue),
                count,
            })
            .collect();

        Ok(BillingStatistics {
            total_revenue: round_money(total_revenue),
            pending_amount: round_money(pending_amount),
            status_distribution,
            revenue_by_month,
        })
    }

    fn with_items(&self, mut bill: Bill) -> DbResult<Bill> {
        bill.items = self.bill_items(&bill.id)?;
        Ok(bill)
    }

    fn bills_with_items(&self, sql: &str, values: &[Value]) -> DbResult<Vec<Bill>> {
        let bills: Vec<Bill> = self.fetch_all(sql, values, bill_row)?;
        bills.into_iter().map(|bill| self.with_items(bill)).collect()
    }
}

/// `AND` clauses bounding `b.date` by calendar day, with their parameters.
fn date_bounds(start: Option<NaiveDate>, end: Option<NaiveDate>) -> (String, Vec<Value>) {
    let mut clause = String::new();
    let mut values = Vec::new();
    if let Some(start) = start {
        clause.push_str(" AND substr(b.date, 1, 10) >= ?");
        values.push(Value::Text(start.format(DATE_FORMAT).to_string()));
    }
    if let Some(end) = end {
        clause.push_str(" AND substr(b.date, 1, 10) <= ?");
        values.push(Value::Text(end.format(DATE_FORMAT).to_string()));
    }
    (clause, values)
}

/// Intermediate row struct for database mapping.
pub(crate) struct BillRow {
    id: String,
    patient_id: String,
    appointment_id: Option<String>,
    subtotal: String,
    discount: String,
    tax_rate: String,
    tax: String,
    total_amount: String,
    status: String,
    payment_method: Option<String>,
    notes: Option<String>,
    date: String,
    created_at: String,
    updated_at: String,
}

fn bill_row(row: &Row<'_>) -> rusqlite::Result<BillRow> {
    Ok(BillRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        appointment_id: row.get(2)?,
        subtotal: row.get(3)?,
        discount: row.get(4)?,
        tax_rate: row.get(5)?,
        tax: row.get(6)?,
        total_amount: row.get(7)?,
        status: row.get(8)?,
        payment_method: row.get(9)?,
        notes: row.get(10)?,
        date: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

impl TryFrom<BillRow> for Bill {
    type Error = DbError;

    fn try_from(row: BillRow) -> Result<Self, Self::Error> {
        Ok(Bill {
            id: row.id,
            patient_id: row.patient_id,
            appointment_id: row.appointment_id,
            subtotal: parse_money("subtotal", &row.subtotal)?,
            discount: parse_money("discount", &row.discount)?,
            tax_rate: parse_money("tax_rate", &row.tax_rate)?,
            tax: parse_money("tax", &row.tax)?,
            total_amount: parse_money("total_amount", &row.total_amount)?,
            status: row.status.parse()?,
            payment_method: parse_opt(row.payment_method)?,
            notes: row.notes,
            date: row.date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            items: Vec::new(),
        })
    }
}

pub(crate) struct BillItemRow {
    id: i64,
    bill_id: String,
    description: String,
    amount: String,
    created_at: String,
}

fn bill_item_row(row: &Row<'_>) -> rusqlite::Result<BillItemRow> {
    Ok(BillItemRow {
        id: row.get(0)?,
        bill_id: row.get(1)?,
        description: row.get(2)?,
        amount: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl TryFrom<BillItemRow> for BillItem {
    type Error = DbError;

    fn try_from(row: BillItemRow) -> Result<Self, Self::Error> {
        Ok(BillItem {
            id: row.id,
            bill_id: row.bill_id,
            description: row.description,
            amount: parse_money("amount", &row.amount)?,
            created_at: row.created_at,
        })
    }
}
