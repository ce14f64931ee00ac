//! Bill export for accounting systems.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::{Database, DbResult};
use crate::models::{round_money, Bill};

const CSV_HEADER: &str = "bill_id,patient_id,appointment_id,date,status,payment_method,\
item_description,item_amount,subtotal,discount,tax,total_amount\n";

/// Export metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillExportMetadata {
    /// Export timestamp
    pub exported_at: String,
    /// Inclusive lower bound on bill date, if any
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound on bill date, if any
    pub end_date: Option<NaiveDate>,
    pub bill_count: usize,
    pub item_count: usize,
    /// Sum of bill totals
    pub grand_total: Decimal,
}

/// A batch of bills with their items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillExport {
    pub metadata: BillExportMetadata,
    pub bills: Vec<Bill>,
}

impl BillExport {
    /// Build an export from already loaded bills.
    pub fn from_bills(bills: Vec<Bill>, start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> Self {
        let item_count: usize = bills.iter().map(|b| b.items.len()).sum();
        let grand_total = round_money(bills.iter().map(|b| b.total_amount).sum());
        Self {
            metadata: BillExportMetadata {
                exported_at: chrono::Utc::now().to_rfc3339(),
                start_date,
                end_date,
                bill_count: bills.len(),
                item_count,
                grand_total,
            },
            bills,
        }
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export to CSV, one row per bill item.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from(CSV_HEADER);

        for bill in &self.bills {
            for item in &bill.items {
                csv.push_str(&format!(
                    "{},{},{},{},{},{},{},{},{},{},{},{}\n",
                    escape_csv(&bill.id),
                    escape_csv(&bill.patient_id),
                    escape_csv(bill.appointment_id.as_deref().unwrap_or("")),
                    escape_csv(&bill.date),
                    bill.status,
                    bill.payment_method.map(|m| m.as_str()).unwrap_or(""),
                    escape_csv(&item.description),
                    item.amount,
                    bill.subtotal,
                    bill.discount,
                    bill.tax,
                    bill.total_amount,
                ));
            }
        }

        csv
    }
}

/// Bill exporter.
pub struct BillExporter<'a> {
    db: &'a Database,
}

impl<'a> BillExporter<'a> {
    /// Create a new bill exporter.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Export every bill dated within the range (both bounds optional, inclusive).
    pub fn export(&self, start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> DbResult<BillExport> {
        let bills = self.db.bills_in_range(start_date, end_date)?;
        tracing::info!(bills = bills.len(), "exporting bills");
        Ok(BillExport::from_bills(bills, start_date, end_date))
    }
}

/// Escape a string for CSV output.
fn escape_csv(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
