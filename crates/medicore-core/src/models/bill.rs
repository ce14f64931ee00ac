//! Bill and bill item models.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::InvalidValue;

/// Bill payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Pending,
    Partial,
    /// Terminal: the bill can no longer be changed or deleted
    Paid,
}

impl BillStatus {
    pub const ALL: [BillStatus; 3] = [BillStatus::Pending, BillStatus::Partial, BillStatus::Paid];

    /// Statuses that still carry an amount due.
    pub const OUTSTANDING: [BillStatus; 2] = [BillStatus::Pending, BillStatus::Partial];

    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Pending => "pending",
            BillStatus::Partial => "partial",
            BillStatus::Paid => "paid",
        }
    }
}

impl FromStr for BillStatus {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BillStatus::Pending),
            "partial" => Ok(BillStatus::Partial),
            "paid" => Ok(BillStatus::Paid),
            _ => Err(InvalidValue::new("bill status", s)),
        }
    }
}

impl fmt::Display for BillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a bill was settled. A tag only; no payment processing happens here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Upi,
    Insurance,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::Upi,
        PaymentMethod::Insurance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Insurance => "insurance",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "upi" => Ok(PaymentMethod::Upi),
            "insurance" => Ok(PaymentMethod::Insurance),
            _ => Err(InvalidValue::new("payment method", s)),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single charge on a bill.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BillItem {
    /// Storage-assigned row id
    pub id: i64,
    pub bill_id: String,
    pub description: String,
    pub amount: Decimal,
    pub created_at: String,
}

/// A line item as submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewBillItem {
    pub description: String,
    pub amount: Decimal,
}

impl NewBillItem {
    pub fn new(description: impl Into<String>, amount: Decimal) -> Self {
        Self {
            description: description.into(),
            amount,
        }
    }
}

/// A patient bill with its line items.
///
/// `tax` is the computed tax amount; `tax_rate` is the percentage it was
/// computed from. `total_amount == subtotal - discount + tax` always holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bill {
    /// Sequential identifier (`B0001`)
    pub id: String,
    pub patient_id: String,
    pub appointment_id: Option<String>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    /// Tax percentage
    pub tax_rate: Decimal,
    /// Tax amount
    pub tax: Decimal,
    pub total_amount: Decimal,
    pub status: BillStatus,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
    /// Billing timestamp
    pub date: String,
    pub created_at: String,
    pub updated_at: String,
    pub items: Vec<BillItem>,
}

impl Bill {
    /// Whether the bill is settled and therefore immutable.
    pub fn is_paid(&self) -> bool {
        self.status == BillStatus::Paid
    }

    /// Item amounts, in storage order.
    pub fn item_amounts(&self) -> Vec<Decimal> {
        self.items.iter().map(|item| item.amount).collect()
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Fields accepted when raising a bill.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewBill {
    pub patient_id: String,
    #[serde(default)]
    pub appointment_id: Option<String>,
    pub items: Vec<NewBillItem>,
    #[serde(default)]
    pub discount: Decimal,
    /// Tax percentage applied to `subtotal - discount`
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewBill {
    /// A bill with no discount and no tax.
    pub fn new(patient_id: impl Into<String>, items: Vec<NewBillItem>) -> Self {
        Self {
            patient_id: patient_id.into(),
            appointment_id: None,
            items,
            discount: Decimal::ZERO,
            tax_rate: Decimal::ZERO,
            payment_method: None,
            notes: None,
        }
    }
}

/// Partial update of a bill.
///
/// `patient_id` is not updatable. `items`, when present, replace the
/// existing items wholesale. Any of `items`, `discount` or `tax_rate`
/// triggers a recomputation of the totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BillPatch {
    pub appointment_id: Option<String>,
    pub items: Option<Vec<NewBillItem>>,
    pub discount: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub status: Option<BillStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub notes: Option<String>,
}

impl BillPatch {
    /// Whether applying the patch changes the monetary fields.
    pub fn touches_totals(&self) -> bool {
        self.items.is_some() || self.discount.is_some() || self.tax_rate.is_some()
    }
}

/// Listing filter for bills.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BillFilter {
    /// Case-insensitive substring over bill id and patient name
    pub search: Option<String>,
    pub status: Option<BillStatus>,
    pub patient_id: Option<String>,
    /// Inclusive lower bound on the bill date
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound on the bill date
    pub end_date: Option<NaiveDate>,
}
