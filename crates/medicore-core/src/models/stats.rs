//! Read-only statistics summaries.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AppointmentStatus, BillStatus, BloodGroup, DoctorStatus, Gender};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientStatistics {
    pub total_patients: u64,
    /// Registered within the last 30 days
    pub new_patients: u64,
    /// Every blood group is present, zero when unused
    pub blood_groups: BTreeMap<BloodGroup, u64>,
    pub gender_distribution: BTreeMap<Gender, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpecializationCount {
    pub specialization: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorStatistics {
    pub total_doctors: u64,
    pub active_doctors: u64,
    pub status_distribution: BTreeMap<DoctorStatus, u64>,
    pub average_consultation_fee: Decimal,
    /// Ten most common specializations, most common first
    pub top_specializations: Vec<SpecializationCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateCount {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentStatistics {
    pub total_appointments: u64,
    pub status_distribution: BTreeMap<AppointmentStatus, u64>,
    /// Per-day counts over the last 30 days, oldest first
    pub appointments_by_date: Vec<DateCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyRevenue {
    /// `YYYY-MM`
    pub month: String,
    pub revenue: Decimal,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BillingStatistics {
    /// Sum of paid bill totals
    pub total_revenue: Decimal,
    /// Sum of pending and partial bill totals
    pub pending_amount: Decimal,
    pub status_distribution: BTreeMap<BillStatus, u64>,
    /// Up to twelve months with paid bills, newest first
    pub revenue_by_month: Vec<MonthlyRevenue>,
}

/// Zero-filled counter keyed by every variant.
pub(crate) fn zeroed<K: Ord + Copy>(keys: &[K]) -> BTreeMap<K, u64> {
    keys.iter().map(|k| (*k, 0)).collect()
}
