//! Doctor models.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::InvalidValue;

/// Doctor availability status. Only `Active` doctors can be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DoctorStatus {
    Active,
    #[serde(rename = "On Leave")]
    OnLeave,
    Inactive,
}

impl DoctorStatus {
    pub const ALL: [DoctorStatus; 3] = [
        DoctorStatus::Active,
        DoctorStatus::OnLeave,
        DoctorStatus::Inactive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DoctorStatus::Active => "Active",
            DoctorStatus::OnLeave => "On Leave",
            DoctorStatus::Inactive => "Inactive",
        }
    }
}

impl FromStr for DoctorStatus {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(DoctorStatus::Active),
            "On Leave" => Ok(DoctorStatus::OnLeave),
            "Inactive" => Ok(DoctorStatus::Inactive),
            _ => Err(InvalidValue::new("doctor status", s)),
        }
    }
}

impl fmt::Display for DoctorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A doctor on staff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doctor {
    /// Sequential identifier (`D0001`)
    pub id: String,
    pub name: String,
    pub specialization: String,
    pub phone: String,
    /// Unique across doctors
    pub email: String,
    /// Years of experience
    pub experience: u32,
    pub qualification: String,
    pub consultation_fee: Decimal,
    pub status: DoctorStatus,
    pub address: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields accepted when adding a doctor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewDoctor {
    pub name: String,
    pub specialization: String,
    pub phone: String,
    pub email: String,
    pub experience: u32,
    pub qualification: String,
    pub consultation_fee: Decimal,
    /// Defaults to `Active`
    #[serde(default)]
    pub status: Option<DoctorStatus>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Partial update of a doctor. `id` and `created_at` are not updatable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DoctorPatch {
    pub name: Option<String>,
    pub specialization: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub experience: Option<u32>,
    pub qualification: Option<String>,
    pub consultation_fee: Option<Decimal>,
    pub status: Option<DoctorStatus>,
    pub address: Option<String>,
}

impl DoctorPatch {
    /// Apply the set fields onto `doctor`.
    pub fn apply_to(self, doctor: &mut Doctor) {
        if let Some(name) = self.name {
            doctor.name = name;
        }
        if let Some(specialization) = self.specialization {
            doctor.specialization = specialization;
        }
        if let Some(phone) = self.phone {
            doctor.phone = phone;
        }
        if let Some(email) = self.email {
            doctor.email = email;
        }
        if let Some(experience) = self.experience {
            doctor.experience = experience;
        }
        if let Some(qualification) = self.qualification {
            doctor.qualification = qualification;
        }
        if let Some(fee) = self.consultation_fee {
            doctor.consultation_fee = super::round_money(fee);
        }
        if let Some(status) = self.status {
            doctor.status = status;
        }
        if self.address.is_some() {
            doctor.address = self.address;
        }
    }
}

impl Doctor {
    /// Build a doctor record from the submitted fields.
    pub fn from_new(id: String, new: NewDoctor) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            name: new.name,
            specialization: new.specialization,
            phone: new.phone,
            email: new.email,
            experience: new.experience,
            qualification: new.qualification,
            consultation_fee: super::round_money(new.consultation_fee),
            status: new.status.unwrap_or(DoctorStatus::Active),
            address: new.address,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Whether new appointments may be booked with this doctor.
    pub fn is_bookable(&self) -> bool {
        self.status == DoctorStatus::Active
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Listing filter for doctors.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DoctorFilter {
    /// Case-insensitive substring over name, id, specialization and email
    pub search: Option<String>,
    pub specialization: Option<String>,
    pub status: Option<DoctorStatus>,
}

/// Doctor performance summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorPerformance {
    pub doctor_id: String,
    pub total_appointments: u64,
    pub completed_appointments: u64,
    /// Percentage of appointments completed, 0 when there are none
    pub completion_rate: f64,
    /// Sum of bill totals linked to this doctor's appointments
    pub total_revenue: Decimal,
}
