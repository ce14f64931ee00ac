//! Appointment models.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::{InvalidValue, DATE_FORMAT, TIME_FORMAT};

/// Appointment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    /// Booked, awaiting confirmation
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    /// Statuses that occupy a slot.
    pub const ACTIVE: [AppointmentStatus; 2] =
        [AppointmentStatus::Pending, AppointmentStatus::Confirmed];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

impl FromStr for AppointmentStatus {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AppointmentStatus::Pending),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            _ => Err(InvalidValue::new("appointment status", s)),
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bookable unit: one doctor at one date and time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub doctor_id: String,
    pub date: NaiveDate,
    #[serde(with = "super::time_hhmm")]
    pub time: NaiveTime,
}

impl Slot {
    pub fn new(doctor_id: impl Into<String>, date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            doctor_id: doctor_id.into(),
            date,
            time,
        }
    }

    /// Storage representation of the date.
    pub fn date_key(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    /// Storage representation of the time.
    pub fn time_key(&self) -> String {
        self.time.format(TIME_FORMAT).to_string()
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {} at {}", self.doctor_id, self.date_key(), self.time_key())
    }
}

/// A booked appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    /// Sequential identifier (`A0001`)
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub date: NaiveDate,
    #[serde(with = "super::time_hhmm")]
    pub time: NaiveTime,
    /// Reason for the visit
    pub reason: String,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields accepted when booking an appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAppointment {
    pub patient_id: String,
    pub doctor_id: String,
    pub date: NaiveDate,
    #[serde(with = "super::time_hhmm")]
    pub time: NaiveTime,
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewAppointment {
    pub fn slot(&self) -> Slot {
        Slot::new(self.doctor_id.clone(), self.date, self.time)
    }
}

/// Partial update of an appointment.
///
/// `patient_id` is not updatable; status changes go through the lifecycle
/// actions (confirm/cancel/complete).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppointmentPatch {
    pub doctor_id: Option<String>,
    pub date: Option<NaiveDate>,
    #[serde(with = "super::option_time_hhmm")]
    pub time: Option<NaiveTime>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl AppointmentPatch {
    /// Whether the patch moves the appointment to a different slot.
    pub fn changes_slot(&self, current: &Appointment) -> bool {
        self.doctor_id.as_ref().is_some_and(|d| *d != current.doctor_id)
            || self.date.is_some_and(|d| d != current.date)
            || self.time.is_some_and(|t| t != current.time)
    }

    /// The slot the appointment occupies once the patch is applied.
    pub fn target_slot(&self, current: &Appointment) -> Slot {
        Slot::new(
            self.doctor_id.clone().unwrap_or_else(|| current.doctor_id.clone()),
            self.date.unwrap_or(current.date),
            self.time.unwrap_or(current.time),
        )
    }

    /// Apply the set fields onto `appointment`.
    pub fn apply_to(self, appointment: &mut Appointment) {
        if let Some(doctor_id) = self.doctor_id {
            appointment.doctor_id = doctor_id;
        }
        if let Some(date) = self.date {
            appointment.date = date;
        }
        if let Some(time) = self.time {
            appointment.time = time;
        }
        if let Some(reason) = self.reason {
            appointment.reason = reason;
        }
        if self.notes.is_some() {
            appointment.notes = self.notes;
        }
    }
}

impl Appointment {
    /// Build a pending appointment from booking fields.
    pub fn from_new(id: String, new: NewAppointment) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            patient_id: new.patient_id,
            doctor_id: new.doctor_id,
            date: new.date,
            time: new.time,
            reason: new.reason,
            status: AppointmentStatus::Pending,
            notes: new.notes,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn slot(&self) -> Slot {
        Slot::new(self.doctor_id.clone(), self.date, self.time)
    }

    /// Whether the appointment occupies its slot.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Listing filter for appointments.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppointmentFilter {
    /// Case-insensitive substring over appointment id, patient name and doctor name
    pub search: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    pub doctor_id: Option<String>,
    pub patient_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_appointment() -> Appointment {
        Appointment::from_new(
            "A0001".into(),
            NewAppointment {
                patient_id: "P0001".into(),
                doctor_id: "D0001".into(),
                date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
                time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                reason: "checkup".into(),
                notes: None,
            },
        )
    }

    #[test]
    fn test_new_appointment_is_pending_and_active() {
        let appointment = make_appointment();
        assert_eq!(appointment.status, AppointmentStatus::Pending);
        assert!(appointment.is_active());
    }

    #[test]
    fn test_only_pending_and_confirmed_are_active() {
        assert!(AppointmentStatus::Pending.is_active());
        assert!(AppointmentStatus::Confirmed.is_active());
        assert!(!AppointmentStatus::Completed.is_active());
        assert!(!AppointmentStatus::Cancelled.is_active());
    }

    #[test]
    fn test_patch_slot_detection() {
        let appointment = make_appointment();

        let same = AppointmentPatch {
            date: Some(appointment.date),
            reason: Some("follow-up".into()),
            ..Default::default()
        };
        assert!(!same.changes_slot(&appointment));

        let moved = AppointmentPatch {
            time: Some(NaiveTime::from_hms_opt(9, 1, 0).unwrap()),
            ..Default::default()
        };
        assert!(moved.changes_slot(&appointment));
        assert_eq!(moved.target_slot(&appointment).time_key(), "09:01");
        assert_eq!(moved.target_slot(&appointment).doctor_id, "D0001");
    }

    #[test]
    fn test_time_serializes_as_hhmm() {
        let json = serde_json::to_value(make_appointment()).unwrap();
        assert_eq!(json["time"], "09:00");
        assert_eq!(json["date"], "2024-01-10");
        assert_eq!(json["status"], "pending");
    }

    #[test]
    fn test_new_appointment_deserializes_wire_format() {
        let new: NewAppointment = serde_json::from_str(
            r#"{"patient_id":"P0001","doctor_id":"D0001","date":"2024-01-10","time":"09:00","reason":"checkup"}"#,
        )
        .unwrap();
        assert_eq!(new.slot().time_key(), "09:00");
        assert!(new.notes.is_none());
    }
}
