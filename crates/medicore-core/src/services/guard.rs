//! Lifecycle rules: allowed status transitions and destructive-operation checks.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ServiceError, ServiceResult};
use crate::models::{AppointmentStatus, AuditAction, Bill, BillStatus, Doctor, EntityKind};

/// A status-changing action on an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentAction {
    Confirm,
    Cancel,
    Complete,
}

impl AppointmentAction {
    pub const ALL: [AppointmentAction; 3] = [
        AppointmentAction::Confirm,
        AppointmentAction::Cancel,
        AppointmentAction::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentAction::Confirm => "confirm",
            AppointmentAction::Cancel => "cancel",
            AppointmentAction::Complete => "complete",
        }
    }

    /// Status the appointment ends in when the action succeeds.
    pub fn target(&self) -> AppointmentStatus {
        match self {
            AppointmentAction::Confirm => AppointmentStatus::Confirmed,
            AppointmentAction::Cancel => AppointmentStatus::Cancelled,
            AppointmentAction::Complete => AppointmentStatus::Completed,
        }
    }

    pub fn audit_action(&self) -> AuditAction {
        match self {
            AppointmentAction::Confirm => AuditAction::Confirm,
            AppointmentAction::Cancel => AuditAction::Cancel,
            AppointmentAction::Complete => AuditAction::Complete,
        }
    }
}

impl fmt::Display for AppointmentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve an appointment transition.
///
/// Returns the new status, or the reason the action is refused.
pub fn appointment_transition(
    from: AppointmentStatus,
    action: AppointmentAction,
) -> Result<AppointmentStatus, &'static str> {
    use AppointmentAction::*;
    use AppointmentStatus::*;

    match (from, action) {
        (Pending, Confirm) => Ok(Confirmed),
        (Confirmed, Confirm) => Err("appointment is already confirmed"),
        (Cancelled, Confirm) => Err("cannot confirm a cancelled appointment"),
        (Completed, Confirm) => Err("cannot confirm a completed appointment"),

        (Pending | Confirmed, Cancel) => Ok(Cancelled),
        (Cancelled, Cancel) => Err("appointment is already cancelled"),
        (Completed, Cancel) => Err("cannot cancel a completed appointment"),

        (Pending | Confirmed, Complete) => Ok(Completed),
        (Completed, Complete) => Err("appointment is already completed"),
        (Cancelled, Complete) => Err("cannot complete a cancelled appointment"),
    }
}

/// Guard an appointment action, mapping a refusal to `Conflict`.
pub fn ensure_appointment_transition(
    id: &str,
    from: AppointmentStatus,
    action: AppointmentAction,
) -> ServiceResult<AppointmentStatus> {
    appointment_transition(from, action).map_err(|reason| {
        tracing::warn!(appointment_id = %id, status = %from, %action, reason, "transition refused");
        ServiceError::Conflict(reason.to_string())
    })
}

/// Paid bills cannot be updated or deleted.
pub fn ensure_bill_mutable(bill: &Bill) -> ServiceResult<()> {
    if bill.is_paid() {
        tracing::warn!(bill_id = %bill.id, "attempt to modify a paid bill");
        return Err(ServiceError::Conflict(format!(
            "bill {} is paid and can no longer be modified",
            bill.id
        )));
    }
    Ok(())
}

/// A bill may be marked paid from any status except paid.
pub fn ensure_bill_payable(bill: &Bill) -> ServiceResult<()> {
    if bill.status == BillStatus::Paid {
        tracing::warn!(bill_id = %bill.id, "bill already paid");
        return Err(ServiceError::Conflict(format!("bill {} is already paid", bill.id)));
    }
    Ok(())
}

/// Only active doctors accept new bookings.
pub fn ensure_doctor_bookable(doctor: &Doctor) -> ServiceResult<()> {
    if !doctor.is_bookable() {
        tracing::warn!(doctor_id = %doctor.id, status = %doctor.status, "doctor not bookable");
        return Err(ServiceError::Conflict(format!(
            "doctor {} is {} and cannot take appointments",
            doctor.id, doctor.status
        )));
    }
    Ok(())
}

/// Refuse a delete while dependent records exist.
pub fn ensure_no_dependents(
    entity: EntityKind,
    id: &str,
    appointments: u64,
    bills: u64,
) -> ServiceResult<()> {
    if appointments > 0 || bills > 0 {
        tracing::warn!(%entity, %id, appointments, bills, "delete blocked by dependents");
        return Err(ServiceError::DependencyBlocked {
            entity,
            id: id.to_string(),
            appointments,
            bills,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewDoctor, DoctorStatus};
    use AppointmentAction::*;
    use AppointmentStatus::*;

    #[test]
    fn test_transition_table() {
        let expected = [
            (Pending, Confirm, Some(Confirmed)),
            (Confirmed, Confirm, None),
            (Cancelled, Confirm, None),
            (Completed, Confirm, None),
            (Pending, Cancel, Some(Cancelled)),
            (Confirmed, Cancel, Some(Cancelled)),
            (Cancelled, Cancel, None),
            (Completed, Cancel, None),
            (Pending, Complete, Some(Completed)),
            (Confirmed, Complete, Some(Completed)),
            (Completed, Complete, None),
            (Cancelled, Complete, None),
        ];
        assert_eq!(expected.len(), AppointmentStatus::ALL.len() * AppointmentAction::ALL.len());

        for (from, action, to) in expected {
            assert_eq!(
                appointment_transition(from, action).ok(),
                to,
                "{from} + {action}"
            );
        }
    }

    #[test]
    fn test_refusal_is_conflict() {
        let err = ensure_appointment_transition("A0001", Completed, Cancel).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(msg) if msg == "cannot cancel a completed appointment"));
    }

    #[test]
    fn test_successful_transition_targets_action_status() {
        for action in AppointmentAction::ALL {
            assert_eq!(appointment_transition(Pending, action), Ok(action.target()));
        }
    }

    #[test]
    fn test_dependents() {
        assert!(ensure_no_dependents(EntityKind::Doctor, "D0001", 0, 0).is_ok());
        assert!(matches!(
            ensure_no_dependents(EntityKind::Patient, "P0001", 0, 1),
            Err(ServiceError::DependencyBlocked { bills: 1, .. })
        ));
    }

    #[test]
    fn test_doctor_on_leave_not_bookable() {
        let mut doctor = Doctor::from_new(
            "D0001".into(),
            NewDoctor {
                name: "Dr. Rao".into(),
                specialization: "Cardiology".into(),
                phone: "222".into(),
                email: "rao@example.com".into(),
                experience: 3,
                qualification: "MD".into(),
                consultation_fee: "100".parse().unwrap(),
                status: Some(DoctorStatus::OnLeave),
                address: None,
            },
        );
        assert!(matches!(ensure_doctor_bookable(&doctor), Err(ServiceError::Conflict(_))));
        doctor.status = DoctorStatus::Active;
        assert!(ensure_doctor_bookable(&doctor).is_ok());
    }
}
