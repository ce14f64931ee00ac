//! Double-booking protection and booking against concurrent deletes,
//! sequential and across connections.

use std::sync::{Arc, Barrier};
use std::thread;

use medicore_core::models::{
    parse_date, parse_time, AppointmentPatch, Gender, NewAppointment, NewDoctor, NewPatient,
};
use medicore_core::{
    AppointmentService, Database, DoctorService, ErrorKind, PatientService, ServiceError,
};
use rust_decimal::Decimal;

fn seed(db: &Database) {
    PatientService::new(db)
        .create(NewPatient::new("A", 30, Gender::Male, "111"))
        .unwrap();
    PatientService::new(db)
        .create(NewPatient::new("B", 31, Gender::Female, "112"))
        .unwrap();
    DoctorService::new(db)
        .create(NewDoctor {
            name: "Dr. Okafor".to_string(),
            specialization: "Dermatology".to_string(),
            phone: "222".to_string(),
            email: "okafor@example.com".to_string(),
            experience: 8,
            qualification: "MD".to_string(),
            consultation_fee: Decimal::new(30000, 2),
            status: None,
            address: None,
        })
        .unwrap();
}

fn booking(patient_id: &str, time: &str) -> NewAppointment {
    NewAppointment {
        patient_id: patient_id.to_string(),
        doctor_id: "D0001".to_string(),
        date: parse_date("2024-03-04").unwrap(),
        time: parse_time(time).unwrap(),
        reason: "rash".to_string(),
        notes: None,
    }
}

#[test]
fn test_sequential_double_booking() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);
    let service = AppointmentService::new(&db);

    service.create(booking("P0001", "14:30")).unwrap();
    let err = service.create(booking("P0002", "14:30")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.to_string().contains("A0001"));

    // Completing frees the slot
    service.complete("A0001").unwrap();
    assert!(service.create(booking("P0002", "14:30")).is_ok());
}

#[test]
fn test_reschedule_into_taken_slot() {
    let db = Database::open_in_memory().unwrap();
    seed(&db);
    let service = AppointmentService::new(&db);
    service.create(booking("P0001", "14:30")).unwrap();
    service.create(booking("P0002", "15:00")).unwrap();

    let err = service
        .update(
            "A0002",
            AppointmentPatch {
                time: Some(parse_time("14:30").unwrap()),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    // A cancelled appointment may be moved anywhere, it holds no slot
    service.cancel("A0002").unwrap();
    let moved = service
        .update(
            "A0002",
            AppointmentPatch {
                time: Some(parse_time("14:30").unwrap()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(moved.time, parse_time("14:30").unwrap());
}

#[test]
fn test_concurrent_double_booking() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("medicore.db");
    seed(&Database::open(&path).unwrap());

    for (round, time) in ["08:00", "08:15", "08:30", "08:45", "09:00"].iter().enumerate() {
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = ["P0001", "P0002"]
            .into_iter()
            .map(|patient_id| {
                let db = Database::open(&path).unwrap();
                let barrier = Arc::clone(&barrier);
                let new = booking(patient_id, time);
                thread::spawn(move || {
                    barrier.wait();
                    AppointmentService::new(&db)
                        .create(new)
                        .map(|a| a.id)
                        .map_err(|e| e.kind())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let booked = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| **r == Err(ErrorKind::Conflict))
            .count();
        assert_eq!((booked, conflicts), (1, 1), "round {round}: {results:?}");
    }

    let db = Database::open(&path).unwrap();
    let day = AppointmentService::new(&db)
        .on_date(parse_date("2024-03-04").unwrap())
        .unwrap();
    assert_eq!(day.len(), 5);
    assert!(db.verify_audit_chain().unwrap().is_intact());
}

#[test]
fn test_booking_races_patient_delete() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("medicore.db");
    seed(&Database::open(&path).unwrap());

    for round in 0..20u32 {
        let patient_id = PatientService::new(&Database::open(&path).unwrap())
            .create(NewPatient::new("C", 40, Gender::Other, format!("9{round:03}")))
            .unwrap()
            .id;
        let time = format!("{:02}:{:02}", 10 + round / 4, (round % 4) * 15);
        let barrier = Arc::new(Barrier::new(2));

        let deleter = {
            let db = Database::open(&path).unwrap();
            let barrier = Arc::clone(&barrier);
            let patient_id = patient_id.clone();
            thread::spawn(move || {
                barrier.wait();
                PatientService::new(&db)
                    .delete(&patient_id)
                    .map_err(|e| e.kind())
            })
        };
        let booker = {
            let db = Database::open(&path).unwrap();
            let barrier = Arc::clone(&barrier);
            let new = booking(&patient_id, &time);
            thread::spawn(move || {
                barrier.wait();
                AppointmentService::new(&db)
                    .create(new)
                    .map(|a| a.id)
                    .map_err(|e| e.kind())
            })
        };

        let deleted = deleter.join().unwrap();
        let booked = booker.join().unwrap();
        let db = Database::open(&path).unwrap();
        match (&deleted, &booked) {
            (Ok(()), Err(ErrorKind::NotFound)) => {
                assert!(db.get_patient(&patient_id).unwrap().is_none());
            }
            (Err(ErrorKind::DependencyBlocked), Ok(appointment_id)) => {
                let appointment = db.get_appointment(appointment_id).unwrap().unwrap();
                assert_eq!(appointment.patient_id, patient_id);
                assert!(db.get_patient(&patient_id).unwrap().is_some());
            }
            other => panic!("round {round}: unexpected outcome {other:?}"),
        }
    }

    assert!(Database::open(&path)
        .unwrap()
        .verify_audit_chain()
        .unwrap()
        .is_intact());
}
