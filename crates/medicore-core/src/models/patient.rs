//! Patient models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::InvalidValue;

/// Patient gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub const ALL: [Gender; 3] = [Gender::Male, Gender::Female, Gender::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl FromStr for Gender {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Male" => Ok(Gender::Male),
            "Female" => Ok(Gender::Female),
            "Other" => Ok(Gender::Other),
            _ => Err(InvalidValue::new("gender", s)),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ABO/Rh blood group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BloodGroup {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
}

impl BloodGroup {
    pub const ALL: [BloodGroup; 8] = [
        BloodGroup::APositive,
        BloodGroup::ANegative,
        BloodGroup::BPositive,
        BloodGroup::BNegative,
        BloodGroup::AbPositive,
        BloodGroup::AbNegative,
        BloodGroup::OPositive,
        BloodGroup::ONegative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BloodGroup::APositive => "A+",
            BloodGroup::ANegative => "A-",
            BloodGroup::BPositive => "B+",
            BloodGroup::BNegative => "B-",
            BloodGroup::AbPositive => "AB+",
            BloodGroup::AbNegative => "AB-",
            BloodGroup::OPositive => "O+",
            BloodGroup::ONegative => "O-",
        }
    }
}

impl FromStr for BloodGroup {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BloodGroup::ALL
            .into_iter()
            .find(|bg| bg.as_str() == s)
            .ok_or_else(|| InvalidValue::new("blood group", s))
    }
}

impl fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Sequential identifier (`P0001`)
    pub id: String,
    pub name: String,
    pub age: u32,
    pub gender: Gender,
    /// Unique across patients
    pub phone: String,
    pub email: Option<String>,
    pub blood_group: Option<BloodGroup>,
    pub address: Option<String>,
    /// Free-text medical history
    pub medical_history: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields accepted when registering a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPatient {
    pub name: String,
    pub age: u32,
    pub gender: Gender,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub blood_group: Option<BloodGroup>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub medical_history: Option<String>,
}

impl NewPatient {
    /// Create with the required fields only.
    pub fn new(name: impl Into<String>, age: u32, gender: Gender, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age,
            gender,
            phone: phone.into(),
            email: None,
            blood_group: None,
            address: None,
            medical_history: None,
        }
    }
}

/// Partial update of a patient. `id` and `created_at` are not updatable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatientPatch {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub blood_group: Option<BloodGroup>,
    pub address: Option<String>,
    pub medical_history: Option<String>,
}

impl PatientPatch {
    /// Apply the set fields onto `patient`.
    pub fn apply_to(self, patient: &mut Patient) {
        if let Some(name) = self.name {
            patient.name = name;
        }
        if let Some(age) = self.age {
            patient.age = age;
        }
        if let Some(gender) = self.gender {
            patient.gender = gender;
        }
        if let Some(phone) = self.phone {
            patient.phone = phone;
        }
        if self.email.is_some() {
            patient.email = self.email;
        }
        if self.blood_group.is_some() {
            patient.blood_group = self.blood_group;
        }
        if self.address.is_some() {
            patient.address = self.address;
        }
        if self.medical_history.is_some() {
            patient.medical_history = self.medical_history;
        }
    }
}

impl Patient {
    /// Build a patient record from registration fields.
    pub fn from_new(id: String, new: NewPatient) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            name: new.name,
            age: new.age,
            gender: new.gender,
            phone: new.phone,
            email: new.email,
            blood_group: new.blood_group,
            address: new.address,
            medical_history: new.medical_history,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Touch the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

/// Listing filter for patients.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatientFilter {
    /// Case-insensitive substring over name, id, phone and email
    pub search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blood_group_round_trips_through_str() {
        for bg in BloodGroup::ALL {
            assert_eq!(bg.as_str().parse::<BloodGroup>().unwrap(), bg);
        }
        assert!("C+".parse::<BloodGroup>().is_err());
    }

    #[test]
    fn test_blood_group_serde_names() {
        let json = serde_json::to_string(&BloodGroup::AbNegative).unwrap();
        assert_eq!(json, "\"AB-\"");
    }

    #[test]
    fn test_patch_leaves_unset_fields() {
        let mut patient = Patient::from_new(
            "P0001".into(),
            NewPatient::new("Asha", 30, Gender::Female, "111"),
        );
        let patch = PatientPatch {
            age: Some(31),
            email: Some("asha@example.com".into()),
            ..Default::default()
        };
        patch.apply_to(&mut patient);

        assert_eq!(patient.id, "P0001");
        assert_eq!(patient.name, "Asha");
        assert_eq!(patient.age, 31);
        assert_eq!(patient.phone, "111");
        assert_eq!(patient.email.as_deref(), Some("asha@example.com"));
    }

    #[test]
    fn test_new_patient_deserializes_with_optional_fields_missing() {
        let new: NewPatient =
            serde_json::from_str(r#"{"name":"A","age":30,"gender":"Male","phone":"111"}"#).unwrap();
        assert_eq!(new, NewPatient::new("A", 30, Gender::Male, "111"));
    }
}
