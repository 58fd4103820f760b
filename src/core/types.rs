use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type PersonId = u64;
pub type TestId = u64;

/// Named test results as submitted by the technician (e.g. "glucose" -> "5.4").
pub type TestResults = BTreeMap<String, String>;

// ============================================================================
// Entity kinds
// ============================================================================

/// The four tables held by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Patient,
    Doctor,
    Technician,
    Test,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Patient => "patient",
            EntityKind::Doctor => "doctor",
            EntityKind::Technician => "technician",
            EntityKind::Test => "test",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// People
// ============================================================================

/// Person payload submitted by callers. It has no id: ids are only ever
/// assigned by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPerson {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl NewPerson {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn birth_date(mut self, birth_date: NaiveDate) -> Self {
        self.birth_date = Some(birth_date);
        self
    }

    pub fn phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Person {
    pub(crate) fn assign(id: PersonId, fields: NewPerson) -> Self {
        Self {
            id,
            name: fields.name,
            birth_date: fields.birth_date,
            phone: fields.phone,
        }
    }
}

/// A person stored under one of the role tables. The role is the table, not
/// a field on the person.
pub trait Role: Clone + Send + Sync + 'static {
    fn from_person(person: Person) -> Self;

    fn person(&self) -> &Person;
}

macro_rules! role_record {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            pub person: Person,
        }

        impl Role for $name {
            fn from_person(person: Person) -> Self {
                Self { person }
            }

            fn person(&self) -> &Person {
                &self.person
            }
        }
    };
}

role_record!(Patient);
role_record!(Doctor);
role_record!(
    /// Submits test results on behalf of a doctor and a patient.
    Technician
);

// ============================================================================
// Medical tests
// ============================================================================

/// A test result linking a doctor, a patient and a technician. The three
/// parties are copies taken at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalTest {
    pub id: TestId,
    pub doctor: Doctor,
    pub patient: Patient,
    pub technician: Technician,
    #[serde(default)]
    pub results: TestResults,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

/// Test submission: three person references plus the results payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMedicalTest {
    pub doctor: PersonId,
    pub patient: PersonId,
    pub technician: PersonId,
    #[serde(default)]
    pub results: TestResults,
}

impl NewMedicalTest {
    pub fn new(doctor: PersonId, patient: PersonId, technician: PersonId) -> Self {
        Self {
            doctor,
            patient,
            technician,
            results: TestResults::new(),
        }
    }

    pub fn result(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.results.insert(name.into(), value.into());
        self
    }
}

/// Every reference kind that failed to resolve during test creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingReferences {
    pub kinds: Vec<EntityKind>,
}

impl MissingReferences {
    pub fn contains(&self, kind: EntityKind) -> bool {
        self.kinds.contains(&kind)
    }
}

impl fmt::Display for MissingReferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.kinds.iter().map(EntityKind::as_str).collect();
        write!(f, "Cannot find: {}", names.join(", "))
    }
}

/// Outcome of a test submission. A rejection is a routine result, not an
/// error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestCreation {
    Created(MedicalTest),
    Rejected(MissingReferences),
}

impl TestCreation {
    pub fn status(&self) -> String {
        match self {
            TestCreation::Created(_) => "Created".to_string(),
            TestCreation::Rejected(missing) => missing.to_string(),
        }
    }

    pub fn created(self) -> Option<MedicalTest> {
        match self {
            TestCreation::Created(test) => Some(test),
            TestCreation::Rejected(_) => None,
        }
    }
}

/// Test id parity filter used by the doctor-facing query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    Even,
    Odd,
}

impl Parity {
    pub fn from_is_even(is_even: bool) -> Self {
        if is_even { Parity::Even } else { Parity::Odd }
    }

    pub fn matches(&self, id: TestId) -> bool {
        match self {
            Parity::Even => id % 2 == 0,
            Parity::Odd => id % 2 == 1,
        }
    }
}
