pub mod error;
pub mod types;

pub use error::{RegistryError, Result};
pub use types::{
    Doctor, EntityKind, MedicalTest, MissingReferences, NewMedicalTest, NewPerson, Parity, Patient,
    Person, PersonId, Role, Technician, TestCreation, TestId, TestResults,
};
