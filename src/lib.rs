// ============================================================================
// MedReg Library
// ============================================================================

pub mod config;
pub mod core;
pub mod facade;
pub mod storage;
pub mod web;

// Re-export main types for convenience
pub use self::config::RegistryConfig;
pub use self::core::{
    Doctor, EntityKind, MedicalTest, MissingReferences, NewMedicalTest, NewPerson, Parity, Patient,
    Person, RegistryError, Result, Technician, TestCreation,
};
pub use self::facade::{Phase, Registry, RegistryStats};
pub use self::storage::{JsonFileStore, MemoryStore, RegistrySnapshot, SnapshotStore};
pub use self::web::{AppState, build_router};
