//! Whole-registry snapshot persistence

use crate::core::{
    Doctor, MedicalTest, Patient, PersonId, RegistryError, Result, Technician, TestId,
};
use crate::storage::allocator::{Counter, IdAllocator};
use crate::storage::tables::{TableCounts, Tables};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const SNAPSHOT_VERSION: u32 = 1;

// ============================================================================
// Registry Snapshot
// ============================================================================

/// Complete serialized copy of the registry: four tables and both counters.
///
/// Every field has a default and unknown fields are ignored, so documents
/// written by newer builds still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub patients: HashMap<PersonId, Patient>,
    #[serde(default)]
    pub doctors: HashMap<PersonId, Doctor>,
    #[serde(default)]
    pub technicians: HashMap<PersonId, Technician>,
    #[serde(default)]
    pub tests: HashMap<TestId, MedicalTest>,
    #[serde(default)]
    pub person_counter: PersonId,
    #[serde(default)]
    pub test_counter: TestId,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl RegistrySnapshot {
    pub fn new(tables: Tables, ids: IdAllocator) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            patients: tables.patients,
            doctors: tables.doctors,
            technicians: tables.technicians,
            tests: tables.tests,
            person_counter: ids.current(Counter::Person),
            test_counter: ids.current(Counter::Test),
        }
    }

    pub fn empty() -> Self {
        Self::new(Tables::new(), IdAllocator::new())
    }

    pub fn into_parts(self) -> (Tables, IdAllocator) {
        let tables = Tables {
            patients: self.patients,
            doctors: self.doctors,
            technicians: self.technicians,
            tests: self.tests,
        };
        (tables, IdAllocator::restore(self.person_counter, self.test_counter))
    }

    pub fn counts(&self) -> TableCounts {
        TableCounts {
            patients: self.patients.len(),
            doctors: self.doctors.len(),
            technicians: self.technicians.len(),
            tests: self.tests.len(),
        }
    }

    /// Equality of content, ignoring when the snapshot was taken.
    pub fn same_content(&self, other: &RegistrySnapshot) -> bool {
        self.patients == other.patients
            && self.doctors == other.doctors
            && self.technicians == other.technicians
            && self.tests == other.tests
            && self.person_counter == other.person_counter
            && self.test_counter == other.test_counter
    }
}

// ============================================================================
// Snapshot Stores
// ============================================================================

/// Durable home of the registry snapshot.
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when no snapshot has been written yet.
    fn load(&self) -> Result<Option<RegistrySnapshot>>;

    fn save(&self, snapshot: &RegistrySnapshot) -> Result<()>;
}

/// Stores the snapshot as a single JSON document.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Result<Option<RegistrySnapshot>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RegistryError::persistence(format!(
                    "Failed to read snapshot {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };
        let snapshot = serde_json::from_slice(&data).map_err(|e| {
            RegistryError::persistence(format!(
                "Failed to parse snapshot {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| {
            RegistryError::persistence(format!("Failed to create snapshot directory: {}", e))
        })?;

        // Written next to the target so the final rename stays on one filesystem.
        let mut temp = NamedTempFile::new_in(&dir)
            .map_err(|e| RegistryError::persistence(format!("Failed to create temp file: {}", e)))?;
        serde_json::to_writer(&mut temp, snapshot)
            .map_err(|e| RegistryError::persistence(format!("Failed to serialize snapshot: {}", e)))?;
        temp.flush()
            .map_err(|e| RegistryError::persistence(format!("Failed to flush snapshot: {}", e)))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| RegistryError::persistence(format!("Failed to sync snapshot: {}", e)))?;
        temp.persist(&self.path).map_err(|e| {
            RegistryError::persistence(format!("Failed to replace snapshot: {}", e.error))
        })?;
        Ok(())
    }
}

/// Keeps the last saved snapshot in memory. Useful when durability is not
/// wanted.
#[derive(Default)]
pub struct MemoryStore {
    slot: std::sync::Mutex<Option<RegistrySnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: RegistrySnapshot) -> Self {
        Self {
            slot: std::sync::Mutex::new(Some(snapshot)),
        }
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> Result<Option<RegistrySnapshot>> {
        let slot = self
            .slot
            .lock()
            .map_err(|e| RegistryError::persistence(e.to_string()))?;
        Ok(slot.clone())
    }

    fn save(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|e| RegistryError::persistence(e.to_string()))?;
        *slot = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NewPerson, Patient, Person, Role};
    use tempfile::TempDir;

    fn sample_snapshot() -> RegistrySnapshot {
        let mut tables = Tables::new();
        tables.insert(Patient::from_person(Person::assign(1, NewPerson::new("Alice"))));
        RegistrySnapshot::new(tables, IdAllocator::restore(1, 0))
    }

    #[test]
    fn test_snapshot_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("db.json"));
        let snapshot = sample_snapshot();

        store.save(&snapshot).unwrap();
        assert!(store.exists());

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.counts().patients, 1);
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("absent.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.json");
        fs::write(&path, b"{ not json").unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, RegistryError::Persistence(_)));
    }

    #[test]
    fn test_load_tolerates_unknown_and_missing_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.json");
        fs::write(
            &path,
            br#"{
                "patients": {"4": {"person": {"id": 4, "name": "Dana", "blood_type": "O+"}}},
                "person_counter": 4,
                "ward": "north"
            }"#,
        )
        .unwrap();

        let loaded = JsonFileStore::new(&path).load().unwrap().unwrap();
        assert_eq!(loaded.version, SNAPSHOT_VERSION);
        assert_eq!(loaded.patients[&4].person.name, "Dana");
        assert!(loaded.tests.is_empty());

        let (tables, ids) = loaded.into_parts();
        assert_eq!(tables.counts().patients, 1);
        assert_eq!(ids, IdAllocator::restore(4, 0));
    }

    #[test]
    fn test_save_replaces_previous_snapshot_without_leftovers() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("db.json"));

        store.save(&RegistrySnapshot::empty()).unwrap();
        store.save(&sample_snapshot()).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.counts().patients, 1);

        let entries = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&sample_snapshot()).unwrap();
        assert_eq!(store.load().unwrap().unwrap().counts().patients, 1);
    }
}
