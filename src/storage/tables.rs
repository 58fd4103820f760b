use crate::core::{Doctor, EntityKind, MedicalTest, Patient, Role, Technician};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A value stored in one of the registry tables, keyed by its own id.
pub trait Stored: Clone + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> u64;

    fn table(tables: &Tables) -> &HashMap<u64, Self>;

    fn table_mut(tables: &mut Tables) -> &mut HashMap<u64, Self>;
}

/// The four id-keyed tables. Iteration order is unspecified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tables {
    pub patients: HashMap<u64, Patient>,
    pub doctors: HashMap<u64, Doctor>,
    pub technicians: HashMap<u64, Technician>,
    pub tests: HashMap<u64, MedicalTest>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub patients: usize,
    pub doctors: usize,
    pub technicians: usize,
    pub tests: usize,
}

/// A correction applied while normalizing tables loaded from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRepair {
    /// Entry stored under `key` moved to its own `id`.
    Rekeyed { kind: EntityKind, key: u64, id: u64 },
    /// Entry stored under `key` dropped because `id` was already taken in the same table.
    DuplicateId { kind: EntityKind, key: u64, id: u64 },
    /// Person `id` dropped from `kind` because `kept` already holds it.
    SharedPersonId { kind: EntityKind, id: u64, kept: EntityKind },
}

impl Tables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Stored>(&self, id: u64) -> Option<&T> {
        T::table(self).get(&id)
    }

    pub fn insert<T: Stored>(&mut self, value: T) {
        T::table_mut(self).insert(value.id(), value);
    }

    pub fn scan<T: Stored>(&self) -> impl Iterator<Item = &T> {
        T::table(self).values()
    }

    pub fn counts(&self) -> TableCounts {
        TableCounts {
            patients: self.patients.len(),
            doctors: self.doctors.len(),
            technicians: self.technicians.len(),
            tests: self.tests.len(),
        }
    }

    /// Largest person id carried by any role entity.
    pub fn max_person_id(&self) -> u64 {
        let patients = self.patients.values().map(Stored::id);
        let doctors = self.doctors.values().map(Stored::id);
        let technicians = self.technicians.values().map(Stored::id);
        patients.chain(doctors).chain(technicians).max().unwrap_or(0)
    }

    pub fn max_test_id(&self) -> u64 {
        self.tests.values().map(Stored::id).max().unwrap_or(0)
    }

    /// Make every entry keyed by its own id and every person id belong to
    /// one role table. Among role tables, patients win over doctors and
    /// doctors over technicians.
    pub fn normalize(&mut self) -> Vec<TableRepair> {
        let mut repairs = Vec::new();
        self.rekey::<Patient>(&mut repairs);
        self.rekey::<Doctor>(&mut repairs);
        self.rekey::<Technician>(&mut repairs);
        self.rekey::<MedicalTest>(&mut repairs);

        let mut owners: HashMap<u64, EntityKind> = self
            .patients
            .keys()
            .map(|id| (*id, EntityKind::Patient))
            .collect();
        retain_unclaimed(&mut self.doctors, &mut owners, &mut repairs);
        retain_unclaimed(&mut self.technicians, &mut owners, &mut repairs);

        repairs
    }

    fn rekey<T: Stored>(&mut self, repairs: &mut Vec<TableRepair>) {
        let table = T::table_mut(self);
        let mut misplaced: Vec<u64> = table
            .iter()
            .filter(|(key, item)| **key != item.id())
            .map(|(key, _)| *key)
            .collect();
        misplaced.sort_unstable();

        let moved: Vec<(u64, T)> = misplaced
            .into_iter()
            .filter_map(|key| table.remove(&key).map(|item| (key, item)))
            .collect();

        for (key, item) in moved {
            let id = item.id();
            if table.contains_key(&id) {
                repairs.push(TableRepair::DuplicateId { kind: T::KIND, key, id });
            } else {
                table.insert(id, item);
                repairs.push(TableRepair::Rekeyed { kind: T::KIND, key, id });
            }
        }
    }
}

fn retain_unclaimed<T: Stored>(
    table: &mut HashMap<u64, T>,
    owners: &mut HashMap<u64, EntityKind>,
    repairs: &mut Vec<TableRepair>,
) {
    let mut claimed = HashSet::new();
    for id in table.keys() {
        match owners.get(id) {
            Some(kept) => repairs.push(TableRepair::SharedPersonId {
                kind: T::KIND,
                id: *id,
                kept: *kept,
            }),
            None => {
                claimed.insert(*id);
            }
        }
    }
    table.retain(|id, _| claimed.contains(id));
    owners.extend(claimed.into_iter().map(|id| (id, T::KIND)));
}

macro_rules! stored_role {
    ($ty:ty, $kind:expr, $field:ident) => {
        impl Stored for $ty {
            const KIND: EntityKind = $kind;

            fn id(&self) -> u64 {
                self.person().id
            }

            fn table(tables: &Tables) -> &HashMap<u64, Self> {
                &tables.$field
            }

            fn table_mut(tables: &mut Tables) -> &mut HashMap<u64, Self> {
                &mut tables.$field
            }
        }
    };
}

stored_role!(Patient, EntityKind::Patient, patients);
stored_role!(Doctor, EntityKind::Doctor, doctors);
stored_role!(Technician, EntityKind::Technician, technicians);

impl Stored for MedicalTest {
    const KIND: EntityKind = EntityKind::Test;

    fn id(&self) -> u64 {
        self.id
    }

    fn table(tables: &Tables) -> &HashMap<u64, Self> {
        &tables.tests
    }

    fn table_mut(tables: &mut Tables) -> &mut HashMap<u64, Self> {
        &mut tables.tests
    }
}
