use crate::core::{
    Doctor, EntityKind, MedicalTest, MissingReferences, NewMedicalTest, NewPerson, Parity, Patient,
    Person, PersonId, RegistryError, Result, Role, Technician, TestCreation,
};
use crate::storage::{
    Counter, IdAllocator, RegistrySnapshot, SnapshotStore, Stored, TableCounts, TableRepair, Tables,
};
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, error, info, warn};

// ============================================================================
// Lifecycle
// ============================================================================

/// Process lifecycle. Phases only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Starting,
    Serving,
    Draining,
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Starting => "starting",
            Phase::Serving => "serving",
            Phase::Draining => "draining",
            Phase::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub phase: Phase,
    pub counts: TableCounts,
    pub person_counter: u64,
    pub test_counter: u64,
}

// ============================================================================
// Registry State
// ============================================================================

/// Everything behind the lock: the tables, the counters and the phase.
/// Keeping the phase here means an operation admitted under the lock cannot
/// interleave with a drain.
struct RegistryState {
    tables: Tables,
    ids: IdAllocator,
    phase: Phase,
}

impl RegistryState {
    fn starting() -> Self {
        Self {
            tables: Tables::new(),
            ids: IdAllocator::new(),
            phase: Phase::Starting,
        }
    }

    fn restore(&mut self, snapshot: RegistrySnapshot) {
        let (mut tables, mut ids) = snapshot.into_parts();

        for repair in tables.normalize() {
            match repair {
                TableRepair::Rekeyed { kind, key, id } => {
                    warn!(%kind, key, id, "snapshot entry stored under a foreign key; re-keyed");
                }
                TableRepair::DuplicateId { kind, key, id } => {
                    warn!(%kind, key, id, "snapshot entry duplicates an existing id; dropped");
                }
                TableRepair::SharedPersonId { kind, id, kept } => {
                    warn!(%kind, id, %kept, "snapshot person holds more than one role; dropped");
                }
            }
        }

        let max_person = tables.max_person_id();
        if ids.ensure_at_least(Counter::Person, max_person) {
            warn!(max_person, "snapshot person counter behind stored ids; raised");
        }
        let max_test = tables.max_test_id();
        if ids.ensure_at_least(Counter::Test, max_test) {
            warn!(max_test, "snapshot test counter behind stored ids; raised");
        }

        self.tables = tables;
        self.ids = ids;
    }

    fn admit(&self) -> Result<()> {
        match self.phase {
            Phase::Serving => Ok(()),
            _ => Err(RegistryError::Draining),
        }
    }

    fn enter(&mut self, next: Phase) {
        if next > self.phase {
            info!(from = %self.phase, to = %next, "registry phase change");
            self.phase = next;
        }
    }

    fn capture(&self) -> RegistrySnapshot {
        RegistrySnapshot::new(self.tables.clone(), self.ids)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Shared handle to the in-memory registry.
///
/// Cloning is cheap; every clone refers to the same store. Reads share the
/// lock, writes take it exclusively for the whole validate-allocate-insert
/// sequence.
#[derive(Clone)]
pub struct Registry {
    state: Arc<RwLock<RegistryState>>,
    final_save: Arc<OnceCell<Result<()>>>,
}

impl Registry {
    /// An empty registry ready to serve.
    pub fn new() -> Self {
        let mut state = RegistryState::starting();
        state.enter(Phase::Serving);
        Self::from_state(state)
    }

    /// A registry restored from `snapshot`, ready to serve.
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let mut state = RegistryState::starting();
        state.restore(snapshot);
        state.enter(Phase::Serving);
        Self::from_state(state)
    }

    /// Load the registry from `store`. A missing or unreadable snapshot
    /// yields an empty registry.
    pub fn open(store: &dyn SnapshotStore) -> Self {
        let mut state = RegistryState::starting();
        match store.load() {
            Ok(Some(snapshot)) => {
                let counts = snapshot.counts();
                state.restore(snapshot);
                info!(
                    patients = counts.patients,
                    doctors = counts.doctors,
                    technicians = counts.technicians,
                    tests = counts.tests,
                    "snapshot loaded"
                );
            }
            Ok(None) => info!("no snapshot found, initializing empty registry"),
            Err(e) => {
                warn!(error = %e, "snapshot could not be loaded, initializing empty registry");
            }
        }
        state.enter(Phase::Serving);
        Self::from_state(state)
    }

    fn from_state(state: RegistryState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            final_save: Arc::new(OnceCell::new()),
        }
    }

    pub async fn phase(&self) -> Phase {
        self.state.read().await.phase
    }

    pub async fn stats(&self) -> RegistryStats {
        let state = self.state.read().await;
        RegistryStats {
            phase: state.phase,
            counts: state.tables.counts(),
            person_counter: state.ids.current(Counter::Person),
            test_counter: state.ids.current(Counter::Test),
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub async fn get<T: Stored>(&self, id: u64) -> Result<T> {
        let state = self.state.read().await;
        state.admit()?;
        state
            .tables
            .get::<T>(id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found(T::KIND, id))
    }

    /// All entities of one kind, in unspecified order. The result is taken
    /// under a single read lock.
    pub async fn list<T: Stored>(&self) -> Result<Vec<T>> {
        self.list_filtered(|_: &T| true).await
    }

    pub async fn list_filtered<T, F>(&self, predicate: F) -> Result<Vec<T>>
    where
        T: Stored,
        F: Fn(&T) -> bool,
    {
        let state = self.state.read().await;
        state.admit()?;
        let items: Vec<T> = state
            .tables
            .scan::<T>()
            .filter(|item| predicate(item))
            .cloned()
            .collect();
        debug!(kind = %T::KIND, count = items.len(), "listed");
        Ok(items)
    }

    pub async fn tests_by_parity(&self, parity: Parity) -> Result<Vec<MedicalTest>> {
        self.list_filtered(|test: &MedicalTest| parity.matches(test.id))
            .await
    }

    /// Tests whose patient copy carries `patient_id`. Unknown patients simply
    /// have no tests.
    pub async fn tests_for_patient(&self, patient_id: PersonId) -> Result<Vec<MedicalTest>> {
        self.list_filtered(|test: &MedicalTest| test.patient.person.id == patient_id)
            .await
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Register a person under role `R` with a freshly allocated id.
    pub async fn create_person<R>(&self, fields: NewPerson) -> Result<R>
    where
        R: Role + Stored,
    {
        let mut state = self.state.write().await;
        state.admit()?;
        let id = state.ids.next(Counter::Person);
        let record = R::from_person(Person::assign(id, fields));
        state.tables.insert(record.clone());
        info!(kind = %R::KIND, id, name = %record.person().name, "person registered");
        Ok(record)
    }

    /// Create a test after resolving all three references. Validation and
    /// insertion happen under one exclusive lock; a rejected request leaves
    /// the tables and the test counter untouched.
    pub async fn create_test(&self, request: NewMedicalTest) -> Result<TestCreation> {
        let mut state = self.state.write().await;
        state.admit()?;

        let doctor = state.tables.get::<Doctor>(request.doctor).cloned();
        let technician = state.tables.get::<Technician>(request.technician).cloned();
        let patient = state.tables.get::<Patient>(request.patient).cloned();

        let (Some(doctor), Some(technician), Some(patient)) = (doctor, technician, patient) else {
            let missing = missing_references(&state.tables, &request);
            warn!(
                doctor = request.doctor,
                patient = request.patient,
                technician = request.technician,
                %missing,
                "test rejected"
            );
            return Ok(TestCreation::Rejected(missing));
        };

        let id = state.ids.next(Counter::Test);
        let test = MedicalTest {
            id,
            doctor,
            patient,
            technician,
            results: request.results,
            created_at: Utc::now(),
        };
        state.tables.insert(test.clone());
        info!(
            id,
            doctor = request.doctor,
            patient = request.patient,
            technician = request.technician,
            results = test.results.len(),
            "test created"
        );
        Ok(TestCreation::Created(test))
    }

    // ------------------------------------------------------------------------
    // Snapshots and shutdown
    // ------------------------------------------------------------------------

    /// A consistent copy of the whole registry. No write is partially
    /// reflected.
    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.state.read().await.capture()
    }

    /// Stop admitting requests. Waits for every in-flight read and write to
    /// release the lock first.
    pub async fn drain(&self) -> Phase {
        let mut state = self.state.write().await;
        state.enter(Phase::Draining);
        state.phase
    }

    /// Drain, write the final snapshot to `store` and terminate. The save
    /// happens once per registry: concurrent and later callers wait for the
    /// first shutdown and receive its outcome. A save failure is logged and
    /// returned; the registry terminates either way.
    pub async fn shutdown(&self, store: Arc<dyn SnapshotStore>) -> Result<()> {
        if self.final_save.initialized() {
            debug!("shutdown requested after termination; reusing final save outcome");
        }
        self.final_save
            .get_or_init(|| self.save_and_terminate(store))
            .await
            .clone()
    }

    async fn save_and_terminate(&self, store: Arc<dyn SnapshotStore>) -> Result<()> {
        let snapshot = {
            let mut state = self.state.write().await;
            state.enter(Phase::Draining);
            state.capture()
        };
        let counts = snapshot.counts();

        // fsync and rename block; keep them off the async workers.
        let result = tokio::task::spawn_blocking(move || store.save(&snapshot))
            .await
            .unwrap_or_else(|e| Err(RegistryError::persistence(format!("snapshot task failed: {e}"))));
        match &result {
            Ok(()) => info!(
                patients = counts.patients,
                doctors = counts.doctors,
                technicians = counts.technicians,
                tests = counts.tests,
                "snapshot saved"
            ),
            Err(e) => error!(error = %e, "failed to save snapshot"),
        }

        self.state.write().await.enter(Phase::Terminated);
        result
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Missing kinds in doctor, technician, patient order.
fn missing_references(tables: &Tables, request: &NewMedicalTest) -> MissingReferences {
    let mut kinds = Vec::new();
    if tables.get::<Doctor>(request.doctor).is_none() {
        kinds.push(EntityKind::Doctor);
    }
    if tables.get::<Technician>(request.technician).is_none() {
        kinds.push(EntityKind::Technician);
    }
    if tables.get::<Patient>(request.patient).is_none() {
        kinds.push(EntityKind::Patient);
    }
    MissingReferences { kinds }
}
