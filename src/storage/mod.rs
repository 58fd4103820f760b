pub mod allocator;
pub mod persistence;
pub mod tables;

pub use allocator::{Counter, IdAllocator};
pub use persistence::{JsonFileStore, MemoryStore, RegistrySnapshot, SnapshotStore};
pub use tables::{Stored, TableCounts, TableRepair, Tables};
