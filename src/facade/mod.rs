pub mod registry;

pub use registry::{Phase, Registry, RegistryStats};
