use thiserror::Error;

use super::types::EntityKind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: u64 },

    #[error("Registry is draining and no longer accepts requests")]
    Draining,

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl RegistryError {
    pub fn not_found(kind: EntityKind, id: u64) -> Self {
        Self::NotFound { kind, id }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
