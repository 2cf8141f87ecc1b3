//! Inventory error types

use crate::entity::EntityKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity {name} is a {found}, expected a {expected}")]
    KindMismatch {
        name: String,
        expected: EntityKind,
        found: EntityKind,
    },

    #[error("Cannot insert {0} into itself")]
    SelfContainment(String),

    #[error("Inventory file error: {0}")]
    StateError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InventoryError>;
