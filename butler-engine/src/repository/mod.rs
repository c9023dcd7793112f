//! Repository Module
//!
//! Data access layer for the catalog. Every function takes a plain
//! connection so callers decide whether it runs inside a transaction.

pub mod definition;
pub mod file;
pub mod run;
pub mod task;

// Re-export for convenience
pub use definition as definition_repository;
pub use file as file_repository;
pub use run as run_repository;
pub use task as task_repository;

/// Error for a stored value that no longer maps onto a domain enum
pub(crate) fn decode_error(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::Decode(format!("unexpected value '{value}' in column {column}").into())
}
