//! SQLite storage layer.
//!
//! Persona records and index markers, backed by SQLite with WAL mode and
//! split read/write connection pools.

pub mod persona;
pub mod pool;
