//! Persona-derived data cached across sessions.

pub mod summary;
