//! Transport-facing chat operations.

pub mod service;
