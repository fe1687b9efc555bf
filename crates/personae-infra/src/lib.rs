//! Infrastructure layer for Personae.
//!
//! Implements the ports defined in `personae-core`: SQLite persona storage
//! and index markers, LanceDB and in-memory reference stores, the HTTP
//! embedding client, and the OpenAI-compatible generation provider.

pub mod config;
pub mod llm;
pub mod sqlite;
pub mod vector;
