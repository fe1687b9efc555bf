//! Dialogue engine and repository trait definitions for Personae.
//!
//! This crate defines the "ports" (repository, provider, embedder and vector
//! store traits) that the infrastructure layer implements, and all of the
//! dialogue logic built on them. It depends only on `personae-types` --
//! never on `personae-infra` or any database/IO crate.

pub mod chat;
pub mod dialogue;
pub mod llm;
pub mod persona;
pub mod rag;
pub mod repository;
pub mod session;
pub mod streaming;

#[cfg(test)]
pub(crate) mod testing;
