//! Shared domain types for Personae.
//!
//! This crate contains the core domain types used across the workspace:
//! Persona, ReferenceChunk, ConversationState, engine configuration, and
//! their associated error types.
//!
//! Zero infrastructure dependencies -- only serde and thiserror.

pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod persona;
pub mod reference;
