//! The dialogue state machine and its prompt templates.

pub mod context;
pub mod engine;
pub mod prompt;
