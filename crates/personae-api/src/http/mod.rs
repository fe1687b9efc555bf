//! HTTP layer for Personae.
//!
//! Axum routes for streaming chat, session history and persona lookup.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
