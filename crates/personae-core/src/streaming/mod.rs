//! Streaming protocol: filtered, ordered answer fragments.

pub mod exchange;
pub mod filter;
