//! Live dialogue sessions keyed by (thread, persona).

pub mod registry;
