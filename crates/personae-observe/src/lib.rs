//! Observability setup for Personae: structured logging with optional
//! OpenTelemetry span export.

pub mod tracing_setup;
