#![deny(missing_docs)]
//! mayday_core: shared building blocks (config, credentials, job model,
//! recurrence, logging).

/// Job configuration file loading (TOML sections -> string maps).
pub mod cfg;
/// Credential source backed by the process environment.
pub mod creds;
/// Load-time validation errors.
pub mod error;
/// Job definitions and typed action parameters.
pub mod job;
/// Tracing/log initialization helpers.
pub mod logx;
/// Recurrence calculator (intervals, firing window, jitter).
pub mod timespec;
