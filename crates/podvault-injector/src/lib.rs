//! Vault secret injector
//!
//! Runs inside a workload pod (as an init container or sidecar),
//! scans its own environment for `vault://` references, resolves each
//! one against the vault tenant, and stages the values as files for
//! the launcher to fold back into the application's environment.

pub mod client;
pub mod config;
pub mod error;
pub mod resolver;
