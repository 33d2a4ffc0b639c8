//! Mutating admission webhook for vault secret injection
//!
//! Intercepts pod CREATE requests and rewrites eligible pods to carry
//! the secret-delivery infrastructure: an init container that resolves
//! `vault://` references into files, memory-backed staging volumes
//! shared with every container, an optional privileged sidecar, and a
//! command override that routes the workload entrypoint through the
//! app launcher. Eligibility and behavior are controlled entirely by
//! `podvault.io/` annotations; the webhook marks each processed pod so
//! a replayed admission call is a no-op.

pub mod decision;
pub mod patch;
pub mod server;
