//! Admission decision: does this pod get mutated?

use std::collections::BTreeMap;

use tracing::debug;

use podvault_common::annotations::{
    is_truthy, ANNOTATION_MUTATE, ANNOTATION_STATUS, STATUS_INJECTED,
};

/// Namespaces that are never mutated, whatever their pods request
pub const RESERVED_NAMESPACES: [&str; 2] = ["kube-system", "kube-public"];

/// Decide whether a pod requires mutation.
///
/// Total and side-effect free. Rules in order, first match wins:
/// reserved namespace skips; an `"injected"` completion marker skips
/// (the idempotency guard against reconciliation replays); a missing
/// mutation-request annotation skips; otherwise mutate only on a truthy
/// value.
pub fn mutation_required(namespace: &str, annotations: &BTreeMap<String, String>) -> bool {
    if RESERVED_NAMESPACES.contains(&namespace) {
        debug!(namespace, "Reserved namespace, skipping mutation");
        return false;
    }

    if annotations
        .get(ANNOTATION_STATUS)
        .is_some_and(|status| status.eq_ignore_ascii_case(STATUS_INJECTED))
    {
        debug!("Pod already marked injected, skipping mutation");
        return false;
    }

    match annotations.get(ANNOTATION_MUTATE) {
        Some(value) => is_truthy(value),
        None => false,
    }
}
