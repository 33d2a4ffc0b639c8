//! Patch synthesis for eligible pods
//!
//! Produces the ordered JSON patch that rewrites a pod to carry the
//! secret-delivery infrastructure. The pod snapshot is never mutated;
//! every operation is derived independently from it, so synthesis is
//! referentially transparent and can run on any number of concurrent
//! admission requests.
//!
//! Operation order is a correctness requirement: container-index paths
//! emitted by the command-mutation step refer to the snapshot's
//! containers, so the sidecar append and the completion marker come
//! after it, and the marker is always last so a successfully applied
//! patch leaves the pod flagged as processed.

use std::collections::BTreeMap;

use json_patch::{AddOperation, PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, Pod, SecretVolumeSource, SecurityContext, Volume,
    VolumeMount,
};
use serde::Serialize;
use tracing::debug;

use podvault_common::annotations::{
    injected_env, ANNOTATION_APP_LAUNCHER, ANNOTATION_INIT_CONTAINER, ANNOTATION_INIT_IMAGE,
    ANNOTATION_OAUTH_SECRET_NAME, ANNOTATION_SIDECAR_CONTAINER, ANNOTATION_SIDECAR_IMAGE,
    ANNOTATION_STATUS, STATUS_INJECTED,
};
use podvault_common::{
    BIN_PATH, BIN_VOLUME_NAME, CMD_HINT_ENV, DEFAULT_INIT_IMAGE, DEFAULT_SIDECAR_IMAGE,
    ENTRYPOINT_HINT_ENV, INIT_CONTAINER_NAME, OAUTH_TOKEN_PATH, OAUTH_TOKEN_VOLUME_NAME,
    SECRETS_PATH, SECRET_VOLUME_NAME, SIDECAR_CONTAINER_NAME,
};

/// Synthesize the full patch sequence for an eligible pod.
///
/// Called only after [`crate::decision::mutation_required`] returned
/// true. Fixed order: init container, shared volumes, staging mounts on
/// every existing container, optional OAuth secret volume, command
/// mutation, optional sidecar, completion marker.
pub fn synthesize(pod: &Pod) -> Vec<PatchOperation> {
    let annotations = pod
        .metadata
        .annotations
        .clone()
        .unwrap_or_default();
    let spec = pod.spec.as_ref();
    let containers: &[Container] = spec.map(|s| s.containers.as_slice()).unwrap_or_default();
    let init_containers: &[Container] = spec
        .and_then(|s| s.init_containers.as_deref())
        .unwrap_or_default();
    let existing_volumes = spec
        .and_then(|s| s.volumes.as_ref())
        .map_or(0, Vec::len);

    let env_vars = env_var_list(&injected_env(&annotations));
    let mut ops = Vec::new();

    // 1. Init container, unless explicitly disabled. Even a pod with no
    // vault references needs it to stage the launcher binary.
    let init_disabled = annotations
        .get(ANNOTATION_INIT_CONTAINER)
        .is_some_and(|v| v.eq_ignore_ascii_case("no"));
    if !init_disabled {
        let image = annotations
            .get(ANNOTATION_INIT_IMAGE)
            .filter(|v| !v.is_empty())
            .map_or(DEFAULT_INIT_IMAGE, String::as_str);
        let init = injected_container(INIT_CONTAINER_NAME, image, env_vars.clone(), false);
        ops.extend(append_array(
            init_containers.len(),
            &[init],
            PointerBuf::from_tokens(["spec", "initContainers"]),
        ));
    }

    // 2. Shared staging volumes. Track the effective length of
    // /spec/volumes so the later OAuth volume never re-emits a
    // whole-array add over elements appended in this pass.
    let mut volumes_len = existing_volumes;
    let staging = [
        memory_volume(SECRET_VOLUME_NAME),
        memory_volume(BIN_VOLUME_NAME),
    ];
    ops.extend(append_array(
        volumes_len,
        &staging,
        PointerBuf::from_tokens(["spec", "volumes"]),
    ));
    volumes_len += staging.len();

    // 3. Staging mounts on every existing container, so any of them can
    // read injected secrets or the staged launcher binary.
    for (index, container) in containers.iter().enumerate() {
        let mounts = [
            volume_mount(SECRET_VOLUME_NAME, SECRETS_PATH, false),
            volume_mount(BIN_VOLUME_NAME, BIN_PATH, false),
        ];
        let existing = container.volume_mounts.as_ref().map_or(0, Vec::len);
        ops.extend(append_array(
            existing,
            &mounts,
            container_field_path(index, "volumeMounts"),
        ));
    }

    // 4. Optional externally-sourced secret volume seeding the OAuth
    // bootstrap token. Mounted by the injected containers only.
    if let Some(secret_name) = annotations
        .get(ANNOTATION_OAUTH_SECRET_NAME)
        .filter(|v| !v.is_empty())
    {
        let volume = Volume {
            name: secret_name.clone(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(secret_name.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };
        ops.extend(append_array(
            volumes_len,
            &[volume],
            PointerBuf::from_tokens(["spec", "volumes"]),
        ));
    }

    // 5. Command mutation: route every container's entrypoint through
    // the launcher so resolved secrets land in the process environment.
    if let Some(launcher) = annotations
        .get(ANNOTATION_APP_LAUNCHER)
        .filter(|v| !v.is_empty())
    {
        for (index, container) in containers.iter().enumerate() {
            let mut command = vec![launcher.clone()];
            command.extend(derived_argv(container));
            debug!(container = %container.name, ?command, "Overriding container command");
            let path = container_field_path(index, "command");
            let value = serde_json::to_value(&command).unwrap_or_default();
            // `command` is a scalar-valued field, not a growable list:
            // the whole array is set in one operation. JSON Patch
            // `replace` requires an existing target, so a container
            // without a declared command takes an upserting `add`.
            let has_command = container.command.as_ref().is_some_and(|c| !c.is_empty());
            ops.push(if has_command {
                PatchOperation::Replace(ReplaceOperation { path, value })
            } else {
                PatchOperation::Add(AddOperation { path, value })
            });
        }
    }

    // 6. Optional privileged sidecar. Appended after command mutation so
    // snapshot container indices stay valid, and never wrapped itself.
    let sidecar_requested = annotations
        .get(ANNOTATION_SIDECAR_CONTAINER)
        .is_some_and(|v| v.eq_ignore_ascii_case("yes"));
    if sidecar_requested {
        let image = annotations
            .get(ANNOTATION_SIDECAR_IMAGE)
            .filter(|v| !v.is_empty())
            .map_or(DEFAULT_SIDECAR_IMAGE, String::as_str);
        let sidecar = injected_container(SIDECAR_CONTAINER_NAME, image, env_vars, true);
        ops.extend(append_array(
            containers.len(),
            &[sidecar],
            PointerBuf::from_tokens(["spec", "containers"]),
        ));
    }

    // 7. Completion marker, unconditionally last: once the patch applies
    // the pod is flagged and a replayed admission call skips it.
    ops.push(completion_marker(&annotations));

    ops
}

/// The array-append law.
///
/// With `existing` elements already at `base`, an empty array takes the
/// entire batch as one whole-array `add` (an `add` also creates the key
/// when the array is absent, where an append path would fail); a
/// populated array takes one single-element `add` per item at the
/// append path.
fn append_array<T: Serialize>(
    existing: usize,
    items: &[T],
    base: PointerBuf,
) -> Vec<PatchOperation> {
    if items.is_empty() {
        return Vec::new();
    }
    if existing == 0 {
        return vec![PatchOperation::Add(AddOperation {
            path: base,
            value: serde_json::to_value(items).unwrap_or_default(),
        })];
    }
    items
        .iter()
        .map(|item| {
            let mut path = base.clone();
            path.push_back("-");
            PatchOperation::Add(AddOperation {
                path,
                value: serde_json::to_value(item).unwrap_or_default(),
            })
        })
        .collect()
}

/// Pointer to a field of the container at `index`
fn container_field_path(index: usize, field: &str) -> PointerBuf {
    let index = index.to_string();
    PointerBuf::from_tokens(["spec", "containers", index.as_str(), field])
}

/// Build the injected init or sidecar container.
///
/// Both carry the annotation-derived environment and all three staging
/// mounts; the sidecar additionally runs privileged because the bundled
/// vault client requires elevated capability.
fn injected_container(
    name: &str,
    image: &str,
    env: Vec<EnvVar>,
    privileged: bool,
) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        env: Some(env),
        volume_mounts: Some(vec![
            volume_mount(SECRET_VOLUME_NAME, SECRETS_PATH, false),
            volume_mount(BIN_VOLUME_NAME, BIN_PATH, false),
            volume_mount(OAUTH_TOKEN_VOLUME_NAME, OAUTH_TOKEN_PATH, true),
        ]),
        security_context: privileged.then(|| SecurityContext {
            privileged: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn memory_volume(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource {
            medium: Some("Memory".to_string()),
            size_limit: None,
        }),
        ..Default::default()
    }
}

fn volume_mount(name: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: Some(read_only),
        ..Default::default()
    }
}

fn env_var_list(envs: &BTreeMap<String, String>) -> Vec<EnvVar> {
    envs.iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..Default::default()
        })
        .collect()
}

/// Derive the argv the launcher will receive for one container.
///
/// A container with an explicit command keeps it; one without gets the
/// image entrypoint hint, plus the image cmd hint when it also declares
/// no explicit args. Existing args are always concatenated at the end.
fn derived_argv(container: &Container) -> Vec<String> {
    let mut argv = container.command.clone().unwrap_or_default();
    if argv.is_empty() {
        if let Some(envs) = &container.env {
            if let Some(value) = hint(envs, ENTRYPOINT_HINT_ENV) {
                argv.push(value);
            }
            let no_args = container.args.as_ref().is_none_or(Vec::is_empty);
            if no_args {
                if let Some(value) = hint(envs, CMD_HINT_ENV) {
                    argv.push(value);
                }
            }
        }
    }
    argv.extend(container.args.clone().unwrap_or_default());
    argv
}

fn hint(envs: &[EnvVar], name: &str) -> Option<String> {
    envs.iter().find(|e| e.name == name).and_then(|e| e.value.clone())
}

/// Upsert the completion marker.
///
/// A pod with no annotations (or an unset/empty marker) gets a
/// whole-map `add` carrying the merged map, so sibling annotations
/// survive the upsert; a pod whose marker already holds a value gets a
/// single-key replace at the escaped pointer.
fn completion_marker(annotations: &BTreeMap<String, String>) -> PatchOperation {
    let marked = annotations
        .get(ANNOTATION_STATUS)
        .is_some_and(|v| !v.is_empty());
    if marked {
        PatchOperation::Replace(ReplaceOperation {
            path: PointerBuf::from_tokens(["metadata", "annotations", ANNOTATION_STATUS]),
            value: serde_json::Value::String(STATUS_INJECTED.to_string()),
        })
    } else {
        let mut merged = annotations.clone();
        merged.insert(ANNOTATION_STATUS.to_string(), STATUS_INJECTED.to_string());
        PatchOperation::Add(AddOperation {
            path: PointerBuf::from_tokens(["metadata", "annotations"]),
            value: serde_json::to_value(&merged).unwrap_or_default(),
        })
    }
}
