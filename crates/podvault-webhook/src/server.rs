//! HTTP surface of the webhook
//!
//! One route matters: `POST /mutate`, speaking the admission-review
//! envelope. The `Json` extractor enforces the contract the control
//! plane expects: HTTP 415 without `Content-Type: application/json`,
//! HTTP 400 for an empty or undecodable body. A body that parses as
//! JSON but fails admission-review conversion is answered in-band with
//! an invalid admission response; nothing here is fatal to the process.

use axum::{routing::get, routing::post, Json, Router};
use k8s_openapi::api::core::v1::Pod;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::DynamicObject;
use tracing::{debug, error, info};

use crate::{decision, patch};

/// Build the webhook router
pub fn router() -> Router {
    Router::new()
        .route("/mutate", post(mutate_handler))
        .route("/healthz", get(|| async { "ok" }))
}

/// Handle a mutating admission review for pods
async fn mutate_handler(
    Json(body): Json<AdmissionReview<Pod>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<Pod> = match body.try_into() {
        Ok(request) => request,
        Err(e) => {
            // The envelope carried no request half; there is no UID to
            // echo, so the error travels in a bare invalid response.
            error!(error = %e, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    Json(mutate_pod(&request).into_review())
}

/// Process one admission request: gate, synthesize, attach the patch.
fn mutate_pod(request: &AdmissionRequest<Pod>) -> AdmissionResponse {
    let uid = request.uid.clone();
    let response = AdmissionResponse::from(request);

    let Some(pod) = &request.object else {
        debug!(uid = %uid, "No pod object in request, allowing unchanged");
        return response;
    };

    let namespace = request
        .namespace
        .as_deref()
        .or(pod.metadata.namespace.as_deref())
        .unwrap_or_default();
    let empty = Default::default();
    let annotations = pod.metadata.annotations.as_ref().unwrap_or(&empty);

    if !decision::mutation_required(namespace, annotations) {
        info!(
            uid = %uid,
            namespace = %namespace,
            pod = ?pod.metadata.name,
            "Skipping mutation due to policy check"
        );
        return response;
    }

    let ops = patch::synthesize(pod);
    info!(
        uid = %uid,
        namespace = %namespace,
        pod = ?pod.metadata.name,
        patch_ops = ops.len(),
        "Mutating pod"
    );

    match response.with_patch(json_patch::Patch(ops)) {
        Ok(response) => response,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to serialize patch");
            AdmissionResponse::from(request).deny(format!("patch serialization error: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use podvault_common::annotations::{ANNOTATION_MUTATE, ANNOTATION_STATUS};
    use std::collections::BTreeMap;

    fn admission_body(pod: &Pod, namespace: &str) -> serde_json::Value {
        serde_json::json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-4ca8-972c-71c0c1a0a7d8",
                "kind": {"group": "", "version": "v1", "kind": "Pod"},
                "resource": {"group": "", "version": "v1", "resource": "pods"},
                "operation": "CREATE",
                "namespace": namespace,
                "userInfo": {},
                "object": pod,
            }
        })
    }

    fn make_pod(annotations: &[(&str, &str)]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("workload".to_string()),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "main".to_string(),
                    image: Some("registry.example/app:v1".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn run_review(body: serde_json::Value) -> AdmissionReview<DynamicObject> {
        let review: AdmissionReview<Pod> = serde_json::from_value(body).unwrap();
        let request: AdmissionRequest<Pod> = review.try_into().unwrap();
        mutate_pod(&request).into_review()
    }

    #[test]
    fn eligible_pod_gets_a_patch_and_keeps_its_uid() {
        let pod = make_pod(&[(ANNOTATION_MUTATE, "yes")]);
        let review = run_review(admission_body(&pod, "default"));
        let response = review.response.unwrap();

        assert_eq!(response.uid, "705ab4f5-6393-4ca8-972c-71c0c1a0a7d8");
        assert!(response.allowed);
        let patch = response.patch.expect("patch bytes present");
        let ops: serde_json::Value = serde_json::from_slice(&patch).unwrap();
        assert!(!ops.as_array().unwrap().is_empty());
    }

    #[test]
    fn ineligible_pod_is_allowed_unchanged() {
        let pod = make_pod(&[]);
        let review = run_review(admission_body(&pod, "default"));
        let response = review.response.unwrap();

        assert!(response.allowed);
        assert!(response.patch.is_none());
    }

    #[test]
    fn already_injected_pod_is_allowed_unchanged() {
        let pod = make_pod(&[(ANNOTATION_MUTATE, "yes"), (ANNOTATION_STATUS, "injected")]);
        let review = run_review(admission_body(&pod, "default"));
        assert!(review.response.unwrap().patch.is_none());
    }

    #[test]
    fn reserved_namespace_is_allowed_unchanged() {
        let pod = make_pod(&[(ANNOTATION_MUTATE, "yes")]);
        let review = run_review(admission_body(&pod, "kube-system"));
        assert!(review.response.unwrap().patch.is_none());
    }
}
