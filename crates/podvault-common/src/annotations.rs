//! Pod annotation vocabulary
//!
//! Annotations are the sole control surface for mutation behavior. The
//! webhook reads them to decide whether and how to mutate a pod, and
//! writes exactly one of them back (the completion marker).

use std::collections::BTreeMap;

/// Prefix shared by every recognized annotation key
pub const ANNOTATION_PREFIX: &str = "podvault.io/";

/// Enables mutation when truthy
pub const ANNOTATION_MUTATE: &str = "podvault.io/mutate";
/// Completion marker; `"injected"` means the pod was already processed
pub const ANNOTATION_STATUS: &str = "podvault.io/status";
/// Path to the launcher binary; presence triggers command mutation
pub const ANNOTATION_APP_LAUNCHER: &str = "podvault.io/app-launcher";
/// Vault tenant URL, mapped to `VAULT_URL` on injected containers
pub const ANNOTATION_TENANT_URL: &str = "podvault.io/tenant-url";
/// OAuth application id, mapped to `VAULT_APPID`
pub const ANNOTATION_APP_ID: &str = "podvault.io/appid";
/// OAuth/DMC scope, mapped to `VAULT_SCOPE`
pub const ANNOTATION_SCOPE: &str = "podvault.io/scope";
/// Bearer token, mapped to `VAULT_TOKEN`
pub const ANNOTATION_TOKEN: &str = "podvault.io/token";
/// Authentication mode, mapped to `VAULT_AUTHTYPE`
pub const ANNOTATION_AUTH_TYPE: &str = "podvault.io/auth-type";
/// Machine enrollment code, mapped to `VAULT_ENROLLMENTCODE`
pub const ANNOTATION_ENROLLMENT_CODE: &str = "podvault.io/enrollment-code";
/// Names an existing cluster secret mounted read-only for token bootstrap
pub const ANNOTATION_OAUTH_SECRET_NAME: &str = "podvault.io/oauth-secret-name";
/// `"no"` suppresses init-container injection
pub const ANNOTATION_INIT_CONTAINER: &str = "podvault.io/init-container";
/// `"yes"` enables sidecar injection
pub const ANNOTATION_SIDECAR_CONTAINER: &str = "podvault.io/sidecar-container";
/// Overrides the default init-container image
pub const ANNOTATION_INIT_IMAGE: &str = "podvault.io/init-image";
/// Overrides the default sidecar image
pub const ANNOTATION_SIDECAR_IMAGE: &str = "podvault.io/sidecar-image";

/// Annotations under this prefix become environment variables on the
/// injected containers: the suffix is the variable name, the value is a
/// literal or a `vault://` reference
pub const ANNOTATION_SECRET_PREFIX: &str = "podvault.io/vaultsecret_";

/// Value of the completion marker once a pod has been mutated
pub const STATUS_INJECTED: &str = "injected";

/// Accepted spellings of "yes, mutate this pod" (case-insensitive)
pub fn is_truthy(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "y" | "yes" | "true" | "on")
}

/// Convert a pod's annotations into the environment of the injected
/// containers.
///
/// `vaultsecret_<NAME>` annotations become `<NAME>` verbatim; the fixed
/// authentication annotations map to the `VAULT_*` names the injector
/// reads. A `BTreeMap` keeps the resulting env-var list deterministic.
pub fn injected_env(annotations: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut envs = BTreeMap::new();
    for (key, value) in annotations {
        if let Some(name) = key.strip_prefix(ANNOTATION_SECRET_PREFIX) {
            envs.insert(name.to_string(), value.clone());
        } else {
            let mapped = match key.as_str() {
                ANNOTATION_TENANT_URL => "VAULT_URL",
                ANNOTATION_APP_ID => "VAULT_APPID",
                ANNOTATION_SCOPE => "VAULT_SCOPE",
                ANNOTATION_TOKEN => "VAULT_TOKEN",
                ANNOTATION_AUTH_TYPE => "VAULT_AUTHTYPE",
                ANNOTATION_ENROLLMENT_CODE => "VAULT_ENROLLMENTCODE",
                _ => continue,
            };
            envs.insert(mapped.to_string(), value.clone());
        }
    }
    envs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_spellings_any_case() {
        for v in ["y", "Y", "yes", "YES", "true", "True", "on", "On"] {
            assert!(is_truthy(v), "{v} should be truthy");
        }
        for v in ["", "no", "n", "false", "off", "1", "enabled"] {
            assert!(!is_truthy(v), "{v} should not be truthy");
        }
    }

    #[test]
    fn secret_annotations_become_env_vars() {
        let mut annotations = BTreeMap::new();
        annotations.insert(
            format!("{ANNOTATION_SECRET_PREFIX}DB_PASS"),
            "vault://database/orders-db/app_user".to_string(),
        );
        annotations.insert(
            format!("{ANNOTATION_SECRET_PREFIX}API_KEY"),
            "literal-value".to_string(),
        );

        let envs = injected_env(&annotations);
        assert_eq!(
            envs.get("DB_PASS").map(String::as_str),
            Some("vault://database/orders-db/app_user")
        );
        assert_eq!(envs.get("API_KEY").map(String::as_str), Some("literal-value"));
    }

    #[test]
    fn auth_annotations_map_to_vault_names() {
        let mut annotations = BTreeMap::new();
        annotations.insert(ANNOTATION_TENANT_URL.to_string(), "https://t.example".to_string());
        annotations.insert(ANNOTATION_APP_ID.to_string(), "app1".to_string());
        annotations.insert(ANNOTATION_SCOPE.to_string(), "vault".to_string());
        annotations.insert(ANNOTATION_TOKEN.to_string(), "tok".to_string());
        annotations.insert(ANNOTATION_AUTH_TYPE.to_string(), "oauth".to_string());
        annotations.insert(ANNOTATION_ENROLLMENT_CODE.to_string(), "code".to_string());

        let envs = injected_env(&annotations);
        assert_eq!(envs.get("VAULT_URL").map(String::as_str), Some("https://t.example"));
        assert_eq!(envs.get("VAULT_APPID").map(String::as_str), Some("app1"));
        assert_eq!(envs.get("VAULT_SCOPE").map(String::as_str), Some("vault"));
        assert_eq!(envs.get("VAULT_TOKEN").map(String::as_str), Some("tok"));
        assert_eq!(envs.get("VAULT_AUTHTYPE").map(String::as_str), Some("oauth"));
        assert_eq!(envs.get("VAULT_ENROLLMENTCODE").map(String::as_str), Some("code"));
    }

    #[test]
    fn unrelated_annotations_are_ignored() {
        let mut annotations = BTreeMap::new();
        annotations.insert(ANNOTATION_MUTATE.to_string(), "yes".to_string());
        annotations.insert("app.kubernetes.io/name".to_string(), "shop".to_string());

        assert!(injected_env(&annotations).is_empty());
    }
}
