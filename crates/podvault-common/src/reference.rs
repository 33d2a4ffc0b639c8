//! `vault://` reference grammar
//!
//! The injector scans its own environment and classifies each variable
//! as an authentication setting, a vault-addressed secret reference, or
//! ordinary application configuration (ignored). Parsing is pure and
//! never fails: a malformed reference is silently dropped, exactly as a
//! malformed annotation would be ignored at admission time.

use std::fmt;

/// Prefix marking an environment value as a vault reference
pub const VAULT_PREFIX: &str = "vault://";

/// Env var carrying the vault tenant URL
pub const ENV_VAULT_URL: &str = "VAULT_URL";
/// Env var carrying the OAuth application id
pub const ENV_VAULT_APPID: &str = "VAULT_APPID";
/// Env var carrying the OAuth/DMC scope
pub const ENV_VAULT_SCOPE: &str = "VAULT_SCOPE";
/// Env var carrying the bearer token
pub const ENV_VAULT_TOKEN: &str = "VAULT_TOKEN";
/// Env var selecting the authentication mode
pub const ENV_VAULT_AUTHTYPE: &str = "VAULT_AUTHTYPE";

/// The closed set of addressable resource kinds.
///
/// `Secret` resolves in a single lookup; the other three resolve through
/// a resource-then-account two-tier lookup. Unrecognized first segments
/// are rejected at parse time, never dispatched on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    /// A vaulted text secret, possibly nested in folders
    Secret,
    /// An account vaulted under a system (host)
    System,
    /// An account vaulted under a database
    Database,
    /// An account vaulted under a directory domain
    Domain,
}

impl ResourceKind {
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "secret" => Some(ResourceKind::Secret),
            "system" => Some(ResourceKind::System),
            "database" => Some(ResourceKind::Database),
            "domain" => Some(ResourceKind::Domain),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Secret => "secret",
            ResourceKind::System => "system",
            ResourceKind::Database => "database",
            ResourceKind::Domain => "domain",
        };
        f.write_str(s)
    }
}

/// One parsed secret coordinate, owned by a single resolver run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VaultReference {
    /// Destination env-var name; also the staged file name
    pub env_name: String,
    /// Which lookup protocol to use
    pub kind: ResourceKind,
    /// Resource name for the two-tier kinds; empty for `Secret`
    pub resource_name: String,
    /// Backslash-joined folder path for nested secrets; empty at top level
    pub parent_path: String,
    /// Secret name, or the account username for the two-tier kinds
    pub secret_name: String,
}

/// Authentication fields discovered in the environment.
///
/// Each present field overwrites the corresponding flag-supplied value
/// when merged into the injector's configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthOverrides {
    /// `VAULT_URL`
    pub url: Option<String>,
    /// `VAULT_APPID`
    pub app_id: Option<String>,
    /// `VAULT_SCOPE`
    pub scope: Option<String>,
    /// `VAULT_TOKEN`
    pub token: Option<String>,
    /// `VAULT_AUTHTYPE`
    pub auth_type: Option<String>,
}

/// Parse a single `vault://`-prefixed value into a reference.
///
/// Returns `None` for values without the prefix, for unrecognized
/// resource kinds, and for references missing required parts:
/// `vault://secret/` and `vault://system/db01/` both drop silently.
pub fn parse_value(env_name: &str, value: &str) -> Option<VaultReference> {
    let path = value.strip_prefix(VAULT_PREFIX)?;
    let segments: Vec<&str> = path.split('/').collect();
    let kind = ResourceKind::from_segment(segments[0])?;

    match kind {
        ResourceKind::Secret => {
            // Minimally "vault://secret/secretname"
            if segments.len() < 2 {
                return None;
            }
            let secret_name = segments[segments.len() - 1];
            if secret_name.is_empty() {
                return None;
            }
            // Intermediate folders join with a backslash, the separator
            // the vault's query language expects for ParentPath
            let parent_path = segments[1..segments.len() - 1].join("\\");
            Some(VaultReference {
                env_name: env_name.to_string(),
                kind,
                resource_name: String::new(),
                parent_path,
                secret_name: secret_name.to_string(),
            })
        }
        ResourceKind::System | ResourceKind::Database | ResourceKind::Domain => {
            // Minimally "vault://system/systemname/accountname"
            if segments.len() < 3 {
                return None;
            }
            let resource_name = segments[1];
            let secret_name = segments[2];
            if resource_name.is_empty() || secret_name.is_empty() {
                return None;
            }
            Some(VaultReference {
                env_name: env_name.to_string(),
                kind,
                resource_name: resource_name.to_string(),
                parent_path: String::new(),
                secret_name: secret_name.to_string(),
            })
        }
    }
}

/// Scan name/value pairs into authentication overrides and references.
///
/// Anything that is neither a `vault://` value nor one of the five
/// recognized authentication names is ordinary application
/// configuration and is ignored.
pub fn scan_env<I>(pairs: I) -> (AuthOverrides, Vec<VaultReference>)
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut overrides = AuthOverrides::default();
    let mut references = Vec::new();

    for (name, value) in pairs {
        if value.starts_with(VAULT_PREFIX) {
            if let Some(reference) = parse_value(&name, &value) {
                references.push(reference);
            }
        } else {
            match name.as_str() {
                ENV_VAULT_URL => overrides.url = Some(value),
                ENV_VAULT_APPID => overrides.app_id = Some(value),
                ENV_VAULT_SCOPE => overrides.scope = Some(value),
                ENV_VAULT_TOKEN => overrides.token = Some(value),
                ENV_VAULT_AUTHTYPE => overrides.auth_type = Some(value),
                _ => {}
            }
        }
    }

    (overrides, references)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn nested_secret_reference() {
        let r = parse_value("DB_PASS", "vault://secret/folder1/folder2/mysecret").unwrap();
        assert_eq!(r.kind, ResourceKind::Secret);
        assert_eq!(r.parent_path, "folder1\\folder2");
        assert_eq!(r.secret_name, "mysecret");
        assert_eq!(r.resource_name, "");
        assert_eq!(r.env_name, "DB_PASS");
    }

    #[test]
    fn top_level_secret_has_empty_parent_path() {
        let r = parse_value("TOKEN", "vault://secret/mysecret").unwrap();
        assert_eq!(r.parent_path, "");
        assert_eq!(r.secret_name, "mysecret");
    }

    #[test]
    fn system_account_reference() {
        let r = parse_value("SVC", "vault://system/db01/svc_account").unwrap();
        assert_eq!(r.kind, ResourceKind::System);
        assert_eq!(r.resource_name, "db01");
        assert_eq!(r.secret_name, "svc_account");
    }

    #[test]
    fn database_and_domain_references() {
        let r = parse_value("A", "vault://database/orders-db/app_user").unwrap();
        assert_eq!(r.kind, ResourceKind::Database);
        let r = parse_value("B", "vault://domain/corp.example.com/admin").unwrap();
        assert_eq!(r.kind, ResourceKind::Domain);
    }

    #[test]
    fn malformed_references_are_dropped() {
        // empty secret name
        assert_eq!(parse_value("X", "vault://secret/"), None);
        // missing account segment
        assert_eq!(parse_value("X", "vault://system/db01"), None);
        // empty account name
        assert_eq!(parse_value("X", "vault://system/db01/"), None);
        // unknown resource kind
        assert_eq!(parse_value("X", "vault://bucket/a/b"), None);
        // no prefix at all
        assert_eq!(parse_value("X", "plain-value"), None);
    }

    #[test]
    fn scan_splits_auth_from_references() {
        let (overrides, refs) = scan_env(pairs(&[
            ("VAULT_URL", "https://tenant.example.net"),
            ("VAULT_AUTHTYPE", "dmc"),
            ("DB_PASS", "vault://database/orders-db/app_user"),
            ("BROKEN", "vault://secret/"),
            ("HOME", "/root"),
        ]));

        assert_eq!(overrides.url.as_deref(), Some("https://tenant.example.net"));
        assert_eq!(overrides.auth_type.as_deref(), Some("dmc"));
        assert_eq!(overrides.token, None);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].env_name, "DB_PASS");
    }

    #[test]
    fn vault_prefixed_auth_name_is_a_reference_not_an_override() {
        // A VAULT_TOKEN whose value is itself a vault address is treated
        // as a reference to resolve, not as a literal token
        let (overrides, refs) = scan_env(pairs(&[("VAULT_TOKEN", "vault://secret/bootstrap")]));
        assert_eq!(overrides.token, None);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].env_name, "VAULT_TOKEN");
    }
}
