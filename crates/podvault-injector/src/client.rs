//! Authenticated vault client
//!
//! The resolver only needs five operations against the vault; they are
//! expressed as the [`VaultApi`] trait so resolution logic can be
//! tested without a tenant. The concrete [`RestClient`] speaks the
//! vault's REST dialect: row lookups go through the `RedRock/query`
//! endpoint with a SQL-ish script, checkouts through `ServerManage`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use podvault_common::reference::ResourceKind;
use podvault_common::OAUTH_TOKEN_FILE;

use crate::config::{AuthContext, AuthMode};
use crate::error::{Error, Result};

/// Metadata returned by a DataVault lookup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretRecord {
    /// Vault identifier used for checkout
    pub id: String,
    /// Containing folder identifier, when nested
    pub folder_id: Option<String>,
}

/// The capability the resolver consumes: query and checkout against an
/// already-authenticated session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// Look up a text secret by name and backslash-joined parent path
    async fn lookup_secret(&self, name: &str, parent_path: &str) -> Result<SecretRecord>;

    /// Check out the current text of a secret by identifier
    async fn checkout_secret(&self, id: &str) -> Result<String>;

    /// Look up a system/database/domain by name, yielding its identifier
    async fn lookup_resource(&self, kind: ResourceKind, name: &str) -> Result<String>;

    /// Look up the account with `user` scoped to a resource identifier
    async fn lookup_account(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        user: &str,
    ) -> Result<String>;

    /// Check out the password of an account by identifier
    async fn checkout_password(&self, account_id: &str) -> Result<String>;
}

/// REST session against one vault tenant
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl RestClient {
    /// Build the session for the configured auth mode.
    ///
    /// `unpw` passes CLI validation but has no session branch; it is
    /// rejected here explicitly rather than falling back to another
    /// mode.
    pub async fn connect(ctx: &AuthContext) -> Result<Self> {
        match ctx.mode {
            AuthMode::Oauth => Self::oauth(ctx).await,
            AuthMode::Dmc => Self::dmc(ctx),
            AuthMode::Unpw => Err(Error::UnimplementedMode("unpw".to_string())),
        }
    }

    /// OAuth session: a bootstrap token file, when present and
    /// non-empty, takes precedence over the flag/env token.
    async fn oauth(ctx: &AuthContext) -> Result<Self> {
        let mut token = ctx.token.clone();
        match tokio::fs::read_to_string(OAUTH_TOKEN_FILE).await {
            Ok(content) if !content.is_empty() => {
                info!(path = OAUTH_TOKEN_FILE, "Using bootstrap token file");
                token = content;
            }
            _ => {}
        }
        if token.is_empty() {
            return Err(Error::authentication(
                "no OAuth token available from flags, environment, or bootstrap file",
            ));
        }
        Self::build(ctx, token)
    }

    /// DMC session: built directly from the configured values.
    fn dmc(ctx: &AuthContext) -> Result<Self> {
        Self::build(ctx, ctx.token.clone())
    }

    fn build(ctx: &AuthContext, token: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(ctx.skip_cert_verify)
            .build()
            .map_err(|e| Error::authentication(format!("failed to build HTTP client: {e}")))?;
        Ok(RestClient {
            http,
            base_url: ctx.tenant_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// POST one API call and unwrap the `{success, Result, Message}`
    /// envelope.
    async fn api_post(&self, path: &str, body: Value) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, "Vault API call");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::authentication(format!(
                "vault rejected the session: HTTP {status}"
            )));
        }
        if !status.is_success() {
            return Err(Error::resolution(format!(
                "vault API {path} failed: HTTP {status}"
            )));
        }

        let envelope: ApiEnvelope = response.json().await?;
        if !envelope.success {
            return Err(Error::resolution(format!(
                "vault API {path} failed: {}",
                envelope.message.unwrap_or_else(|| "unknown error".to_string())
            )));
        }
        Ok(envelope.result.unwrap_or(Value::Null))
    }

    /// Run a row query and return the first row, if any
    async fn query_first_row(&self, script: String) -> Result<Option<Value>> {
        let result = self
            .api_post("RedRock/query", json!({ "Script": script }))
            .await?;
        let row = result
            .get("Results")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|entry| entry.get("Row"))
            .cloned();
        Ok(row)
    }
}

#[async_trait]
impl VaultApi for RestClient {
    async fn lookup_secret(&self, name: &str, parent_path: &str) -> Result<SecretRecord> {
        let row = self
            .query_first_row(secret_query(name, parent_path))
            .await?
            .ok_or_else(|| {
                Error::resolution(format!("secret '{parent_path}\\{name}' not found"))
            })?;
        let id = row_string(&row, "ID")
            .ok_or_else(|| Error::resolution(format!("secret '{name}' has no ID")))?;
        Ok(SecretRecord {
            id,
            folder_id: row_string(&row, "FolderId"),
        })
    }

    async fn checkout_secret(&self, id: &str) -> Result<String> {
        let result = self
            .api_post("ServerManage/RetrieveSecretContents", json!({ "ID": id }))
            .await?;
        Ok(row_string(&result, "SecretText").unwrap_or_default())
    }

    async fn lookup_resource(&self, kind: ResourceKind, name: &str) -> Result<String> {
        let row = self
            .query_first_row(resource_query(kind, name)?)
            .await?
            .ok_or_else(|| Error::resolution(format!("{kind} '{name}' not found")))?;
        row_string(&row, "ID")
            .ok_or_else(|| Error::resolution(format!("{kind} '{name}' has no ID")))
    }

    async fn lookup_account(
        &self,
        kind: ResourceKind,
        resource_id: &str,
        user: &str,
    ) -> Result<String> {
        let row = self
            .query_first_row(account_query(kind, resource_id, user)?)
            .await?
            .ok_or_else(|| {
                Error::resolution(format!("account '{user}' not found on {kind} {resource_id}"))
            })?;
        row_string(&row, "ID")
            .ok_or_else(|| Error::resolution(format!("account '{user}' has no ID")))
    }

    async fn checkout_password(&self, account_id: &str) -> Result<String> {
        let result = self
            .api_post("ServerManage/CheckoutPassword", json!({ "ID": account_id }))
            .await?;
        Ok(row_string(&result, "Password").unwrap_or_default())
    }
}

#[derive(Deserialize)]
struct ApiEnvelope {
    success: bool,
    #[serde(rename = "Result")]
    result: Option<Value>,
    #[serde(rename = "Message")]
    message: Option<String>,
}

fn row_string(row: &Value, field: &str) -> Option<String> {
    row.get(field).and_then(Value::as_str).map(str::to_string)
}

/// Escape a value for inclusion in a query-script string literal
fn sql_quote(value: &str) -> String {
    value.replace('\'', "''")
}

fn secret_query(name: &str, parent_path: &str) -> String {
    format!(
        "SELECT ID, FolderId FROM DataVault WHERE SecretName = '{}' AND ParentPath = '{}'",
        sql_quote(name),
        sql_quote(parent_path)
    )
}

fn resource_query(kind: ResourceKind, name: &str) -> Result<String> {
    let table = match kind {
        ResourceKind::System => "Server",
        ResourceKind::Database => "VaultDatabase",
        ResourceKind::Domain => "VaultDomain",
        ResourceKind::Secret => {
            return Err(Error::resolution(
                "text secrets resolve directly, not through a resource lookup",
            ))
        }
    };
    Ok(format!(
        "SELECT ID FROM {table} WHERE Name = '{}'",
        sql_quote(name)
    ))
}

fn account_query(kind: ResourceKind, resource_id: &str, user: &str) -> Result<String> {
    // The scoping column names the owning resource differently per kind
    let column = match kind {
        ResourceKind::System => "Host",
        ResourceKind::Database => "DatabaseID",
        ResourceKind::Domain => "DomainID",
        ResourceKind::Secret => {
            return Err(Error::resolution(
                "text secrets have no account to look up",
            ))
        }
    };
    Ok(format!(
        "SELECT ID FROM VaultAccount WHERE User = '{}' AND {column} = '{}'",
        sql_quote(user),
        sql_quote(resource_id)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_query_includes_backslash_parent_path() {
        let script = secret_query("mysecret", "folder1\\folder2");
        assert_eq!(
            script,
            "SELECT ID, FolderId FROM DataVault WHERE SecretName = 'mysecret' AND ParentPath = 'folder1\\folder2'"
        );
    }

    #[test]
    fn top_level_secret_query_has_empty_parent_path() {
        let script = secret_query("mysecret", "");
        assert!(script.ends_with("AND ParentPath = ''"));
    }

    #[test]
    fn quotes_are_doubled_in_scripts() {
        let script = secret_query("o'brien", "");
        assert!(script.contains("SecretName = 'o''brien'"));
    }

    #[test]
    fn resource_tables_per_kind() {
        assert!(resource_query(ResourceKind::System, "db01")
            .unwrap()
            .contains("FROM Server WHERE Name = 'db01'"));
        assert!(resource_query(ResourceKind::Database, "orders-db")
            .unwrap()
            .contains("FROM VaultDatabase WHERE"));
        assert!(resource_query(ResourceKind::Domain, "corp.example.com")
            .unwrap()
            .contains("FROM VaultDomain WHERE"));
        assert!(resource_query(ResourceKind::Secret, "x").is_err());
    }

    #[test]
    fn account_scoping_column_per_kind() {
        assert!(account_query(ResourceKind::System, "id1", "svc")
            .unwrap()
            .contains("AND Host = 'id1'"));
        assert!(account_query(ResourceKind::Database, "id2", "svc")
            .unwrap()
            .contains("AND DatabaseID = 'id2'"));
        assert!(account_query(ResourceKind::Domain, "id3", "svc")
            .unwrap()
            .contains("AND DomainID = 'id3'"));
        assert!(account_query(ResourceKind::Secret, "id", "svc").is_err());
    }

    #[test]
    fn envelope_failure_carries_the_message() {
        let envelope: ApiEnvelope = serde_json::from_str(
            r#"{"success": false, "Result": null, "Message": "not entitled"}"#,
        )
        .unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.message.as_deref(), Some("not entitled"));
    }

    #[test]
    fn row_extraction_reads_typed_fields() {
        let row = json!({"ID": "abc-123", "FolderId": "f-9"});
        assert_eq!(row_string(&row, "ID").as_deref(), Some("abc-123"));
        assert_eq!(row_string(&row, "FolderId").as_deref(), Some("f-9"));
        assert_eq!(row_string(&row, "Missing"), None);
    }

    #[tokio::test]
    async fn unpw_mode_is_rejected_explicitly() {
        let ctx = AuthContext {
            mode: AuthMode::Unpw,
            tenant_url: "https://tenant.example.net".to_string(),
            app_id: String::new(),
            scope: String::new(),
            token: String::new(),
            user: "admin".to_string(),
            password: "pw".to_string(),
            skip_cert_verify: false,
        };
        assert!(matches!(
            RestClient::connect(&ctx).await,
            Err(Error::UnimplementedMode(mode)) if mode == "unpw"
        ));
    }
}
