//! CLI and environment configuration
//!
//! The authentication context merges two sources: operator-supplied
//! flags and the `VAULT_*` variables the webhook injected into this
//! container's environment. Environment values always win, so the same
//! injector image works both as a manually invoked tool and as an
//! annotation-driven init container.

use clap::{Parser, ValueEnum};

use podvault_common::reference::AuthOverrides;

use crate::error::{Error, Result};

/// How to authenticate to the vault tenant
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum AuthMode {
    /// OAuth2 confidential client (appid + scope + token or user)
    Oauth,
    /// Username/password login
    Unpw,
    /// Machine credential (delegated machine credential token)
    Dmc,
}

impl AuthMode {
    /// Parse the `VAULT_AUTHTYPE` spelling
    pub fn from_env_value(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "oauth" => Ok(AuthMode::Oauth),
            "unpw" => Ok(AuthMode::Unpw),
            "dmc" => Ok(AuthMode::Dmc),
            other => Err(Error::configuration(format!(
                "unrecognized VAULT_AUTHTYPE '{other}', expected oauth|unpw|dmc"
            ))),
        }
    }

    /// Lowercase wire spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Oauth => "oauth",
            AuthMode::Unpw => "unpw",
            AuthMode::Dmc => "dmc",
        }
    }
}

/// Resolve secrets from the vault into staged files
#[derive(Parser, Debug)]
#[command(name = "podvault-injector", version, about, long_about = None)]
pub struct Cli {
    /// Authentication type
    #[arg(long = "auth", value_enum, default_value_t = AuthMode::Dmc)]
    pub auth: AuthMode,

    /// Vault tenant URL (required)
    #[arg(long = "url", default_value = "")]
    pub url: String,

    /// Ignore certificate verification
    #[arg(long = "skipcert", default_value_t = false)]
    pub skipcert: bool,

    /// OAuth application ID. Required if auth = oauth
    #[arg(long = "appid", default_value = "")]
    pub appid: String,

    /// OAuth or DMC scope definition. Required if auth = oauth or dmc
    #[arg(long = "scope", default_value = "")]
    pub scope: String,

    /// OAuth token. Optional if auth = oauth or dmc
    #[arg(long = "token", default_value = "")]
    pub token: String,

    /// Authorized user to log in to the tenant. Required if auth = unpw
    #[arg(long = "user", default_value = "")]
    pub user: String,

    /// User password
    #[arg(long = "password", default_value = "")]
    pub password: String,

    /// Directory resolved secret files are written into
    #[arg(long = "secrets-dir", default_value = podvault_common::SECRETS_PATH)]
    pub secrets_dir: std::path::PathBuf,
}

/// The merged authentication context for one resolver run
#[derive(Clone, Debug)]
pub struct AuthContext {
    /// Selected authentication mode
    pub mode: AuthMode,
    /// Vault tenant URL
    pub tenant_url: String,
    /// OAuth application id
    pub app_id: String,
    /// OAuth/DMC scope
    pub scope: String,
    /// Bearer token
    pub token: String,
    /// Username for unpw/oauth login
    pub user: String,
    /// Password for unpw login
    pub password: String,
    /// Skip TLS certificate verification
    pub skip_cert_verify: bool,
}

impl AuthContext {
    /// Build the context from parsed flags
    pub fn from_cli(cli: &Cli) -> Self {
        AuthContext {
            mode: cli.auth,
            tenant_url: cli.url.clone(),
            app_id: cli.appid.clone(),
            scope: cli.scope.clone(),
            token: cli.token.clone(),
            user: cli.user.clone(),
            password: cli.password.clone(),
            skip_cert_verify: cli.skipcert,
        }
    }

    /// Fold environment-discovered values over the flag values.
    ///
    /// An environment variable always overwrites the corresponding
    /// field when present.
    pub fn apply_overrides(&mut self, overrides: &AuthOverrides) -> Result<()> {
        if let Some(url) = &overrides.url {
            self.tenant_url = url.clone();
        }
        if let Some(app_id) = &overrides.app_id {
            self.app_id = app_id.clone();
        }
        if let Some(scope) = &overrides.scope {
            self.scope = scope.clone();
        }
        if let Some(token) = &overrides.token {
            self.token = token.clone();
        }
        if let Some(auth_type) = &overrides.auth_type {
            self.mode = AuthMode::from_env_value(auth_type)?;
        }
        Ok(())
    }

    /// Validate the required parameter combination for the chosen mode.
    ///
    /// Mirrors the CLI contract: violations are reported before any
    /// network activity.
    pub fn validate(&self) -> Result<()> {
        if self.tenant_url.is_empty() {
            return Err(Error::configuration("missing url parameter"));
        }
        match self.mode {
            AuthMode::Oauth => {
                if self.app_id.is_empty() || self.scope.is_empty() {
                    return Err(Error::configuration(
                        "auth mode oauth requires appid and scope parameters",
                    ));
                }
                if self.token.is_empty() && self.user.is_empty() {
                    return Err(Error::configuration(
                        "auth mode oauth requires a token or user parameter",
                    ));
                }
            }
            AuthMode::Unpw => {
                if self.user.is_empty() {
                    return Err(Error::configuration(
                        "auth mode unpw requires a user parameter",
                    ));
                }
            }
            AuthMode::Dmc => {
                if self.token.is_empty() && self.scope.is_empty() {
                    return Err(Error::configuration(
                        "auth mode dmc requires a token or scope parameter",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_context(mode: AuthMode) -> AuthContext {
        AuthContext {
            mode,
            tenant_url: "https://tenant.example.net".to_string(),
            app_id: String::new(),
            scope: String::new(),
            token: String::new(),
            user: String::new(),
            password: String::new(),
            skip_cert_verify: false,
        }
    }

    #[test]
    fn url_is_always_required() {
        let mut ctx = base_context(AuthMode::Dmc);
        ctx.scope = "vault".to_string();
        ctx.tenant_url = String::new();
        assert!(matches!(ctx.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn oauth_requires_appid_scope_and_a_credential() {
        let mut ctx = base_context(AuthMode::Oauth);
        assert!(ctx.validate().is_err());

        ctx.app_id = "app1".to_string();
        ctx.scope = "vault".to_string();
        assert!(ctx.validate().is_err(), "needs token or user");

        ctx.token = "tok".to_string();
        assert!(ctx.validate().is_ok());

        ctx.token = String::new();
        ctx.user = "admin".to_string();
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn dmc_requires_token_or_scope() {
        let ctx = base_context(AuthMode::Dmc);
        assert!(ctx.validate().is_err());

        let mut ctx = base_context(AuthMode::Dmc);
        ctx.scope = "vault".to_string();
        assert!(ctx.validate().is_ok());

        let mut ctx = base_context(AuthMode::Dmc);
        ctx.token = "tok".to_string();
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn unpw_requires_user() {
        let ctx = base_context(AuthMode::Unpw);
        assert!(ctx.validate().is_err());

        let mut ctx = base_context(AuthMode::Unpw);
        ctx.user = "admin".to_string();
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn environment_always_overwrites_flags() {
        let mut ctx = base_context(AuthMode::Oauth);
        ctx.token = "flag-token".to_string();

        let overrides = AuthOverrides {
            url: Some("https://other.example.net".to_string()),
            token: Some("env-token".to_string()),
            auth_type: Some("dmc".to_string()),
            ..Default::default()
        };
        ctx.apply_overrides(&overrides).unwrap();

        assert_eq!(ctx.tenant_url, "https://other.example.net");
        assert_eq!(ctx.token, "env-token");
        assert_eq!(ctx.mode, AuthMode::Dmc);
    }

    #[test]
    fn unknown_env_auth_type_is_a_configuration_error() {
        let mut ctx = base_context(AuthMode::Dmc);
        let overrides = AuthOverrides {
            auth_type: Some("kerberos".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            ctx.apply_overrides(&overrides),
            Err(Error::Configuration(_))
        ));
    }
}
