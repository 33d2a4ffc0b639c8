//! Shared vocabulary for the podvault secret-injection system
//!
//! Three cooperating processes agree on this crate's constants: the
//! mutating admission webhook (which injects containers, volumes and a
//! command override into pods), the secret injector (which resolves
//! `vault://` references into files), and the app launcher (which folds
//! those files into the workload's environment). Nothing here touches
//! the network or the filesystem.

#![deny(missing_docs)]

pub mod annotations;
pub mod reference;

/// Directory the launcher binary is staged into
pub const BIN_PATH: &str = "/podvault/bin";

/// Directory resolved secret files are written to, one file per secret
pub const SECRETS_PATH: &str = "/podvault/secrets";

/// Mount path for the OAuth bootstrap-token secret volume
pub const OAUTH_TOKEN_PATH: &str = "/var/secrets";

/// Bootstrap token file read (never written) by the injector
pub const OAUTH_TOKEN_FILE: &str = "/var/secrets/oauthtoken";

/// Name of the memory-backed volume holding resolved secret files
pub const SECRET_VOLUME_NAME: &str = "vault-secret-volume";

/// Name of the memory-backed volume holding the staged launcher binary
pub const BIN_VOLUME_NAME: &str = "vault-bin-volume";

/// Name of the read-only volume carrying the OAuth bootstrap token
pub const OAUTH_TOKEN_VOLUME_NAME: &str = "vault-token";

/// Name given to the injected init container
pub const INIT_CONTAINER_NAME: &str = "podvault-init";

/// Name given to the injected sidecar container
pub const SIDECAR_CONTAINER_NAME: &str = "podvault-sidecar";

/// Default image for the injected init container
pub const DEFAULT_INIT_IMAGE: &str = "podvault/secret-injector-oauth";

/// Default image for the injected sidecar container
pub const DEFAULT_SIDECAR_IMAGE: &str = "podvault/secret-injector-dmc";

/// Container env var naming the image entrypoint, consulted by the
/// webhook when a container declares no explicit `command`
pub const ENTRYPOINT_HINT_ENV: &str = "PODVAULT_CONTAINER_ENTRYPOINT";

/// Container env var naming the image default arguments, consulted only
/// when the container also declares no explicit `args`
pub const CMD_HINT_ENV: &str = "PODVAULT_CONTAINER_CMD";
