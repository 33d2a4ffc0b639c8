//! Reference resolution and file staging
//!
//! References resolve strictly in order and the first failure abandons
//! the batch: a partially staged directory with a clear error beats a
//! complete-looking directory missing one credential. Each resolved
//! value lands in one file named after its environment variable, owner
//! and group readable only.

use std::path::Path;

use tracing::{info, warn};

use podvault_common::reference::{ResourceKind, VaultReference};

use crate::client::VaultApi;
use crate::error::{Error, Result};

/// Resolve every reference into a file under `staging`.
///
/// Returns the number of files written. An empty checkout is skipped
/// with a warning rather than staging an empty file; lookup and
/// transport failures abort the whole run.
pub async fn resolve_all(
    client: &dyn VaultApi,
    references: &[VaultReference],
    staging: &Path,
) -> Result<usize> {
    let mut written = 0;
    for reference in references {
        let value = resolve_one(client, reference).await?;
        if value.is_empty() {
            warn!(
                env = %reference.env_name,
                "Checked-out value is empty, skipping file"
            );
            continue;
        }
        write_secret_file(staging, &reference.env_name, &value).await?;
        info!(env = %reference.env_name, "Staged secret file");
        written += 1;
    }
    Ok(written)
}

/// Run the lookup protocol for one reference and return the value
async fn resolve_one(client: &dyn VaultApi, reference: &VaultReference) -> Result<String> {
    match reference.kind {
        ResourceKind::Secret => {
            let record = client
                .lookup_secret(&reference.secret_name, &reference.parent_path)
                .await?;
            client.checkout_secret(&record.id).await
        }
        ResourceKind::System | ResourceKind::Database | ResourceKind::Domain => {
            let resource_id = client
                .lookup_resource(reference.kind, &reference.resource_name)
                .await?;
            let account_id = client
                .lookup_account(reference.kind, &resource_id, &reference.secret_name)
                .await?;
            client.checkout_password(&account_id).await
        }
    }
}

/// Write one staged file, named after the destination env var
async fn write_secret_file(staging: &Path, env_name: &str, value: &str) -> Result<()> {
    let path = staging.join(env_name);
    tokio::fs::write(&path, value).await.map_err(|source| Error::Write {
        path: path.clone(),
        source,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o660))
            .await
            .map_err(|source| Error::Write { path, source })?;
    }
    Ok(())
}
