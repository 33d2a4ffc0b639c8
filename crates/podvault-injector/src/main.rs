//! Injector entrypoint
//!
//! Configuration violations exit through clap's usage-style error so
//! the container log shows the flag contract, not a stack trace. Any
//! later failure aborts the batch and fails the container.

use clap::{CommandFactory, Parser};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use podvault_common::reference;
use podvault_injector::client::RestClient;
use podvault_injector::config::{AuthContext, Cli};
use podvault_injector::error::Error;
use podvault_injector::resolver;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut ctx = AuthContext::from_cli(&cli);

    let (overrides, references) = reference::scan_env(std::env::vars());

    if let Err(e) = ctx
        .apply_overrides(&overrides)
        .and_then(|()| ctx.validate())
    {
        // flag-contract violations render as a usage error
        Cli::command()
            .error(clap::error::ErrorKind::InvalidValue, e.to_string())
            .exit();
    }

    info!(
        mode = ctx.mode.as_str(),
        url = %ctx.tenant_url,
        references = references.len(),
        "Resolving vault references"
    );

    let client = RestClient::connect(&ctx).await?;
    match resolver::resolve_all(&client, &references, &cli.secrets_dir).await {
        Ok(written) => {
            info!(written, dir = %cli.secrets_dir.display(), "Secret staging complete");
            Ok(())
        }
        Err(e @ Error::Authentication(_)) => {
            error!(error = %e, "Vault session was rejected");
            Err(e.into())
        }
        Err(e) => {
            error!(error = %e, "Secret resolution failed");
            Err(e.into())
        }
    }
}
