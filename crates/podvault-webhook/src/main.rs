//! Webhook server entrypoint
//!
//! Serves the mutating admission endpoint over HTTPS. The control
//! plane refuses plaintext webhooks, so a certificate/key pair is
//! required at startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use podvault_webhook::server;

/// Mutating admission webhook for vault secret injection
#[derive(Parser, Debug)]
#[command(name = "podvault-webhook", version, about, long_about = None)]
struct Cli {
    /// Webhook server port
    #[arg(long, default_value_t = 8443)]
    port: u16,

    /// File containing the x509 certificate for HTTPS
    #[arg(long = "tls-cert", default_value = "/etc/certs/tls.crt")]
    tls_cert: PathBuf,

    /// File containing the x509 private key matching --tls-cert
    #[arg(long = "tls-key", default_value = "/etc/certs/tls.key")]
    tls_key: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // rustls needs a process-wide crypto provider before any TLS use
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("Failed to install rustls crypto provider: {e:?}");
        std::process::exit(1);
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let tls_config = RustlsConfig::from_pem_file(&cli.tls_cert, &cli.tls_key)
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "failed to load TLS key pair from {:?} / {:?}: {}",
                cli.tls_cert,
                cli.tls_key,
                e
            )
        })?;

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    info!(addr = %addr, "Webhook server starting (HTTPS)");
    if let Err(e) = axum_server::bind_rustls(addr, tls_config)
        .handle(handle)
        .serve(server::router().into_make_service())
        .await
    {
        error!(error = %e, "Webhook server error");
        return Err(e.into());
    }

    info!("Webhook server shut down");
    Ok(())
}

/// Drain in-flight admission requests on SIGINT/SIGTERM, then stop
async fn shutdown_on_signal(handle: Handle) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }

    info!("Shutdown signal received, draining connections");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
