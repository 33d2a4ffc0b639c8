//! Workload launcher
//!
//! PID-1 shim prepended to the container command at admission time.
//! It waits for the injector to stage secret files, folds each file
//! into the environment as `FILENAME=contents`, and replaces itself
//! with the wrapped entrypoint. The staged files stay on a memory
//! volume; the application only ever sees environment variables.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use podvault_common::SECRETS_PATH;

/// How many one-second polls to give the injector before giving up
const WAIT_ATTEMPTS: u32 = 30;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let Some((program, args)) = argv.split_first() else {
        bail!("no wrapped entrypoint given: expected `podvault-launcher PROGRAM [ARGS...]`");
    };

    let staging = Path::new(SECRETS_PATH);
    wait_for_secrets(staging)?;

    let env = staged_env(staging)?;
    info!(
        program = %program,
        secrets = env.len(),
        "Launching wrapped entrypoint"
    );

    exec(program, args, &env)
}

/// Poll the staging directory until the injector has written at least
/// one file, then launch anyway once the wait is exhausted: a workload
/// with no vault references never gets staged files, and holding it
/// hostage to the injector would turn that into a deadlock. A missing
/// directory means the pod was mutated without the staging volume,
/// which no amount of waiting will fix.
fn wait_for_secrets(staging: &Path) -> anyhow::Result<()> {
    for attempt in 1..=WAIT_ATTEMPTS {
        match dir_has_entries(staging) {
            Ok(true) => return Ok(()),
            Ok(false) => {
                if attempt == WAIT_ATTEMPTS {
                    break;
                }
                if attempt % 10 == 0 {
                    warn!(
                        dir = %staging.display(),
                        attempt,
                        "Still waiting for staged secrets"
                    );
                }
                std::thread::sleep(Duration::from_secs(1));
            }
            Err(e) => {
                bail!(
                    "secret staging directory {} is not readable: {e}",
                    staging.display()
                );
            }
        }
    }
    warn!(
        dir = %staging.display(),
        "No secrets appeared after {WAIT_ATTEMPTS} seconds, launching without them"
    );
    Ok(())
}

fn dir_has_entries(dir: &Path) -> std::io::Result<bool> {
    Ok(std::fs::read_dir(dir)?.next().is_some())
}

/// Read every regular file in the staging directory as one NAME=value
/// pair, named after the file.
fn staged_env(staging: &Path) -> anyhow::Result<Vec<(String, String)>> {
    let mut env = Vec::new();
    for entry in std::fs::read_dir(staging)
        .with_context(|| format!("failed to list {}", staging.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!(path = %path.display(), "Skipping staged file with non-UTF-8 name");
            continue;
        };
        let value = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read staged secret {}", path.display()))?;
        env.push((name.to_string(), value));
    }
    Ok(env)
}

#[cfg(unix)]
fn exec(program: &str, args: &[String], env: &[(String, String)]) -> anyhow::Result<()> {
    use std::os::unix::process::CommandExt;

    let mut command = std::process::Command::new(program);
    command.args(args);
    for (name, value) in env {
        command.env(name, value);
    }
    // exec only returns on failure
    let err = command.exec();
    bail!("failed to exec {program}: {err}");
}

#[cfg(not(unix))]
fn exec(_program: &str, _args: &[String], _env: &[(String, String)]) -> anyhow::Result<()> {
    bail!("the launcher only supports unix targets");
}
