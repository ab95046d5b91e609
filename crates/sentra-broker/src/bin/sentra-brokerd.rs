//! `sentra-brokerd`, the standalone broker daemon.
//!
//! Listens on a Unix socket and executes governed actions on behalf of an
//! unprivileged client. The handshake token is read from the
//! `SENTRA_BROKER_TOKEN` environment variable, never from the command
//! line, so it does not leak through the process list.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sentra_audit::JsonlSink;
use sentra_broker::{BrokerConfig, BrokerServer, MIN_TOKEN_LEN};
use sentra_policy::{ApprovalService, PolicyEngine, ZoneRoots};

/// Sentra broker, the privileged execution daemon.
#[derive(Parser)]
#[command(name = "sentra-brokerd")]
#[command(author, version, about = "Sentra broker daemon")]
struct Args {
    /// Path of the Unix socket to listen on.
    #[arg(long, default_value = "/tmp/sentra-broker.sock")]
    socket: PathBuf,

    /// Workspace root actions are classified against.
    #[arg(long)]
    workspace: PathBuf,

    /// Config directory (defaults to ~/.sentra).
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Audit log file (defaults to <config-dir>/audit.jsonl).
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Approve level B and C actions without prompting. Trusted automation only.
    #[arg(long)]
    auto_approve: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let token = std::env::var("SENTRA_BROKER_TOKEN")
        .context("SENTRA_BROKER_TOKEN must be set in the environment")?;
    if token.len() < MIN_TOKEN_LEN {
        bail!("SENTRA_BROKER_TOKEN must be at least {MIN_TOKEN_LEN} characters");
    }

    let home = PathBuf::from(
        std::env::var_os("HOME").context("HOME must be set to derive zone roots")?,
    );
    let config_dir = args.config_dir.unwrap_or_else(|| home.join(".sentra"));
    let audit_log = args
        .audit_log
        .unwrap_or_else(|| config_dir.join("audit.jsonl"));

    let roots = ZoneRoots::new(&args.workspace, &config_dir, &home);
    let approval = if args.auto_approve {
        ApprovalService::auto_approve()
    } else {
        ApprovalService::non_interactive()
    };

    let server = BrokerServer::new(
        BrokerConfig {
            socket_path: args.socket,
            token,
            roots,
        },
        PolicyEngine::new(),
        approval,
        Arc::new(JsonlSink::new(audit_log)),
    );

    Arc::new(server).run().await?;
    Ok(())
}
