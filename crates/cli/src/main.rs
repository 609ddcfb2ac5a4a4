#![forbid(unsafe_code)]

use std::str::FromStr;

use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use dualstore_core::Mode;
use dualstore_persist::SqliteKvStore;
use dualstore_router::{advance_mode, resolve_mode, StaticGate};

#[derive(Parser, Debug)]
#[command(name = "dualstorectl", version, about = "dualstore mode administration")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Path to the SQLite mode store (default: ~/.dualstore/dualstore.db)
    #[arg(long = "db", global = true, env = "DUALSTORE_DB_PATH")]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the persisted dual-write mode for a resource kind
    Get {
        /// Resource kind, e.g. "playlists"
        #[arg(long = "kind")]
        kind: String,
        /// Deployment (tenant/stack) identifier
        #[arg(long = "deployment", default_value = "default")]
        deployment: String,
    },
    /// Advance the persisted mode; downgrades are refused
    Set {
        #[arg(long = "kind")]
        kind: String,
        #[arg(long = "deployment", default_value = "default")]
        deployment: String,
        /// Target mode ordinal, "1".."4"
        #[arg(long = "mode")]
        mode: String,
    },
    /// Run the full resolution path, including the shadow-write rollout gate
    Resolve {
        #[arg(long = "kind")]
        kind: String,
        #[arg(long = "deployment", default_value = "default")]
        deployment: String,
        /// Allow this kind to advance from mode 1 to mode 2
        #[arg(long = "enable-shadow-write", action = ArgAction::SetTrue)]
        enable_shadow_write: bool,
    },
}

fn init_tracing() {
    let env = std::env::var("DUALSTORE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("DUALSTORE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid DUALSTORE_METRICS_ADDR; expected host:port");
        }
    }
}

fn open_store(db: Option<&str>) -> Result<SqliteKvStore> {
    match db {
        Some(path) => SqliteKvStore::open(path),
        None => SqliteKvStore::open_default(),
    }
}

fn print_mode(output: Output, kind: &str, deployment: &str, mode: Mode) -> Result<()> {
    match output {
        Output::Human => println!("{}/{} • mode {}", kind, deployment, mode),
        Output::Json => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "kind": kind,
                "deployment": deployment,
                "mode": mode.as_str(),
            }))?
        ),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let kv = open_store(cli.db.as_deref())?;

    match cli.command {
        Commands::Get { kind, deployment } => {
            // gate disabled: inspection never advances the mode on its own
            let mode = resolve_mode(&kv, &StaticGate::new(), &kind, &deployment)?;
            print_mode(cli.output, &kind, &deployment, mode)?;
        }
        Commands::Set { kind, deployment, mode } => {
            let requested = Mode::parse(&mode)
                .ok_or_else(|| anyhow!("invalid mode {:?}, expected an ordinal 1..4", mode))?;
            let set = advance_mode(&kv, &kind, &deployment, requested)?;
            print_mode(cli.output, &kind, &deployment, set)?;
        }
        Commands::Resolve { kind, deployment, enable_shadow_write } => {
            let gate = if enable_shadow_write {
                StaticGate::new().enable(&kind)
            } else {
                StaticGate::new()
            };
            let mode = resolve_mode(&kv, &gate, &kind, &deployment)?;
            print_mode(cli.output, &kind, &deployment, mode)?;
        }
    }

    Ok(())
}
