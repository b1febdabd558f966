//! chittad - the chitta memory daemon
//!
//! Long-lived process owning one database: versioned unix socket, JSON-RPC
//! sessions, periodic maintenance. Logging goes to stderr; the socket
//! carries protocol bytes only.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use chitta_core::{Mind, MindConfig};
use chitta_daemon::{daemon, default_socket_path, DaemonConfig, DEFAULT_MAINT_INTERVAL_S};

struct Args {
    db_path: Option<PathBuf>,
    socket_path: Option<PathBuf>,
    maint_interval_s: Option<u64>,
}

/// Parse command-line arguments. Exits on `--help` / `--version`.
fn parse_args() -> Args {
    let mut parsed = Args {
        db_path: None,
        socket_path: None,
        maint_interval_s: None,
    };
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                println!("chittad v{}", env!("CARGO_PKG_VERSION"));
                println!();
                println!("Persistent semantic memory daemon over a local socket.");
                println!();
                println!("USAGE:");
                println!("    chittad [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help              Print help information");
                println!("    -V, --version           Print version information");
                println!("    --db-path <PATH>        Database base path");
                println!("    --socket <PATH>         Socket path override");
                println!("    --interval <SECONDS>    Maintenance period (default {DEFAULT_MAINT_INTERVAL_S})");
                println!();
                println!("ENVIRONMENT:");
                println!("    DB_PATH                 Database base path");
                println!("    SOCKET_PATH             Socket path override");
                println!("    MAINT_INTERVAL_S        Maintenance period in seconds");
                println!("    RUST_LOG                Log level filter");
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("chittad {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--db-path" => {
                i += 1;
                parsed.db_path = Some(PathBuf::from(args.get(i).unwrap_or_else(|| {
                    eprintln!("error: --db-path requires a path argument");
                    std::process::exit(1);
                })));
            }
            "--socket" => {
                i += 1;
                parsed.socket_path = Some(PathBuf::from(args.get(i).unwrap_or_else(|| {
                    eprintln!("error: --socket requires a path argument");
                    std::process::exit(1);
                })));
            }
            "--interval" => {
                i += 1;
                let raw = args.get(i).map(String::as_str).unwrap_or("");
                match raw.parse() {
                    Ok(seconds) => parsed.maint_interval_s = Some(seconds),
                    Err(_) => {
                        eprintln!("error: --interval requires a number of seconds");
                        std::process::exit(1);
                    }
                }
            }
            arg => {
                eprintln!("error: unknown argument '{arg}'");
                eprintln!("Try 'chittad --help' for more information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }
    parsed
}

#[tokio::main]
async fn main() {
    let args = parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    info!("chittad v{} starting", env!("CARGO_PKG_VERSION"));

    let base_path = args
        .db_path
        .or_else(|| std::env::var("DB_PATH").ok().map(PathBuf::from));
    let maint_interval_s = args
        .maint_interval_s
        .or_else(|| {
            std::env::var("MAINT_INTERVAL_S")
                .ok()
                .and_then(|s| s.parse().ok())
        })
        .unwrap_or(DEFAULT_MAINT_INTERVAL_S);

    let config = MindConfig {
        base_path,
        ..Default::default()
    };
    let resolved = config.resolve_base_path();

    // the embedder is an external collaborator; without one attached, text
    // operations return NoEmbedder while vector and sparse paths work
    warn!("no embedder attached; text remember/recall will be refused");

    let mind = match Mind::open(config, None) {
        Ok(mind) => {
            info!(base = %resolved.display(), nodes = mind.size(), "engine open");
            mind
        }
        Err(e) => {
            eprintln!("failed to open database at {}: {e}", resolved.display());
            std::process::exit(1);
        }
    };

    let daemon_config = DaemonConfig {
        base_path: resolved,
        socket_path: args.socket_path.unwrap_or_else(default_socket_path),
        maint_interval: Duration::from_secs(maint_interval_s.max(1)),
    };

    if let Err(e) = daemon::run(daemon_config, mind).await {
        eprintln!("daemon error: {e}");
        std::process::exit(1);
    }
    info!("chittad stopped");
}
