//! The chitta daemon
//!
//! One long-lived process per database. On start it takes an exclusive
//! advisory lock (refusing to run if another daemon holds it), removes any
//! stale socket left by a crash, and listens on a versioned unix socket.
//! Each connection is a newline-delimited JSON-RPC session; all calls
//! serialize through one logical engine lock. A background timer runs the
//! maintenance tick. Two raw frames skip JSON-RPC framing: `stats` returns
//! one-line JSON, `shutdown` answers then flushes, snapshots, and exits.

use fs2::FileExt;
use std::fs::File;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_MAJOR, PROTOCOL_MINOR};
use crate::server::RpcServer;
use chitta_core::{sibling, Mind};

/// Default maintenance period in seconds
pub const DEFAULT_MAINT_INTERVAL_S: u64 = 300;

/// Versioned default socket path, so incompatible daemons do not collide
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var("SOCKET_PATH") {
        return PathBuf::from(path);
    }
    PathBuf::from(format!(
        "/tmp/chitta-{PROTOCOL_MAJOR}.{PROTOCOL_MINOR}.sock"
    ))
}

/// Daemon runtime settings
pub struct DaemonConfig {
    pub base_path: PathBuf,
    pub socket_path: PathBuf,
    pub maint_interval: Duration,
}

/// The advisory lock held for the daemon's lifetime
struct DaemonLock {
    _file: File,
    path: PathBuf,
}

impl DaemonLock {
    fn acquire(base: &Path) -> anyhow::Result<Self> {
        let path = sibling(base, "lock");
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(&path)?;
        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "another daemon owns {} (lock {})",
                base.display(),
                path.display()
            )
        })?;
        Ok(Self { _file: file, path })
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Run the daemon until a `shutdown` frame arrives
pub async fn run(config: DaemonConfig, mind: Mind) -> anyhow::Result<()> {
    let _lock = DaemonLock::acquire(&config.base_path)?;

    // a socket file with the lock free is leftover from a crash
    if config.socket_path.exists() {
        warn!(path = %config.socket_path.display(), "removing stale socket");
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)?;
    std::fs::set_permissions(&config.socket_path, std::fs::Permissions::from_mode(0o600))?;
    info!(socket = %config.socket_path.display(), "listening");

    let mind = Arc::new(Mutex::new(mind));
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    // maintenance timer; never runs during an in-flight request because it
    // takes the same engine lock
    {
        let mind = Arc::clone(&mind);
        let interval = config.maint_interval;
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.changed() => return,
                }
                let mut mind = mind.lock().await;
                match mind.tick() {
                    Ok(report) => info!(
                        decayed = report.decayed,
                        pruned = report.pruned,
                        migrated_cold = report.migrated_cold,
                        coherence = report.coherence,
                        vitality = report.vitality,
                        "maintenance tick"
                    ),
                    // maintenance skips the cycle on failure
                    Err(e) => error!("maintenance tick failed: {e}"),
                }
            }
        });
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let mind = Arc::clone(&mind);
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, mind, shutdown_tx).await {
                        warn!("connection error: {e}");
                    }
                });
            }
            _ = shutdown_rx.changed() => break,
        }
    }

    // respond-then-exit contract: flush, snapshot, release lock, remove socket
    info!("shutting down");
    {
        let mut mind = mind.lock().await;
        if let Err(e) = mind.snapshot() {
            error!("shutdown snapshot failed: {e}");
        }
        if let Err(e) = mind.close() {
            error!("close failed: {e}");
        }
    }
    let _ = std::fs::remove_file(&config.socket_path);
    Ok(())
}

async fn handle_connection(
    stream: UnixStream,
    mind: Arc<Mutex<Mind>>,
    shutdown_tx: watch::Sender<bool>,
) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut session = RpcServer::new(mind.clone());

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        // raw frames, no JSON-RPC envelope
        if line == "stats" {
            let stats = {
                let mind = mind.lock().await;
                mind.stats()
            };
            let json = serde_json::to_string(&stats)?;
            write_half.write_all(json.as_bytes()).await?;
            write_half.write_all(b"\n").await?;
            write_half.flush().await?;
            continue;
        }
        if line == "shutdown" {
            write_half
                .write_all(b"{\"status\":\"shutting_down\"}\n")
                .await?;
            write_half.flush().await?;
            let _ = shutdown_tx.send(true);
            return Ok(());
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => session.handle_request(request).await,
            Err(e) => {
                warn!("unparseable request: {e}");
                Some(JsonRpcResponse::error(None, JsonRpcError::parse_error()))
            }
        };
        if let Some(response) = response {
            let json = serde_json::to_string(&response)?;
            write_half.write_all(json.as_bytes()).await?;
            write_half.write_all(b"\n").await?;
            write_half.flush().await?;
        }
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chitta_core::{HashEmbedder, MindConfig};
    use tempfile::TempDir;
    use tokio::net::UnixStream;

    fn test_mind(base: &Path) -> Mind {
        let config = MindConfig {
            base_path: Some(base.to_path_buf()),
            dimensions: 32,
            ..Default::default()
        };
        Mind::open(config, Some(Box::new(HashEmbedder::new(32)))).unwrap()
    }

    #[test]
    fn test_lock_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("db");
        let first = DaemonLock::acquire(&base).unwrap();
        assert!(DaemonLock::acquire(&base).is_err());
        drop(first);
        DaemonLock::acquire(&base).unwrap();
    }

    #[tokio::test]
    async fn test_socket_session_end_to_end() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("db");
        let socket = dir.path().join("chitta-test.sock");
        let mind = test_mind(&base);

        let config = DaemonConfig {
            base_path: base.clone(),
            socket_path: socket.clone(),
            maint_interval: Duration::from_secs(3600),
        };
        let daemon = tokio::spawn(run(config, mind));

        // wait for the socket to appear
        for _ in 0..100 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let stream = UnixStream::connect(&socket).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        // raw stats frame
        write.write_all(b"stats\n").await.unwrap();
        let line = lines.next_line().await.unwrap().unwrap();
        let stats: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(stats["totalNodes"], serde_json::json!(0));

        // JSON-RPC session: initialize, remember, recall
        for (id, body) in [
            (1, serde_json::json!({"jsonrpc":"2.0","id":1,"method":"initialize"})),
            (2, serde_json::json!({"jsonrpc":"2.0","id":2,"method":"tools/call",
                "params":{"name":"remember","arguments":{"text":"daemon memory"}}})),
            (3, serde_json::json!({"jsonrpc":"2.0","id":3,"method":"tools/call",
                "params":{"name":"recall","arguments":{"query":"daemon"}}})),
        ] {
            write
                .write_all(format!("{body}\n").as_bytes())
                .await
                .unwrap();
            let line = lines.next_line().await.unwrap().unwrap();
            let response: serde_json::Value = serde_json::from_str(&line).unwrap();
            assert_eq!(response["id"], serde_json::json!(id));
            assert!(response.get("error").is_none(), "unexpected error: {response}");
        }

        // shutdown frame answers then stops the daemon
        write.write_all(b"shutdown\n").await.unwrap();
        let line = lines.next_line().await.unwrap().unwrap();
        assert!(line.contains("shutting_down"));

        daemon.await.unwrap().unwrap();
        assert!(!socket.exists(), "socket removed on shutdown");
    }
}
