//! # Chitta Daemon
//!
//! Unix-socket JSON-RPC server and CLI client for the chitta memory
//! engine. One daemon per database, enforced by an exclusive advisory
//! lock; each connection is a newline-delimited JSON-RPC 2.0 session
//! dispatching a fixed tool taxonomy into the engine under a single
//! logical lock.

pub mod daemon;
pub mod protocol;
pub mod server;
pub mod tools;

pub use daemon::{default_socket_path, run, DaemonConfig, DEFAULT_MAINT_INTERVAL_S};
pub use server::RpcServer;
