//! Wire protocol
//!
//! Newline-delimited JSON-RPC 2.0 over a local stream socket, plus the two
//! raw frames (`stats`, `shutdown`) that skip JSON-RPC framing.

pub mod types;

pub use types::{
    ErrorCode, JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION, PROTOCOL_MAJOR,
    PROTOCOL_MINOR,
};
