//! RPC session dispatch
//!
//! Per-connection JSON-RPC state: `initialize` must come first (the early
//! `version_check` is also allowed), then `tools/list` and `tools/call`
//! dispatch into the engine under the daemon's single logical lock.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_MAJOR, PROTOCOL_MINOR};
use crate::tools;
use chitta_core::Mind;

/// Per-connection RPC session over the shared engine
pub struct RpcServer {
    mind: Arc<Mutex<Mind>>,
    initialized: bool,
}

impl RpcServer {
    pub fn new(mind: Arc<Mutex<Mind>>) -> Self {
        Self {
            mind,
            initialized: false,
        }
    }

    /// Handle one request; `None` for notifications
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, "handling request");

        if request.jsonrpc != crate::protocol::JSONRPC_VERSION {
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
            ));
        }

        // version_check is allowed before initialize so incompatible
        // clients can bail out early
        if !self.initialized
            && !matches!(request.method.as_str(), "initialize" | "version_check")
        {
            warn!(method = %request.method, "rejecting request before initialize");
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_request("initialize must be the first call"),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(),
            "version_check" => self.handle_version_check(request.params),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(json!({})),
            method => Err(JsonRpcError::method_not_found(method)),
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    fn handle_initialize(&mut self) -> Result<Value, JsonRpcError> {
        self.initialized = true;
        Ok(json!({
            "protocolVersion": { "major": PROTOCOL_MAJOR, "minor": PROTOCOL_MINOR },
            "serverInfo": {
                "name": "chitta",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": { "tools": {} },
        }))
    }

    fn handle_version_check(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let client_major = params
            .as_ref()
            .and_then(|p| p.get("major"))
            .and_then(Value::as_u64)
            .unwrap_or(PROTOCOL_MAJOR as u64) as u32;
        Ok(json!({
            "major": PROTOCOL_MAJOR,
            "minor": PROTOCOL_MINOR,
            "compatible": client_major == PROTOCOL_MAJOR,
        }))
    }

    fn handle_tools_list(&self) -> Result<Value, JsonRpcError> {
        let tools: Vec<Value> = tools::taxonomy()
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "params": tool.params.iter().map(|p| json!({
                        "name": p.name,
                        "kind": p.kind.as_str(),
                        "required": p.required,
                        "default": p.default,
                        "description": p.description,
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        Ok(json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params = params.ok_or_else(|| JsonRpcError::invalid_params("params required"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::invalid_params("params.name required"))?
            .to_string();
        if tools::find(&name).is_none() {
            return Err(JsonRpcError::method_not_found(&name));
        }
        let arguments: Map<String, Value> = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(JsonRpcError::invalid_params("params.arguments must be an object"));
            }
        };

        let mut mind = self.mind.lock().await;
        let output = tools::execute(&mut mind, &name, &arguments)
            .map_err(|e| JsonRpcError::from_engine(&e))?;
        Ok(json!({
            "content": output.content,
            "structured": output.structured,
        }))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chitta_core::{HashEmbedder, MindConfig};
    use tempfile::TempDir;

    fn server(dir: &TempDir) -> RpcServer {
        let config = MindConfig {
            base_path: Some(dir.path().join("db")),
            dimensions: 32,
            ..Default::default()
        };
        let mind = Mind::open(config, Some(Box::new(HashEmbedder::new(32)))).unwrap();
        RpcServer::new(Arc::new(Mutex::new(mind)))
    }

    fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test]
    async fn test_initialize_first() {
        let dir = TempDir::new().unwrap();
        let mut server = server(&dir);

        // anything before initialize is refused, except version_check
        let response = server.handle_request(request("tools/list", None)).await.unwrap();
        assert!(response.error.is_some());

        let response = server
            .handle_request(request("version_check", Some(json!({"major": 1}))))
            .await
            .unwrap();
        assert_eq!(response.result.unwrap()["compatible"], json!(true));

        let response = server.handle_request(request("initialize", None)).await.unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], json!("chitta"));

        let response = server.handle_request(request("tools/list", None)).await.unwrap();
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_major_mismatch_flagged() {
        let dir = TempDir::new().unwrap();
        let mut server = server(&dir);
        let response = server
            .handle_request(request("version_check", Some(json!({"major": 99}))))
            .await
            .unwrap();
        assert_eq!(response.result.unwrap()["compatible"], json!(false));
    }

    #[tokio::test]
    async fn test_unknown_method_and_tool() {
        let dir = TempDir::new().unwrap();
        let mut server = server(&dir);
        server.handle_request(request("initialize", None)).await;

        let response = server.handle_request(request("no/such", None)).await.unwrap();
        assert_eq!(response.error.unwrap().code, -32601);

        let response = server
            .handle_request(request(
                "tools/call",
                Some(json!({"name": "no_such_tool", "arguments": {}})),
            ))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_tool_call_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut server = server(&dir);
        server.handle_request(request("initialize", None)).await;

        let response = server
            .handle_request(request(
                "tools/call",
                Some(json!({
                    "name": "remember",
                    "arguments": {"text": "socket-level memory"},
                })),
            ))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert!(result["structured"]["id"].is_string());
        assert!(!result["content"].as_array().unwrap().is_empty());

        // missing required argument maps to InvalidParams
        let response = server
            .handle_request(request(
                "tools/call",
                Some(json!({"name": "remember", "arguments": {}})),
            ))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32602);
    }
}
